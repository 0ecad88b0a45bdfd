//! # Region Extraction
//!
//! Crops a geographic field to a latitude/longitude box. A cell is kept when
//! its bounds interval overlaps the requested interval with positive length:
//! partial overlap counts, touching at an edge does not, and a zero-width
//! request keeps nothing.
//!
//! Longitudes of the box are interpreted modulo 360 in the field's own
//! convention (the 360° window starting at its western edge). A box that
//! crosses the seam of that window has its columns returned east part
//! first, with 360 added to the west part so the longitude axis keeps
//! increasing.

use crate::crs::wrap_longitude;
use crate::error::{RegridError, Result};
use crate::field::{Axis, GriddedField};
use log::debug;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// An inclusive geographic box, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Default for BoundingBox {
    /// Greater London.
    fn default() -> Self {
        BoundingBox {
            min_lon: -0.6,
            min_lat: 51.2,
            max_lon: 0.4,
            max_lat: 51.8,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        BoundingBox {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// `min_lon > max_lon` is allowed and means the box crosses the seam.
    pub fn validate(&self) -> Result<()> {
        let edges = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(RegridError::domain(format!("bounding box {} is not finite", self)));
        }
        if self.min_lat > self.max_lat {
            return Err(RegridError::domain(format!(
                "bounding box latitudes are inverted: {} > {}",
                self.min_lat, self.max_lat
            )));
        }
        Ok(())
    }
}

/// Restricts `field` to the cells overlapping `bbox`.
///
/// An empty result (zero-length axis) is not an error.
pub fn extract_region(field: &GriddedField, bbox: &BoundingBox) -> Result<GriddedField> {
    bbox.validate()?;
    match &field.crs {
        Some(crs) if crs.is_geographic() => {}
        Some(crs) => {
            return Err(RegridError::domain(format!(
                "extraction needs a geographic field, '{}' is on {}",
                field.name, crs
            )));
        }
        None => {
            return Err(RegridError::domain(format!(
                "extraction needs a geographic field, '{}' has no reference frame",
                field.name
            )));
        }
    }

    let field: Cow<GriddedField> = if field.y.has_bounds() && field.x.has_bounds() {
        Cow::Borrowed(field)
    } else if field.is_empty() {
        return Ok(field.clone());
    } else {
        Cow::Owned(field.clone().with_guessed_bounds()?)
    };

    let rows = overlapping(&field.y, bbox.min_lat, bbox.max_lat);
    let (cols, shifted_from) = select_columns(&field.x, bbox)?;

    let mut out = field.select(&rows, &cols);
    if let Some(start) = shifted_from {
        shift_longitudes(&mut out.x, start);
    }

    debug!(
        "Extracted {:?} of {:?} cells from '{}' for box {}",
        out.shape(),
        field.shape(),
        out.name,
        bbox
    );
    Ok(out)
}

/// Indices of cells whose bounds overlap `[lo, hi]` with positive length.
fn overlapping(axis: &Axis, lo: f64, hi: f64) -> Vec<usize> {
    (0..axis.len())
        .filter(|&i| {
            axis.cell_interval(i)
                .is_some_and(|(a, b)| lo.max(a) < hi.min(b))
        })
        .collect()
}

/// Column indices for the box, plus the position from which 360 must be
/// added when the box crosses the seam.
fn select_columns(x: &Axis, bbox: &BoundingBox) -> Result<(Vec<usize>, Option<usize>)> {
    let Some((west, _)) = x.extent() else {
        return Ok((Vec::new(), None));
    };

    let mut width = bbox.max_lon - bbox.min_lon;
    if width >= 360.0 {
        return Ok(((0..x.len()).collect(), None));
    }
    if width < 0.0 {
        width += 360.0;
    }

    // East edge in (west, west + 360], west edge `width` degrees before it
    let mut east = wrap_longitude(bbox.max_lon, west);
    if east <= west {
        east += 360.0;
    }
    let start = east - width;
    if start >= west {
        return Ok((overlapping(x, start, east), None));
    }

    let mut cols = overlapping(x, start + 360.0, west + 360.0);
    let east_len = cols.len();
    let west_cols: Vec<usize> = overlapping(x, west, east)
        .into_iter()
        .filter(|c| !cols.contains(c))
        .collect();
    if east_len == 0 || west_cols.is_empty() {
        cols.extend(west_cols);
        return Ok((cols, None));
    }
    if !x.is_increasing() {
        return Err(RegridError::domain(
            "a box crossing the longitude seam needs an increasing longitude axis",
        ));
    }
    cols.extend(west_cols);
    Ok((cols, Some(east_len)))
}

fn shift_longitudes(x: &mut Axis, start: usize) {
    for p in &mut x.points[start..] {
        *p += 360.0;
    }
    if let Some(bounds) = x.bounds.as_mut() {
        for [lo, hi] in &mut bounds[start..] {
            *lo += 360.0;
            *hi += 360.0;
        }
    }
}
