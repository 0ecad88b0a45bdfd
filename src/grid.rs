//! Target grid construction.

use crate::crs::CoordinateReferenceFrame;
use crate::error::{RegridError, Result};
use crate::field::{Axis, GriddedField};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest number of target cells accepted, about 200 MB of `f32` values.
pub const MAX_TARGET_CELLS: usize = 50_000_000;

/// Extents and point counts of a regular latitude/longitude grid.
///
/// The extents are the first and last cell centres, not the outer cell
/// edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGridSpec {
    pub lat_min: f64,
    pub lat_max: f64,
    pub n_lat: usize,
    pub lon_min: f64,
    pub lon_max: f64,
    pub n_lon: usize,
}

impl Default for TargetGridSpec {
    /// Half-degree grid covering the British Isles.
    fn default() -> Self {
        TargetGridSpec {
            lat_min: 49.0,
            lat_max: 61.0,
            n_lat: 25,
            lon_min: -11.0,
            lon_max: 3.0,
            n_lon: 29,
        }
    }
}

impl fmt::Display for TargetGridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{},{}:{}:{}",
            self.lat_min, self.lat_max, self.n_lat, self.lon_min, self.lon_max, self.n_lon
        )
    }
}

impl TargetGridSpec {
    pub fn validate(&self) -> Result<()> {
        if self.n_lat < 2 || self.n_lon < 2 {
            return Err(RegridError::domain(format!(
                "target grid needs at least 2 points per axis, got {}x{}",
                self.n_lat, self.n_lon
            )));
        }
        if self
            .n_lat
            .checked_mul(self.n_lon)
            .is_none_or(|cells| cells > MAX_TARGET_CELLS)
        {
            return Err(RegridError::domain(format!(
                "target grid {}x{} exceeds the limit of {} cells",
                self.n_lat, self.n_lon, MAX_TARGET_CELLS
            )));
        }
        let extents = [self.lat_min, self.lat_max, self.lon_min, self.lon_max];
        if extents.iter().any(|v| !v.is_finite()) {
            return Err(RegridError::domain("target grid extents must be finite"));
        }
        if self.lat_min >= self.lat_max {
            return Err(RegridError::domain(format!(
                "latitude extent is empty or inverted: {} >= {}",
                self.lat_min, self.lat_max
            )));
        }
        if self.lon_min >= self.lon_max {
            return Err(RegridError::domain(format!(
                "longitude extent is empty or inverted: {} >= {}",
                self.lon_min, self.lon_max
            )));
        }
        if self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err(RegridError::domain(format!(
                "latitudes must lie within [-90, 90], got [{}, {}]",
                self.lat_min, self.lat_max
            )));
        }
        Ok(())
    }
}

/// `n` evenly spaced values from `start` to `end`, both included exactly.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            points[n - 1] = end;
            points
        }
    }
}

/// Builds a geographic target field for [`crate::regrid::Regridder`].
///
/// The values are a ramp `0, 1, 2, ...` in row-major order; only the
/// geometry of the result matters to the regridder.
pub fn build_target_grid(spec: &TargetGridSpec) -> Result<GriddedField> {
    spec.validate()?;

    let y = Axis::new(
        "latitude",
        "degrees_north",
        linspace(spec.lat_min, spec.lat_max, spec.n_lat),
    )
    .with_standard_name("latitude")
    .ensure_bounds()?;
    let x = Axis::new(
        "longitude",
        "degrees_east",
        linspace(spec.lon_min, spec.lon_max, spec.n_lon),
    )
    .with_standard_name("longitude")
    .ensure_bounds()?;

    let values = (0..spec.n_lat * spec.n_lon).map(|v| v as f32).collect();
    GriddedField::new(
        "target_grid",
        "1",
        y,
        x,
        values,
        Some(CoordinateReferenceFrame::geographic()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(lat: (f64, f64, usize), lon: (f64, f64, usize)) -> TargetGridSpec {
        TargetGridSpec {
            lat_min: lat.0,
            lat_max: lat.1,
            n_lat: lat.2,
            lon_min: lon.0,
            lon_max: lon.1,
            n_lon: lon.2,
        }
    }

    #[test]
    fn test_target_grid_geometry() {
        let grid = build_target_grid(&spec((49.0, 61.0, 7), (-11.0, 3.0, 15))).unwrap();
        assert_eq!(grid.shape(), (7, 15));
        assert_eq!(grid.y.points.first(), Some(&49.0));
        assert_eq!(grid.y.points.last(), Some(&61.0));
        assert_eq!(grid.x.points.first(), Some(&-11.0));
        assert_eq!(grid.x.points.last(), Some(&3.0));
        assert!(grid.y.points.windows(2).all(|w| w[1] > w[0]));
        assert!(grid.x.points.windows(2).all(|w| w[1] > w[0]));
        assert!(grid.y.has_bounds() && grid.x.has_bounds());
        assert!(grid.mask.is_none());
        assert!(grid.crs.as_ref().is_some_and(|c| c.is_geographic()));
    }

    #[test]
    fn test_linspace_hits_awkward_endpoints() {
        let points = linspace(0.1, 0.7, 7);
        assert_eq!(points.len(), 7);
        assert_eq!(points[0], 0.1);
        assert_eq!(points[6], 0.7);
    }

    #[test]
    fn test_ramp_values() {
        let grid = build_target_grid(&spec((0.0, 1.0, 2), (0.0, 2.0, 3))).unwrap();
        assert_eq!(grid.values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_cell_limit_is_inclusive() {
        let at_limit = spec((0.0, 1.0, 2), (0.0, 1.0, MAX_TARGET_CELLS / 2));
        assert!(at_limit.validate().is_ok());
        let over = spec((0.0, 1.0, 2), (0.0, 1.0, MAX_TARGET_CELLS / 2 + 1));
        assert!(matches!(over.validate(), Err(RegridError::Domain(_))));
    }

    #[test]
    fn test_invalid_specs_are_domain_errors() {
        let bad = [
            spec((0.0, 1.0, 1), (0.0, 1.0, 2)),
            spec((0.0, 1.0, 2), (0.0, 1.0, 0)),
            spec((1.0, 1.0, 2), (0.0, 1.0, 2)),
            spec((0.0, 1.0, 2), (2.0, 1.0, 2)),
            spec((-95.0, 1.0, 2), (0.0, 1.0, 2)),
            spec((0.0, f64::NAN, 2), (0.0, 1.0, 2)),
            spec((0.0, 1.0, usize::MAX), (0.0, 1.0, 2)),
            spec((0.0, 1.0, 99_999_999_999), (0.0, 1.0, 99_999_999_999)),
            spec((0.0, 1.0, 10_000), (0.0, 1.0, 10_000)),
        ];
        for s in &bad {
            assert!(
                matches!(build_target_grid(s), Err(RegridError::Domain(_))),
                "expected domain error for {}",
                s
            );
        }
    }
}
