//! # Bilinear Regridding
//!
//! A [`Regridder`] maps every target cell centre into the source frame once
//! (target frame -> geographic -> source frame) and remembers the four
//! surrounding source cell centres with their bilinear weights. Applying it
//! is then a weighted sum per target cell.
//!
//! Target cells are masked, never extrapolated, when
//!
//! - their centre has no position in the source frame,
//! - their centre falls outside the span of the source cell centres, or
//! - a source corner carrying non-zero weight is masked.

use crate::crs::{CoordinateReferenceFrame, wrap_longitude};
use crate::error::{RegridError, Result};
use crate::field::{Axis, GriddedField};
use log::debug;

/// Four source corners `(i0, j0)`..`(i0 + 1, j0 + 1)` and the fractional
/// offsets inside that cell.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Stencil {
    i0: usize,
    j0: usize,
    ty: f64,
    tx: f64,
}

impl Stencil {
    /// `(row, col, weight)` for the four corners.
    fn corners(&self, shape: (usize, usize)) -> [(usize, usize, f64); 4] {
        let i1 = (self.i0 + 1).min(shape.0 - 1);
        let j1 = (self.j0 + 1).min(shape.1 - 1);
        [
            (self.i0, self.j0, (1.0 - self.ty) * (1.0 - self.tx)),
            (self.i0, j1, (1.0 - self.ty) * self.tx),
            (i1, self.j0, self.ty * (1.0 - self.tx)),
            (i1, j1, self.ty * self.tx),
        ]
    }
}

/// Precomputed bilinear weights from one source geometry onto one target
/// geometry.
#[derive(Debug, Clone)]
pub struct Regridder {
    source_shape: (usize, usize),
    source_crs: CoordinateReferenceFrame,
    target_y: Axis,
    target_x: Axis,
    target_crs: CoordinateReferenceFrame,
    stencils: Vec<Option<Stencil>>,
}

impl Regridder {
    pub fn new(source: &GriddedField, target: &GriddedField) -> Result<Self> {
        let source_crs = source.crs.clone().ok_or_else(|| {
            RegridError::domain(format!("source field '{}' has no reference frame", source.name))
        })?;
        let target_crs = target.crs.clone().ok_or_else(|| {
            RegridError::domain(format!("target field '{}' has no reference frame", target.name))
        })?;

        // Angular x axes are matched modulo 360 starting at the source's
        // westernmost centre. The axis is not treated as circular, so a
        // global source still masks the gap after its last centre.
        let x_base = match source_crs {
            CoordinateReferenceFrame::LambertAzimuthalEqualArea { .. } => None,
            _ => source.x.point_range().map(|(lo, _)| lo),
        };

        let mut stencils = Vec::with_capacity(target.y.len() * target.x.len());
        for &ty in &target.y.points {
            for &tx in &target.x.points {
                let stencil = target_crs
                    .transform_to(&source_crs, tx, ty)
                    .and_then(|(sx, sy)| {
                        let sx = x_base.map_or(sx, |base| wrap_longitude(sx, base));
                        let (i0, fy) = locate(&source.y.points, sy)?;
                        let (j0, fx) = locate(&source.x.points, sx)?;
                        Some(Stencil { i0, j0, ty: fy, tx: fx })
                    });
                stencils.push(stencil);
            }
        }

        let covered = stencils.iter().filter(|s| s.is_some()).count();
        debug!(
            "Regridder {} -> {}: {}/{} target cells inside source coverage",
            source_crs,
            target_crs,
            covered,
            stencils.len()
        );

        Ok(Regridder {
            source_shape: source.shape(),
            source_crs,
            target_y: target.y.clone(),
            target_x: target.x.clone(),
            target_crs,
            stencils,
        })
    }

    /// Shape of the fields this regridder produces.
    pub fn target_shape(&self) -> (usize, usize) {
        (self.target_y.len(), self.target_x.len())
    }

    /// Fraction of target cells whose centre lies inside the source coverage.
    pub fn coverage(&self) -> f64 {
        if self.stencils.is_empty() {
            return 0.0;
        }
        let covered = self.stencils.iter().filter(|s| s.is_some()).count();
        covered as f64 / self.stencils.len() as f64
    }

    /// Resamples `source`, which must share the geometry the regridder was
    /// built from.
    pub fn regrid(&self, source: &GriddedField) -> Result<GriddedField> {
        if source.shape() != self.source_shape {
            return Err(RegridError::domain(format!(
                "regridder built for shape {:?}, got {:?}",
                self.source_shape,
                source.shape()
            )));
        }
        if source.crs.as_ref() != Some(&self.source_crs) {
            return Err(RegridError::domain(format!(
                "regridder built for frame {}, field '{}' has a different one",
                self.source_crs, source.name
            )));
        }

        let mut values = Vec::with_capacity(self.stencils.len());
        let mut mask = Vec::with_capacity(self.stencils.len());
        for stencil in &self.stencils {
            match stencil.and_then(|s| interpolate(source, &s, self.source_shape)) {
                Some(v) => {
                    values.push(v);
                    mask.push(false);
                }
                None => {
                    values.push(f32::NAN);
                    mask.push(true);
                }
            }
        }

        let mut out = GriddedField::new(
            &source.name,
            &source.units,
            self.target_y.clone(),
            self.target_x.clone(),
            values,
            Some(self.target_crs.clone()),
        )?
        .with_mask(mask)?;
        out.long_name = source.long_name.clone();
        out.standard_name = source.standard_name.clone();

        debug!(
            "Regridded '{}' {:?} -> {:?}, {} masked cells",
            out.name,
            source.shape(),
            out.shape(),
            out.masked_count()
        );
        Ok(out)
    }
}

/// Builds a [`Regridder`] and applies it once.
pub fn regrid(source: &GriddedField, target: &GriddedField) -> Result<GriddedField> {
    Regridder::new(source, target)?.regrid(source)
}

fn interpolate(source: &GriddedField, stencil: &Stencil, shape: (usize, usize)) -> Option<f32> {
    let mut sum = 0.0;
    for (i, j, w) in stencil.corners(shape) {
        if w == 0.0 {
            continue;
        }
        if source.is_masked(i, j) {
            return None;
        }
        sum += w * source.value(i, j) as f64;
    }
    Some(sum as f32)
}

/// Lower neighbour index and fractional offset of `v` on a strictly
/// monotonic axis. `None` outside the first..last point span.
fn locate(points: &[f64], v: f64) -> Option<(usize, f64)> {
    let n = points.len();
    if n == 0 || !v.is_finite() {
        return None;
    }
    let (first, last) = (points[0], points[n - 1]);
    if v < first.min(last) || v > first.max(last) {
        return None;
    }
    if n == 1 {
        return Some((0, 0.0));
    }

    let count = if last > first {
        points.partition_point(|&p| p <= v)
    } else {
        points.partition_point(|&p| p >= v)
    };
    let k = count.saturating_sub(1).min(n - 2);
    let t = (v - points[k]) / (points[k + 1] - points[k]);
    Some((k, t.clamp(0.0, 1.0)))
}
