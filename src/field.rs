//! # Gridded Fields
//!
//! [`GriddedField`] is the single value type flowing through the pipeline: a
//! 2D array of `f32` samples on two named coordinate axes, with units, an
//! optional validity mask and an optional coordinate reference frame.
//!
//! Axis 0 (`y`, rows) is the latitude-like axis and axis 1 (`x`, columns) the
//! longitude-like one. Values are stored row-major.
//!
//! Every stage returns a new field; none of them mutates its input.

use crate::crs::CoordinateReferenceFrame;
use crate::error::{RegridError, Result};

/// Relative tolerance used when checking that cell bounds are contiguous
const CONTIGUITY_TOLERANCE: f64 = 1e-6;

/// A 1D coordinate axis: cell centres plus optional cell bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// Coordinate (and dimension) name, e.g. `projection_x_coordinate`
    pub name: String,
    /// CF standard name, e.g. `longitude`
    pub standard_name: Option<String>,
    pub units: String,
    /// Cell centres, strictly monotonic
    pub points: Vec<f64>,
    /// Cell bounds, one `[lower, upper]` pair per point ordered like the axis
    pub bounds: Option<Vec<[f64; 2]>>,
}

impl Axis {
    pub fn new(name: &str, units: &str, points: Vec<f64>) -> Self {
        Axis {
            name: name.to_string(),
            standard_name: None,
            units: units.to_string(),
            points,
            bounds: None,
        }
    }

    pub fn with_standard_name(mut self, standard_name: &str) -> Self {
        self.standard_name = Some(standard_name.to_string());
        self
    }

    pub fn with_bounds(mut self, bounds: Vec<[f64; 2]>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_bounds(&self) -> bool {
        self.bounds.is_some()
    }

    /// `true` when the points increase along the axis (an axis with fewer
    /// than two points counts as increasing).
    pub fn is_increasing(&self) -> bool {
        self.points.len() < 2 || self.points[1] > self.points[0]
    }

    /// Smallest and largest cell centre.
    pub fn point_range(&self) -> Option<(f64, f64)> {
        let first = *self.points.first()?;
        let last = *self.points.last()?;
        Some((first.min(last), first.max(last)))
    }

    /// Smallest and largest cell edge, falling back to the centres.
    pub fn extent(&self) -> Option<(f64, f64)> {
        match &self.bounds {
            Some(bounds) if !bounds.is_empty() => {
                let lo = bounds.iter().flat_map(|b| b.iter()).cloned().fold(f64::INFINITY, f64::min);
                let hi = bounds
                    .iter()
                    .flat_map(|b| b.iter())
                    .cloned()
                    .fold(f64::NEG_INFINITY, f64::max);
                Some((lo, hi))
            }
            _ => self.point_range(),
        }
    }

    /// Cell bounds as `(min, max)` regardless of axis direction.
    pub fn cell_interval(&self, index: usize) -> Option<(f64, f64)> {
        let bounds = self.bounds.as_ref()?;
        let [a, b] = *bounds.get(index)?;
        Some((a.min(b), a.max(b)))
    }

    /// Derives bounds halfway between neighbouring points. The outer edges
    /// of the first and last cells are extrapolated symmetrically.
    pub fn guess_bounds(&self) -> Result<Vec<[f64; 2]>> {
        let n = self.points.len();
        if n < 2 {
            return Err(RegridError::format(format!(
                "cannot guess bounds for axis '{}' with {} point(s)",
                self.name, n
            )));
        }

        let mut edges = Vec::with_capacity(n + 1);
        edges.push(self.points[0] - (self.points[1] - self.points[0]) / 2.0);
        for pair in self.points.windows(2) {
            edges.push((pair[0] + pair[1]) / 2.0);
        }
        edges.push(self.points[n - 1] + (self.points[n - 1] - self.points[n - 2]) / 2.0);

        Ok(edges.windows(2).map(|e| [e[0], e[1]]).collect())
    }

    /// Returns the axis with bounds, guessing them if they are missing.
    pub fn ensure_bounds(mut self) -> Result<Self> {
        if self.bounds.is_none() {
            self.bounds = Some(self.guess_bounds()?);
        }
        Ok(self)
    }

    /// New axis made of the given indices, in the given order.
    pub fn select(&self, indices: &[usize]) -> Axis {
        Axis {
            name: self.name.clone(),
            standard_name: self.standard_name.clone(),
            units: self.units.clone(),
            points: indices.iter().map(|&i| self.points[i]).collect(),
            bounds: self
                .bounds
                .as_ref()
                .map(|b| indices.iter().map(|&i| b[i]).collect()),
        }
    }

    /// Checks monotonicity and bounds consistency.
    pub fn validate(&self) -> Result<()> {
        if self.points.iter().any(|p| !p.is_finite()) {
            return Err(RegridError::format(format!(
                "axis '{}' contains non-finite points",
                self.name
            )));
        }

        let increasing = self.is_increasing();
        for pair in self.points.windows(2) {
            let ok = if increasing { pair[1] > pair[0] } else { pair[1] < pair[0] };
            if !ok {
                return Err(RegridError::format(format!(
                    "axis '{}' is not strictly monotonic",
                    self.name
                )));
            }
        }

        if let Some(bounds) = &self.bounds {
            if bounds.len() != self.points.len() {
                return Err(RegridError::format(format!(
                    "axis '{}' has {} bounds for {} points",
                    self.name,
                    bounds.len(),
                    self.points.len()
                )));
            }
            for [lo, hi] in bounds {
                let ordered = if increasing { hi > lo } else { hi < lo };
                if !ordered {
                    return Err(RegridError::format(format!(
                        "axis '{}' has bounds ordered against the axis direction",
                        self.name
                    )));
                }
            }
            for pair in bounds.windows(2) {
                let gap = (pair[0][1] - pair[1][0]).abs();
                let scale = pair[0][1].abs().max(pair[1][0].abs()).max(1.0);
                if gap > CONTIGUITY_TOLERANCE * scale {
                    return Err(RegridError::format(format!(
                        "axis '{}' has non-contiguous bounds",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A 2D field of samples on a `(y, x)` grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    /// Variable name, e.g. `air_temperature`
    pub name: String,
    pub long_name: Option<String>,
    pub standard_name: Option<String>,
    /// Physical units of the values
    pub units: String,
    /// Axis 0 (rows)
    pub y: Axis,
    /// Axis 1 (columns)
    pub x: Axis,
    /// Row-major samples, `y.len() * x.len()` long
    pub values: Vec<f32>,
    /// `true` marks an invalid cell
    pub mask: Option<Vec<bool>>,
    pub crs: Option<CoordinateReferenceFrame>,
}

impl GriddedField {
    /// Creates a validated field without mask.
    pub fn new(
        name: &str,
        units: &str,
        y: Axis,
        x: Axis,
        values: Vec<f32>,
        crs: Option<CoordinateReferenceFrame>,
    ) -> Result<Self> {
        let field = GriddedField {
            name: name.to_string(),
            long_name: None,
            standard_name: None,
            units: units.to_string(),
            y,
            x,
            values,
            mask: None,
            crs,
        };
        field.validate()?;
        Ok(field)
    }

    /// Attaches a mask, validating its length.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != self.values.len() {
            return Err(RegridError::format(format!(
                "mask of length {} does not match {} values",
                mask.len(),
                self.values.len()
            )));
        }
        self.mask = if mask.iter().any(|&m| m) { Some(mask) } else { None };
        Ok(self)
    }

    /// Checks shape, axis and mask invariants.
    pub fn validate(&self) -> Result<()> {
        self.y.validate()?;
        self.x.validate()?;
        let expected = self.y.len() * self.x.len();
        if self.values.len() != expected {
            return Err(RegridError::format(format!(
                "field '{}' has {} values but shape ({}, {})",
                self.name,
                self.values.len(),
                self.y.len(),
                self.x.len()
            )));
        }
        if let Some(mask) = &self.mask
            && mask.len() != expected
        {
            return Err(RegridError::format(format!(
                "field '{}' has a mask of length {} for {} values",
                self.name,
                mask.len(),
                expected
            )));
        }
        Ok(())
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.y.len(), self.x.len())
    }

    /// `true` when either axis has zero length ("no data").
    pub fn is_empty(&self) -> bool {
        self.y.is_empty() || self.x.is_empty()
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.x.len() + j
    }

    pub fn value(&self, i: usize, j: usize) -> f32 {
        self.values[self.index(i, j)]
    }

    /// A cell is masked when flagged in the mask or when its value is not finite.
    pub fn is_masked(&self, i: usize, j: usize) -> bool {
        let idx = self.index(i, j);
        self.mask.as_ref().is_some_and(|m| m[idx]) || !self.values[idx].is_finite()
    }

    pub fn masked_count(&self) -> usize {
        (0..self.values.len())
            .filter(|&idx| {
                self.mask.as_ref().is_some_and(|m| m[idx]) || !self.values[idx].is_finite()
            })
            .count()
    }

    /// Minimum and maximum of the unmasked values.
    pub fn valid_range(&self) -> Option<(f32, f32)> {
        let mut range: Option<(f32, f32)> = None;
        for (idx, &v) in self.values.iter().enumerate() {
            if !v.is_finite() || self.mask.as_ref().is_some_and(|m| m[idx]) {
                continue;
            }
            range = Some(match range {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        range
    }

    /// Returns the field with bounds on both axes.
    pub fn with_guessed_bounds(mut self) -> Result<Self> {
        self.y = self.y.ensure_bounds()?;
        self.x = self.x.ensure_bounds()?;
        Ok(self)
    }

    /// New field restricted to the given row and column indices, in order.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> GriddedField {
        let mut values = Vec::with_capacity(rows.len() * cols.len());
        let mut mask = self.mask.as_ref().map(|_| Vec::with_capacity(rows.len() * cols.len()));
        for &i in rows {
            for &j in cols {
                let idx = self.index(i, j);
                values.push(self.values[idx]);
                if let (Some(out), Some(src)) = (mask.as_mut(), self.mask.as_ref()) {
                    out.push(src[idx]);
                }
            }
        }
        GriddedField {
            name: self.name.clone(),
            long_name: self.long_name.clone(),
            standard_name: self.standard_name.clone(),
            units: self.units.clone(),
            y: self.y.select(rows),
            x: self.x.select(cols),
            values,
            mask: mask.filter(|m| m.iter().any(|&v| v)),
            crs: self.crs.clone(),
        }
    }
}
