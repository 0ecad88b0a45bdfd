//! # Loader
//!
//! Retrieves a NetCDF source into local storage and parses it into a
//! [`GriddedField`].
//!
//! ## Parsing rules
//!
//! - The data variable is the one named in the job, or the first variable
//!   with two or more dimensions that is neither a coordinate, a bounds
//!   variable nor an auxiliary coordinate
//! - Length-1 dimensions (a single time or height level) are squeezed out;
//!   exactly two must remain, the trailing one becoming `x`
//! - Cell bounds come from the coordinate's `bounds` variable, or are guessed
//!   from the points when the file has none
//! - `scale_factor` / `add_offset` are applied, `_FillValue` / `missing_value`
//!   cells are masked
//! - The reference frame comes from the CF `grid_mapping` variable, or is
//!   inferred as geographic from latitude/longitude axes

use crate::crs::CoordinateReferenceFrame;
use crate::error::{RegridError, Result};
use crate::fetch::Fetcher;
use crate::field::{Axis, GriddedField};
use crate::storage::StorageBackend;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Fetches sources and parses them into fields.
pub struct Loader<F: Fetcher, S: StorageBackend> {
    fetcher: F,
    storage: S,
}

impl<F: Fetcher, S: StorageBackend> Loader<F, S> {
    pub fn new(fetcher: F, storage: S) -> Self {
        Loader { fetcher, storage }
    }

    /// Copies `source` to `destination`, overwriting any previous copy.
    pub async fn download(&self, source: &str, destination: &str) -> Result<usize> {
        let bytes = self.fetcher.fetch(source).await?;
        self.storage.write(destination, &bytes).await?;
        info!("Stored {} bytes from {} at {}", bytes.len(), source, destination);
        Ok(bytes.len())
    }

    /// Downloads `source` to `destination` and parses `variable` from it.
    pub async fn load(
        &self,
        source: &str,
        destination: &str,
        variable: Option<&str>,
    ) -> Result<GriddedField> {
        self.download(source, destination).await?;
        read_field(destination, variable)
    }
}

/// Local cache path for a source: the last path segment of the source
/// (query string removed) inside `cache_dir`.
pub fn cache_path(cache_dir: &str, source: &str) -> PathBuf {
    let without_query = source.split(['?', '#']).next().unwrap_or(source);
    let file_name = without_query
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .filter(|segment| !segment.contains(':'))
        .unwrap_or("source.nc");
    Path::new(cache_dir).join(file_name)
}

/// Parses one 2D field out of a local NetCDF file.
pub fn read_field<P: AsRef<Path>>(path: P, variable: Option<&str>) -> Result<GriddedField> {
    let path = path.as_ref();
    debug!("Opening NetCDF file: {}", path.display());
    let file = netcdf::open(path)?;

    let var = match variable {
        Some(name) => file.variable(name).ok_or_else(|| {
            RegridError::format(format!("Variable '{}' not found in NetCDF file", name))
        })?,
        None => {
            let name = find_data_variable(&file)?;
            info!("No variable requested, using '{}'", name);
            file.variable(&name)
                .ok_or_else(|| RegridError::format(format!("Variable '{}' vanished", name)))?
        }
    };
    let var_name = var.name();

    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|d| (d.name().to_string(), d.len()))
        .collect();
    let spatial: Vec<&(String, usize)> = dims.iter().filter(|(_, len)| *len != 1).collect();
    if spatial.len() != 2 {
        return Err(RegridError::format(format!(
            "Variable '{}' has dimensions {:?}; expected exactly two non-singleton dimensions",
            var_name, dims
        )));
    }
    let (y_dim, x_dim) = (&spatial[0].0, &spatial[1].0);

    let y = read_axis(&file, y_dim)?;
    let x = read_axis(&file, x_dim)?;

    let raw: Vec<f32> = var.get_values(..)?;
    let scale = number_attr(&var, "scale_factor").unwrap_or(1.0);
    let offset = number_attr(&var, "add_offset").unwrap_or(0.0);
    let fill_values: Vec<f32> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| number_attr(&var, name))
        .map(|v| v as f32)
        .collect();

    let mut mask = Vec::with_capacity(raw.len());
    let values: Vec<f32> = raw
        .iter()
        .map(|&v| {
            let invalid = !v.is_finite() || fill_values.contains(&v);
            mask.push(invalid);
            if invalid {
                f32::NAN
            } else if scale != 1.0 || offset != 0.0 {
                (v as f64 * scale + offset) as f32
            } else {
                v
            }
        })
        .collect();

    let crs = read_frame(&file, &var, &y, &x)?;
    if crs.is_none() {
        warn!("Variable '{}' has no recognisable coordinate reference frame", var_name);
    }

    let units = string_attr(&var, "units").unwrap_or_else(|| "1".to_string());
    let mut field = GriddedField::new(&var_name, &units, y, x, values, crs)?.with_mask(mask)?;
    field.long_name = string_attr(&var, "long_name");
    field.standard_name = string_attr(&var, "standard_name");

    debug!(
        "Parsed '{}' with shape {:?} ({} masked cells)",
        field.name,
        field.shape(),
        field.masked_count()
    );
    Ok(field)
}

/// First variable that looks like data rather than coordinates.
fn find_data_variable(file: &netcdf::File) -> Result<String> {
    let dim_names: HashSet<String> = file.dimensions().map(|d| d.name().to_string()).collect();
    let mut auxiliary: HashSet<String> = HashSet::new();
    for var in file.variables() {
        if let Some(bounds) = string_attr(&var, "bounds") {
            auxiliary.insert(bounds);
        }
        if let Some(coords) = string_attr(&var, "coordinates") {
            auxiliary.extend(coords.split_whitespace().map(str::to_string));
        }
        if let Some(grid_mapping) = string_attr(&var, "grid_mapping") {
            auxiliary.insert(grid_mapping);
        }
    }

    file.variables()
        .filter(|var| var.dimensions().len() >= 2)
        .map(|var| var.name())
        .find(|name| !dim_names.contains(name) && !auxiliary.contains(name))
        .ok_or_else(|| RegridError::format("No 2D data variable found in NetCDF file"))
}

/// Reads the coordinate variable of a dimension, with bounds.
fn read_axis(file: &netcdf::File, dim_name: &str) -> Result<Axis> {
    let coord = file.variable(dim_name).ok_or_else(|| {
        RegridError::format(format!("Coordinate variable '{}' not found", dim_name))
    })?;

    let points: Vec<f64> = coord.get_values(..)?;
    let units = string_attr(&coord, "units").unwrap_or_else(|| "1".to_string());
    let mut axis = Axis::new(dim_name, &units, points);
    axis.standard_name = string_attr(&coord, "standard_name");

    if let Some(bounds_name) = string_attr(&coord, "bounds") {
        match file.variable(&bounds_name) {
            Some(bounds_var) => {
                let flat: Vec<f64> = bounds_var.get_values(..)?;
                if flat.len() != 2 * axis.len() {
                    return Err(RegridError::format(format!(
                        "Bounds variable '{}' has {} values for {} points",
                        bounds_name,
                        flat.len(),
                        axis.len()
                    )));
                }
                axis.bounds = Some(flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect());
            }
            None => warn!("Bounds variable '{}' is missing; guessing bounds", bounds_name),
        }
    }

    let axis = axis.ensure_bounds()?;
    axis.validate()?;
    Ok(axis)
}

/// Frame from the `grid_mapping` attribute, or inferred from the axes.
fn read_frame(
    file: &netcdf::File,
    var: &netcdf::Variable,
    y: &Axis,
    x: &Axis,
) -> Result<Option<CoordinateReferenceFrame>> {
    if let Some(mapping_name) = string_attr(var, "grid_mapping") {
        let mapping = file.variable(&mapping_name).ok_or_else(|| {
            RegridError::format(format!("Grid mapping variable '{}' not found", mapping_name))
        })?;
        let grid_mapping_name = string_attr(&mapping, "grid_mapping_name").ok_or_else(|| {
            RegridError::format(format!(
                "Grid mapping variable '{}' has no grid_mapping_name",
                mapping_name
            ))
        })?;
        let crs = CoordinateReferenceFrame::from_cf(&grid_mapping_name, |attr| {
            number_attr(&mapping, attr)
        })?;
        return Ok(Some(crs));
    }

    if is_latitude(y) && is_longitude(x) {
        return Ok(Some(CoordinateReferenceFrame::geographic()));
    }
    Ok(None)
}

fn is_latitude(axis: &Axis) -> bool {
    axis.standard_name.as_deref() == Some("latitude")
        || matches!(axis.name.as_str(), "lat" | "latitude")
        || axis.units.starts_with("degrees_north")
        || axis.units.starts_with("degree_north")
}

fn is_longitude(axis: &Axis) -> bool {
    axis.standard_name.as_deref() == Some("longitude")
        || matches!(axis.name.as_str(), "lon" | "longitude")
        || axis.units.starts_with("degrees_east")
        || axis.units.starts_with("degree_east")
}

pub(crate) fn string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        netcdf::AttributeValue::Strs(strs) => strs.into_iter().next(),
        _ => None,
    }
}

pub(crate) fn number_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Double(d) => Some(d),
        netcdf::AttributeValue::Float(f) => Some(f as f64),
        netcdf::AttributeValue::Int(i) => Some(i as f64),
        netcdf::AttributeValue::Uint(u) => Some(u as f64),
        netcdf::AttributeValue::Short(s) => Some(s as f64),
        netcdf::AttributeValue::Ushort(s) => Some(s as f64),
        netcdf::AttributeValue::Schar(c) => Some(c as f64),
        netcdf::AttributeValue::Uchar(c) => Some(c as f64),
        netcdf::AttributeValue::Longlong(l) => Some(l as f64),
        netcdf::AttributeValue::Ulonglong(l) => Some(l as f64),
        netcdf::AttributeValue::Doubles(v) => v.first().copied(),
        netcdf::AttributeValue::Floats(v) => v.first().map(|&f| f as f64),
        netcdf::AttributeValue::Ints(v) => v.first().map(|&i| i as f64),
        netcdf::AttributeValue::Shorts(v) => v.first().map(|&s| s as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_path_uses_last_segment() {
        let path = cache_path("cache", "https://example.com/data/ukv_t15m.nc?sig=abc");
        assert_eq!(path, Path::new("cache").join("ukv_t15m.nc"));

        let path = cache_path("/tmp/c", "s3://bucket/ukv/air.nc");
        assert_eq!(path, Path::new("/tmp/c").join("air.nc"));

        let path = cache_path("c", "https://example.com/");
        assert_eq!(path, Path::new("c").join("example.com"));
    }

    #[test]
    fn test_axis_kind_detection() {
        let lat = Axis::new("latitude", "degrees_north", vec![0.0, 1.0]);
        let lon = Axis::new("x", "degrees_east", vec![0.0, 1.0]);
        let metres = Axis::new("projection_x_coordinate", "m", vec![0.0, 1.0]);
        assert!(is_latitude(&lat));
        assert!(is_longitude(&lon));
        assert!(!is_longitude(&metres));
        assert!(is_longitude(&metres.clone().with_standard_name("longitude")));
    }
}
