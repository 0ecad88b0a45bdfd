//! # NetCDF Output
//!
//! Serializes a [`GriddedField`] to a CF-1.7 NetCDF-4 file that
//! [`crate::loader::read_field`] reads back unchanged.
//!
//! Layout for a field `air_temperature` on `latitude`/`longitude`:
//!
//! ```text
//! dimensions:  latitude = n ; longitude = m ; bnds = 2 ;
//! variables:
//!   double latitude(latitude)            units, standard_name, axis, bounds
//!   double latitude_bnds(latitude, bnds)
//!   double longitude(longitude)          ...
//!   double longitude_bnds(longitude, bnds)
//!   float  air_temperature(latitude, longitude)
//!                                        units, long_name, _FillValue, grid_mapping
//!   int    crs                           grid_mapping_name, ...
//! ```

use crate::crs::CfValue;
use crate::error::{RegridError, Result};
use crate::field::{Axis, GriddedField};
use crate::storage::{StorageBackend, StorageFactory};
use log::debug;
use std::path::Path;

/// Value stored in masked cells (the netCDF default float fill)
pub const FILL_VALUE: f32 = 9.969_209_968_386_869e36;

const BOUNDS_DIMENSION: &str = "bnds";
const CRS_VARIABLE: &str = "crs";

/// Writes `field` to a local NetCDF file, replacing any existing file.
pub fn write_field<P: AsRef<Path>>(field: &GriddedField, path: P) -> Result<()> {
    let path = path.as_ref();
    if field.is_empty() {
        return Err(RegridError::EmptyField(field.name.clone()));
    }
    let field = field.clone().with_guessed_bounds()?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    debug!("Writing '{}' {:?} to {}", field.name, field.shape(), path.display());
    let mut file = netcdf::create(path)?;

    file.add_dimension(&field.y.name, field.y.len())?;
    file.add_dimension(&field.x.name, field.x.len())?;
    file.add_dimension(BOUNDS_DIMENSION, 2)?;

    add_coordinate(&mut file, &field.y, "Y")?;
    add_coordinate(&mut file, &field.x, "X")?;

    if let Some(crs) = &field.crs {
        let mut var = file.add_variable::<i32>(CRS_VARIABLE, &[])?;
        for (name, value) in crs.cf_attributes() {
            match value {
                CfValue::Text(text) => var.put_attribute(name, text.as_str())?,
                CfValue::Number(number) => var.put_attribute(name, number)?,
            };
        }
    }

    let values: Vec<f32> = (0..field.values.len())
        .map(|idx| {
            let (i, j) = (idx / field.x.len(), idx % field.x.len());
            if field.is_masked(i, j) { FILL_VALUE } else { field.values[idx] }
        })
        .collect();

    let dims = [field.y.name.as_str(), field.x.name.as_str()];
    let mut var = file.add_variable::<f32>(&field.name, &dims)?;
    var.put_attribute("_FillValue", FILL_VALUE)?;
    var.put_attribute("units", field.units.as_str())?;
    if let Some(standard_name) = &field.standard_name {
        var.put_attribute("standard_name", standard_name.as_str())?;
    }
    if let Some(long_name) = &field.long_name {
        var.put_attribute("long_name", long_name.as_str())?;
    }
    if field.crs.is_some() {
        var.put_attribute("grid_mapping", CRS_VARIABLE)?;
    }
    var.put_values(&values, ..)?;

    file.add_attribute("Conventions", "CF-1.7")?;
    file.add_attribute(
        "history",
        format!(
            "{} written by {} {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
        .as_str(),
    )?;

    Ok(())
}

fn add_coordinate(file: &mut netcdf::FileMut, axis: &Axis, cf_axis: &str) -> Result<()> {
    let bounds_name = format!("{}_bnds", axis.name);

    let mut var = file.add_variable::<f64>(&axis.name, &[axis.name.as_str()])?;
    var.put_attribute("units", axis.units.as_str())?;
    if let Some(standard_name) = &axis.standard_name {
        var.put_attribute("standard_name", standard_name.as_str())?;
    }
    var.put_attribute("axis", cf_axis)?;
    var.put_attribute("bounds", bounds_name.as_str())?;
    var.put_values(&axis.points, ..)?;

    let flat: Vec<f64> = axis
        .bounds
        .iter()
        .flatten()
        .flat_map(|pair| pair.iter().copied())
        .collect();
    let dims = [axis.name.as_str(), BOUNDS_DIMENSION];
    let mut bounds = file.add_variable::<f64>(&bounds_name, &dims)?;
    bounds.put_values(&flat, ..)?;
    Ok(())
}

/// Writes `field` to `destination`, a local path or an `s3://` URL.
///
/// S3 destinations are written to a temporary file first and uploaded.
pub async fn save_field(field: &GriddedField, destination: &str) -> Result<()> {
    if StorageFactory::is_s3_path(destination) {
        let temp_file = tempfile::Builder::new().suffix(".nc").tempfile()?;
        write_field(field, temp_file.path())?;

        let storage = StorageFactory::from_path(destination).await?;
        let data: Vec<u8> = tokio::fs::read(temp_file.path()).await?;
        storage.write(destination, &data).await?;
        debug!("Uploaded '{}' to {}", field.name, destination);
    } else {
        write_field(field, destination)?;
    }
    Ok(())
}

/// Writes raw bytes (e.g. a PNG) to a local path or an `s3://` URL.
pub async fn save_bytes(data: &[u8], destination: &str) -> Result<()> {
    let storage = StorageFactory::from_path(destination).await?;
    storage.write(destination, data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CoordinateReferenceFrame;
    use crate::loader::read_field;
    use tempfile::TempDir;

    fn london_field() -> GriddedField {
        let mut field = GriddedField::new(
            "air_temperature",
            "K",
            Axis::new("latitude", "degrees_north", vec![51.25, 51.5, 51.75])
                .with_standard_name("latitude"),
            Axis::new("longitude", "degrees_east", vec![-0.5, -0.25, 0.0, 0.25])
                .with_standard_name("longitude"),
            vec![
                283.1, 283.4, 283.9, f32::NAN, 282.7, 283.0, 283.6, 284.0, 282.2, 282.9, 283.3,
                283.8,
            ],
            Some(CoordinateReferenceFrame::geographic()),
        )
        .unwrap()
        .with_mask((0..12).map(|k| k == 3).collect())
        .unwrap()
        .with_guessed_bounds()
        .unwrap();
        field.standard_name = Some("air_temperature".to_string());
        field.long_name = Some("Air temperature at 1.5 m".to_string());
        field
    }

    #[test]
    fn test_write_read_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("london.nc");
        let original = london_field();

        write_field(&original, &path)?;
        let reloaded = read_field(&path, Some("air_temperature"))?;

        assert_eq!(reloaded.shape(), original.shape());
        assert_eq!(reloaded.y, original.y);
        assert_eq!(reloaded.x, original.x);
        assert_eq!(reloaded.units, "K");
        assert_eq!(reloaded.crs, original.crs);
        assert_eq!(reloaded.long_name, original.long_name);
        assert_eq!(reloaded.standard_name, original.standard_name);
        assert_eq!(reloaded.mask, original.mask);
        for idx in 0..original.values.len() {
            if original.mask.as_ref().is_some_and(|m| m[idx]) {
                assert!(reloaded.values[idx].is_nan());
            } else {
                assert_eq!(reloaded.values[idx], original.values[idx]);
            }
        }
        Ok(())
    }

    #[test]
    fn test_projected_frame_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("laea.nc");
        let field = GriddedField::new(
            "air_temperature",
            "K",
            Axis::new("projection_y_coordinate", "m", vec![-2000.0, 0.0, 2000.0]),
            Axis::new("projection_x_coordinate", "m", vec![0.0, 2000.0]),
            vec![280.0, 281.0, 282.0, 283.0, 284.0, 285.0],
            Some(CoordinateReferenceFrame::ukv_laea()),
        )?;

        write_field(&field, &path)?;
        let reloaded = read_field(&path, None)?;
        assert_eq!(reloaded.crs, field.crs);
        assert_eq!(reloaded.values, field.values);
        assert_eq!(reloaded.x.points, field.x.points);
        assert!(reloaded.x.has_bounds());
        Ok(())
    }

    #[test]
    fn test_history_records_utc_timestamp_and_writer() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("london.nc");
        write_field(&london_field(), &path)?;

        let file = netcdf::open(&path)?;
        let history = match file.attribute("history").map(|attr| attr.value()) {
            Some(Ok(netcdf::AttributeValue::Str(text))) => text,
            other => panic!("unexpected history attribute: {:?}", other),
        };
        let (stamp, rest) = history.split_once(' ').unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%SZ").is_ok());
        assert!(rest.starts_with("written by ncregrid "));
        Ok(())
    }

    #[test]
    fn test_empty_field_is_refused() {
        let field = GriddedField::new(
            "air_temperature",
            "K",
            Axis::new("latitude", "degrees_north", vec![51.0, 52.0]),
            Axis::new("longitude", "degrees_east", vec![]),
            vec![],
            Some(CoordinateReferenceFrame::geographic()),
        )
        .unwrap();
        let dir = TempDir::new().unwrap();
        let result = write_field(&field, dir.path().join("empty.nc"));
        assert!(matches!(result, Err(RegridError::EmptyField(_))));
    }

    #[tokio::test]
    async fn test_save_field_local() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out").join("london.nc");
        let path_str = path.to_string_lossy().to_string();

        save_field(&london_field(), &path_str).await?;
        // Overwrites on a second run
        save_field(&london_field(), &path_str).await?;
        assert!(path.exists());
        Ok(())
    }
}
