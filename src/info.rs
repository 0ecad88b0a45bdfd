//! # File Inspection
//!
//! Structure of a NetCDF file (dimensions, variables, attributes) together
//! with a summary of the field the loader would parse out of it.

use crate::fetch::{Fetcher, SourceFetcher};
use crate::field::{Axis, GriddedField};
use crate::loader::read_field;
use crate::storage::StorageFactory;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    /// Only filled in detailed mode
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisSummary {
    pub name: String,
    pub units: String,
    pub length: usize,
    pub first: Option<f64>,
    pub last: Option<f64>,
    pub has_bounds_in_file: bool,
}

/// The field as the loader sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSummary {
    pub name: String,
    pub units: String,
    pub shape: (usize, usize),
    pub y: AxisSummary,
    pub x: AxisSummary,
    pub frame: Option<String>,
    pub valid_range: Option<(f32, f32)>,
    pub masked_cells: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub file_size: Option<u64>,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
    pub global_attributes: BTreeMap<String, String>,
    pub field: Option<FieldSummary>,
}

fn axis_summary(axis: &Axis, has_bounds_in_file: bool) -> AxisSummary {
    AxisSummary {
        name: axis.name.clone(),
        units: axis.units.clone(),
        length: axis.len(),
        first: axis.points.first().copied(),
        last: axis.points.last().copied(),
        has_bounds_in_file,
    }
}

impl FieldSummary {
    fn new(field: &GriddedField, file: &netcdf::File) -> Self {
        let has_bounds = |axis: &Axis| {
            file.variable(&axis.name)
                .is_some_and(|var| var.attribute("bounds").is_some())
        };
        FieldSummary {
            name: field.name.clone(),
            units: field.units.clone(),
            shape: field.shape(),
            y: axis_summary(&field.y, has_bounds(&field.y)),
            x: axis_summary(&field.x, has_bounds(&field.x)),
            frame: field.crs.as_ref().map(|crs| crs.to_string()),
            valid_range: field.valid_range(),
            masked_cells: field.masked_count(),
        }
    }
}

/// Inspects a local, `s3://` or HTTP(S) NetCDF file.
pub async fn get_file_info(
    source: &str,
    variable: Option<&str>,
    detailed: bool,
) -> Result<FileInfo> {
    // Remote files are copied to a temporary file first
    let (temp_file, local_path) = if StorageFactory::is_local_path(source) {
        (None, source.to_string())
    } else {
        let fetcher = SourceFetcher::for_source(source, false).await?;
        let data = fetcher
            .fetch(source)
            .await
            .with_context(|| format!("Failed to fetch {} for inspection", source))?;
        let temp_file = tempfile::Builder::new()
            .suffix(".nc")
            .tempfile()
            .context("Failed to create temporary file")?;
        let temp_path = temp_file.path().to_path_buf();
        debug!("Writing {} bytes to temporary path: {:?}", data.len(), temp_path);
        tokio::fs::write(&temp_path, data)
            .await
            .context("Failed to write temporary file")?;
        (Some(temp_file), temp_path.to_string_lossy().to_string())
    };

    let file = netcdf::open(&local_path)
        .with_context(|| format!("Failed to open NetCDF file: {}", source))?;

    let file_size = if temp_file.is_none() {
        tokio::fs::metadata(&local_path).await.ok().map(|m| m.len())
    } else {
        None
    };

    let dimensions = file
        .dimensions()
        .map(|dim| DimensionInfo {
            name: dim.name().to_string(),
            length: dim.len(),
            is_unlimited: dim.is_unlimited(),
        })
        .collect();

    let variables = file
        .variables()
        .filter(|var| variable.is_none_or(|name| var.name() == name))
        .map(|var| VariableInfo {
            name: var.name().to_string(),
            data_type: format!("{:?}", var.vartype()),
            dimensions: var.dimensions().iter().map(|d| d.name().to_string()).collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            attributes: if detailed {
                attributes(var.attributes())
            } else {
                BTreeMap::new()
            },
        })
        .collect();

    let global_attributes = if detailed {
        attributes(file.attributes())
    } else {
        BTreeMap::new()
    };

    let field = match read_field(&local_path, variable) {
        Ok(field) => Some(FieldSummary::new(&field, &file)),
        Err(e) => {
            warn!("No gridded field could be parsed from {}: {}", source, e);
            None
        }
    };

    file.close().context("Failed to close NetCDF file")?;
    // Keep the temporary copy alive until the file is closed
    drop(temp_file);

    Ok(FileInfo {
        path: source.to_string(),
        file_size,
        dimensions,
        variables,
        global_attributes,
        field,
    })
}

fn attributes<'f>(
    attrs: impl Iterator<Item = netcdf::Attribute<'f>>,
) -> BTreeMap<String, String> {
    attrs
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            Some((attr.name().to_string(), format_attribute_value(&value)))
        })
        .collect()
}

fn format_attribute_value(value: &netcdf::AttributeValue) -> String {
    match value {
        netcdf::AttributeValue::Str(s) => s.clone(),
        netcdf::AttributeValue::Double(d) => d.to_string(),
        netcdf::AttributeValue::Float(f) => f.to_string(),
        netcdf::AttributeValue::Int(i) => i.to_string(),
        netcdf::AttributeValue::Short(s) => s.to_string(),
        other => format!("{:?}", other),
    }
}

pub fn print_file_info_human(info: &FileInfo) {
    println!("NetCDF File Information:");
    println!("  Path: {}", info.path);
    if let Some(size) = info.file_size {
        println!("  File Size: {:.2} MB", size as f64 / 1_048_576.0);
    }
    println!("  Dimensions: {} total", info.dimensions.len());
    for dim in &info.dimensions {
        println!(
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        );
    }
    println!("  Variables: {} total", info.variables.len());
    for var in &info.variables {
        println!(
            "    {} ({}) - dimensions: [{}]",
            var.name,
            var.data_type,
            var.dimensions.join(", ")
        );
        for (name, value) in &var.attributes {
            println!("      @{}: {}", name, value);
        }
    }
    if !info.global_attributes.is_empty() {
        println!("  Global Attributes:");
        for (name, value) in &info.global_attributes {
            println!("    @{}: {}", name, value);
        }
    }

    match &info.field {
        Some(field) => {
            println!("  Parsed field: {} [{}]", field.name, field.units);
            println!("    Shape: {} x {}", field.shape.0, field.shape.1);
            for axis in [&field.y, &field.x] {
                println!(
                    "    {}: {} points, {} .. {} {}{}",
                    axis.name,
                    axis.length,
                    axis.first.map_or("-".to_string(), |v| v.to_string()),
                    axis.last.map_or("-".to_string(), |v| v.to_string()),
                    axis.units,
                    if axis.has_bounds_in_file { "" } else { " (bounds guessed)" }
                );
            }
            println!("    Frame: {}", field.frame.as_deref().unwrap_or("unknown"));
            if let Some((lo, hi)) = field.valid_range {
                println!("    Values: {} .. {}", lo, hi);
            }
            println!("    Masked cells: {}", field.masked_cells);
        }
        None => println!("  Parsed field: none"),
    }
}

pub fn print_file_info_json(info: &FileInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

pub fn print_file_info_yaml(info: &FileInfo) -> Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize file info to YAML")?;
    println!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CoordinateReferenceFrame;
    use crate::writer::write_field;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_info_with_field_summary() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("grid.nc");
        let field = GriddedField::new(
            "air_temperature",
            "K",
            Axis::new("latitude", "degrees_north", vec![50.0, 51.0]),
            Axis::new("longitude", "degrees_east", vec![0.0, 1.0, 2.0]),
            vec![280.0, 281.0, 282.0, 283.0, 284.0, 285.0],
            Some(CoordinateReferenceFrame::geographic()),
        )?;
        write_field(&field, &path)?;

        let info = get_file_info(path.to_str().unwrap(), None, true).await?;
        assert!(info.file_size.is_some());
        assert!(info.dimensions.iter().any(|d| d.name == "bnds" && d.length == 2));
        assert!(info.variables.iter().any(|v| v.name == "crs"));
        assert_eq!(
            info.global_attributes.get("Conventions").map(String::as_str),
            Some("CF-1.7")
        );

        let summary = info.field.expect("field summary");
        assert_eq!(summary.shape, (2, 3));
        assert_eq!(summary.valid_range, Some((280.0, 285.0)));
        assert!(summary.x.has_bounds_in_file);
        assert_eq!(summary.frame.as_deref(), Some("geographic (R=6371229 m)"));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_info_single_variable() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("grid.nc");
        let field = GriddedField::new(
            "t",
            "K",
            Axis::new("lat", "degrees_north", vec![50.0, 51.0]),
            Axis::new("lon", "degrees_east", vec![0.0, 1.0]),
            vec![1.0, 2.0, 3.0, 4.0],
            None,
        )?;
        write_field(&field, &path)?;

        let info = get_file_info(path.to_str().unwrap(), Some("t"), false).await?;
        assert_eq!(info.variables.len(), 1);
        assert!(info.variables[0].attributes.is_empty());
        assert!(info.global_attributes.is_empty());
        // Frame inferred from the axis names
        assert!(info.field.and_then(|f| f.frame).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        assert!(get_file_info("/nonexistent/file.nc", None, false).await.is_err());
    }
}
