//! # Job Configuration
//!
//! A [`JobConfig`] holds every parameter of a pipeline run: where the UKV
//! file comes from, where it is cached, the target grid, the region to cut
//! out, where the result goes, and optionally where plots are written.
//!
//! Every field has a default, so a configuration file only needs the values
//! it changes. Files are JSON or YAML, chosen by extension.
//!
//! ```rust,no_run
//! use ncregrid::input::JobConfig;
//!
//! let config = JobConfig::from_file("london.yaml")?;
//!
//! let json = r#"
//! {
//!   "source": "https://example.com/ukv/air_temperature.nc",
//!   "output": "london.nc",
//!   "region": { "min_lon": -0.6, "min_lat": 51.2, "max_lon": 0.4, "max_lat": 51.8 }
//! }"#;
//! let config = JobConfig::from_json(json)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{RegridError, Result};
use crate::extract::BoundingBox;
use crate::grid::TargetGridSpec;
use crate::storage::StorageFactory;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Placeholder source used until a real UKV file URL is configured
pub const DEFAULT_SOURCE: &str = "https://example.com/ukv/air_temperature_1p5m.nc";

/// Parameters of one load → regrid → extract → save run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// HTTP(S) URL, `s3://` URL or local path of the source NetCDF file
    pub source: String,
    /// Directory the source is downloaded into
    pub cache_dir: String,
    /// Data variable to read; the first 2D variable when absent
    pub variable: Option<String>,
    pub target_grid: TargetGridSpec,
    pub region: BoundingBox,
    /// Local path or `s3://` URL of the extracted NetCDF file
    pub output: String,
    /// Directory for per-stage PNG plots; no plots when absent
    pub plots_dir: Option<String>,
    /// JSON coastline file drawn on the plots
    pub coastlines: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            source: DEFAULT_SOURCE.to_string(),
            cache_dir: "data".to_string(),
            variable: None,
            target_grid: TargetGridSpec::default(),
            region: BoundingBox::default(),
            output: "london_air_temperature.nc".to_string(),
            plots_dir: None,
            coastlines: None,
        }
    }
}

impl JobConfig {
    /// Loads a configuration file; `.yaml`/`.yml` files are parsed as YAML,
    /// anything else as JSON.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "yaml" | "yml"));
        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(json_str: &str) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let config: JobConfig = serde_json::from_str(json_str)?;
        Ok(config)
    }

    pub fn from_yaml(yaml_str: &str) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let config: JobConfig = serde_yaml::from_str(yaml_str)?;
        Ok(config)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Checks the parameters without touching the network or the source.
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(RegridError::domain("source must not be empty"));
        }
        if self.output.trim().is_empty() {
            return Err(RegridError::domain("output must not be empty"));
        }
        if StorageFactory::is_http_path(&self.output) {
            return Err(RegridError::domain(format!(
                "output cannot be an HTTP URL: {}",
                self.output
            )));
        }
        if self.cache_dir.trim().is_empty() {
            return Err(RegridError::domain("cache_dir must not be empty"));
        }
        if let Some(variable) = &self.variable
            && variable.trim().is_empty()
        {
            return Err(RegridError::domain("variable must not be empty when given"));
        }
        self.target_grid.validate()?;
        self.region.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = JobConfig::from_json("{}").unwrap();
        assert_eq!(config, JobConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = JobConfig::from_json(
            r#"{
                "source": "s3://met-office/ukv/t15m.nc",
                "variable": "air_temperature",
                "target_grid": { "lat_min": 50.0, "lat_max": 53.0, "n_lat": 31,
                                 "lon_min": -2.0, "lon_max": 1.0, "n_lon": 31 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.source, "s3://met-office/ukv/t15m.nc");
        assert_eq!(config.variable.as_deref(), Some("air_temperature"));
        assert_eq!(config.target_grid.n_lat, 31);
        assert_eq!(config.region, BoundingBox::default());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = JobConfig {
            plots_dir: Some("plots".to_string()),
            ..JobConfig::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(JobConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_validation_failures() {
        let config = JobConfig {
            output: "https://example.com/out.nc".to_string(),
            ..JobConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = JobConfig::default();
        config.target_grid.n_lon = 1;
        assert!(matches!(config.validate(), Err(RegridError::Domain(_))));

        let mut config = JobConfig::default();
        config.region.min_lat = 60.0;
        assert!(config.validate().is_err());

        let config = JobConfig {
            variable: Some("  ".to_string()),
            ..JobConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_json_is_rejected() {
        assert!(JobConfig::from_json("not json").is_err());
        assert!(JobConfig::from_json(r#"{"target_grid": {"n_lat": "many"}}"#).is_err());
    }
}
