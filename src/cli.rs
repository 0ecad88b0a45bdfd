//! # CLI Module
//!
//! Command-line interface for ncregrid:
//! - Argument parsing with clap
//! - Configuration file loading (JSON/YAML)
//! - `NCREGRID_` environment variables for every `run` option
//! - Configuration merging: flags > environment > config file > defaults
//! - Subcommands for running, inspecting, validating and templating

use crate::extract::BoundingBox;
use crate::grid::TargetGridSpec;
use crate::input::JobConfig;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Regrids UKV NetCDF fields onto a regular lat/lon grid and extracts regions
#[derive(Parser, Debug)]
#[command(name = "ncregrid")]
#[command(about = "Regrid UKV NetCDF fields onto a lat/lon grid and extract a region")]
#[command(version)]
#[command(long_about = "
ncregrid loads a gridded NetCDF field (the Met Office UKV 1.5 m air temperature
on its Lambert azimuthal equal-area grid, or any CF-described 2D field),
regrids it bilinearly onto a regular latitude/longitude grid, cuts a region
out of it and writes the result as NetCDF.

FEATURES:
  • Sources over HTTP(S), from S3 or from local files, cached on disk
  • Projected and rotated-pole source grids described by CF grid mappings
  • Bilinear regridding that masks cells outside the source coverage
  • Region extraction across either longitude convention
  • Optional PNG plots of every pipeline stage
  • Shell completions: Auto-completion for bash, zsh, fish, and PowerShell

EXAMPLES:
  # London extract with the default grid
  ncregrid run --source https://example.com/ukv/t1p5m.nc --output london.nc

  # Custom grid and region
  ncregrid run --grid '50:53:31,-2:1:31' --region '-0.6,51.2,0.4,51.8'

  # Using a config file, with plots
  ncregrid run --config london.yaml --plots plots/

  # File inspection
  ncregrid info data/t1p5m.nc --detailed

  # Generate completions
  ncregrid completions bash > ~/.bash_completion.d/ncregrid
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "NCREGRID_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Human progress lines go to stdout, so they are only printed when
    /// stdout carries no structured report.
    pub fn shows_progress(&self) -> bool {
        !self.quiet && self.output_format == OutputFormat::Human
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load, regrid, extract and save a field
    #[command(long_about = "
Run the whole pipeline: load the source, build the target grid, regrid,
extract the region and save it.

Every option can also come from a NCREGRID_* environment variable or from the
--config file. Flags win over the environment, which wins over the file.

EXAMPLES:
  # Defaults: London box on a 0.5 degree grid over the British Isles
  ncregrid run --source data/t1p5m.nc

  # Explicit variable and output on S3
  ncregrid run --source s3://bucket/ukv.nc -n air_temperature \\
    --output s3://results/london.nc

  # Dry run for validation
  ncregrid run --config london.json --dry-run
")]
    Run {
        /// Source NetCDF file (HTTP(S) URL, S3 URL or local path)
        #[arg(long, env = "NCREGRID_SOURCE")]
        source: Option<String>,

        /// Output NetCDF file (local or S3)
        #[arg(short, long, env = "NCREGRID_OUTPUT")]
        output: Option<String>,

        /// Data variable to regrid
        #[arg(short = 'n', long, env = "NCREGRID_VARIABLE")]
        variable: Option<String>,

        /// Directory the source is downloaded into
        #[arg(long, env = "NCREGRID_CACHE_DIR")]
        cache_dir: Option<String>,

        /// Target grid: lat_min:lat_max:n_lat,lon_min:lon_max:n_lon
        #[arg(long, env = "NCREGRID_GRID", value_parser = parse_grid)]
        grid: Option<TargetGridSpec>,

        /// Region to extract: min_lon,min_lat,max_lon,max_lat
        #[arg(long, env = "NCREGRID_REGION", value_parser = parse_region, allow_hyphen_values = true)]
        region: Option<BoundingBox>,

        /// Directory for per-stage PNG plots
        #[arg(long = "plots", env = "NCREGRID_PLOTS_DIR")]
        plots_dir: Option<String>,

        /// JSON coastline file drawn on the plots
        #[arg(long, env = "NCREGRID_COASTLINES")]
        coastlines: Option<String>,

        /// Dry run - validate configuration without processing
        #[arg(long, env = "NCREGRID_DRY_RUN")]
        dry_run: bool,
    },

    /// Validate configuration file or arguments
    #[command(long_about = "
Validate a configuration file without fetching anything.

This checks the file syntax, the target grid (ordered limits, at least two
points per axis), the region and the output destination.

EXAMPLES:
  # Validate a configuration file
  ncregrid validate london.json

  # Validate with detailed output
  ncregrid validate london.yaml --detailed
")]
    Validate {
        /// Configuration file to validate
        config_file: Option<PathBuf>,

        /// Show detailed validation report
        #[arg(long)]
        detailed: bool,
    },

    /// Show information about NetCDF file
    #[command(long_about = "
Inspect a NetCDF file (local, S3 or HTTP(S)) and show its dimensions,
variables and the gridded field ncregrid would load from it: axes, extent,
coordinate reference frame and value range.

EXAMPLES:
  # Basic file info
  ncregrid info data/t1p5m.nc

  # Detailed information with attributes
  ncregrid info data/t1p5m.nc --detailed

  # Info about specific variable, as JSON
  ncregrid info data/t1p5m.nc -n air_temperature --format json
")]
    Info {
        /// NetCDF file path (local, S3 or HTTP(S))
        file: String,

        /// Show variable and global attributes
        #[arg(long)]
        detailed: bool,

        /// Show only specific variable info
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format for file information
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Generate configuration templates
    #[command(long_about = "
Generate configuration file templates.

Available templates:
• basic: Defaults with a placeholder source
• london: London extract from the UKV grid with plots enabled
• rotated-pole: A source on a rotated-pole grid

EXAMPLES:
  # Generate basic JSON template
  ncregrid template basic

  # Generate YAML template to file
  ncregrid template london --format yaml -o london.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish, and PowerShell.

INSTALLATION:
  # Bash
  ncregrid completions bash > ~/.bash_completion.d/ncregrid

  # Zsh
  ncregrid completions zsh > ~/.zsh/completions/_ncregrid

  # Fish
  ncregrid completions fish > ~/.config/fish/completions/ncregrid.fish
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Defaults with a placeholder source
    Basic,
    /// London extract with plots
    London,
    /// Rotated-pole source
    RotatedPole,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// `run` options given on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub source: Option<String>,
    pub output: Option<String>,
    pub variable: Option<String>,
    pub cache_dir: Option<String>,
    pub grid: Option<TargetGridSpec>,
    pub region: Option<BoundingBox>,
    pub plots_dir: Option<String>,
    pub coastlines: Option<String>,
}

impl RunOverrides {
    /// Overlays the given options on a base configuration.
    pub fn apply(self, mut config: JobConfig) -> JobConfig {
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(variable) = self.variable {
            config.variable = Some(variable);
        }
        if let Some(cache_dir) = self.cache_dir {
            config.cache_dir = cache_dir;
        }
        if let Some(grid) = self.grid {
            config.target_grid = grid;
        }
        if let Some(region) = self.region {
            config.region = region;
        }
        if let Some(plots_dir) = self.plots_dir {
            config.plots_dir = Some(plots_dir);
        }
        if let Some(coastlines) = self.coastlines {
            config.coastlines = Some(coastlines);
        }
        config
    }
}

fn parse_number(s: &str, what: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid {}: '{}'", what, s.trim()))
}

fn parse_count(s: &str, what: &str) -> Result<usize, String> {
    s.trim()
        .parse::<usize>()
        .map_err(|_| format!("Invalid {}: '{}'", what, s.trim()))
}

/// Parse a target grid from command line argument
/// Format: lat_min:lat_max:n_lat,lon_min:lon_max:n_lon
pub fn parse_grid(s: &str) -> Result<TargetGridSpec, String> {
    let axes: Vec<&str> = s.split(',').collect();
    if axes.len() != 2 {
        return Err(format!(
            "Invalid grid format. Expected 'lat_min:lat_max:n_lat,lon_min:lon_max:n_lon', got '{}'",
            s
        ));
    }
    let lat: Vec<&str> = axes[0].split(':').collect();
    let lon: Vec<&str> = axes[1].split(':').collect();
    if lat.len() != 3 || lon.len() != 3 {
        return Err(format!(
            "Invalid grid format. Each axis needs 'min:max:count', got '{}'",
            s
        ));
    }

    let spec = TargetGridSpec {
        lat_min: parse_number(lat[0], "latitude minimum")?,
        lat_max: parse_number(lat[1], "latitude maximum")?,
        n_lat: parse_count(lat[2], "latitude count")?,
        lon_min: parse_number(lon[0], "longitude minimum")?,
        lon_max: parse_number(lon[1], "longitude maximum")?,
        n_lon: parse_count(lon[2], "longitude count")?,
    };
    spec.validate().map_err(|e| e.to_string())?;
    Ok(spec)
}

/// Parse a bounding box from command line argument
/// Format: min_lon,min_lat,max_lon,max_lat
pub fn parse_region(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Invalid region format. Expected 'min_lon,min_lat,max_lon,max_lat', got '{}'",
            s
        ));
    }

    let bbox = BoundingBox::new(
        parse_number(parts[0], "minimum longitude")?,
        parse_number(parts[1], "minimum latitude")?,
        parse_number(parts[2], "maximum longitude")?,
        parse_number(parts[3], "maximum latitude")?,
    );
    bbox.validate().map_err(|e| e.to_string())?;
    Ok(bbox)
}

/// Configuration produced by each template
pub fn template_config(template_type: &TemplateType) -> JobConfig {
    match template_type {
        TemplateType::Basic => JobConfig::default(),
        TemplateType::London => JobConfig {
            variable: Some("air_temperature".to_string()),
            target_grid: TargetGridSpec {
                lat_min: 50.5,
                lat_max: 52.5,
                n_lat: 41,
                lon_min: -1.5,
                lon_max: 1.0,
                n_lon: 51,
            },
            plots_dir: Some("plots".to_string()),
            ..JobConfig::default()
        },
        TemplateType::RotatedPole => JobConfig {
            source: "data/rotated_pole_t1p5m.nc".to_string(),
            variable: Some("air_temperature".to_string()),
            output: "rotated_pole_extract.nc".to_string(),
            ..JobConfig::default()
        },
    }
}

/// Renders a template in the requested format.
pub fn render_template(
    template_type: &TemplateType,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let config = template_config(template_type);
    let text = match format {
        ConfigFormat::Json => config.to_json()?,
        ConfigFormat::Yaml => config.to_yaml()?,
    };
    Ok(text)
}
