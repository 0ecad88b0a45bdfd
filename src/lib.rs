//! # ncregrid
//!
//! Loads a gridded NetCDF field (the Met Office UKV 1.5 m air temperature on
//! its Lambert azimuthal equal-area grid, or any CF-described 2D field),
//! regrids it bilinearly onto a regular latitude/longitude grid, crops a
//! region out of it and saves the result as NetCDF.
//!
//! ## Pipeline
//!
//! 1. **Load**: fetch the source (HTTP(S), `s3://` or local) into a cache
//!    directory and parse it into a [`field::GriddedField`]
//! 2. **Build target grid** from a [`grid::TargetGridSpec`]
//! 3. **Regrid** with a [`regrid::Regridder`], masking anything outside the
//!    source coverage
//! 4. **Extract** a [`extract::BoundingBox`]
//! 5. **Save** through [`writer::save_field`]
//!
//! Each stage can also be plotted to PNG with [`render::render_field`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ncregrid::{input::JobConfig, run_pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = JobConfig::from_file("london.yaml")?;
//!     let report = run_pipeline(&config, true, false).await?;
//!     println!("{:?}", report.extracted_shape);
//!     Ok(())
//! }
//! ```

pub mod crs;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod field;
pub mod grid;
pub mod info;
pub mod input;
pub mod loader;
pub mod log;
pub mod regrid;
pub mod render;
pub mod storage;
pub mod writer;

pub mod cli;


use crate::error::Result;
use crate::extract::extract_region;
use crate::fetch::{Fetcher, SourceFetcher};
use crate::field::GriddedField;
use crate::grid::build_target_grid;
use crate::input::JobConfig;
use crate::loader::{Loader, cache_path};
use crate::log::{show_field_summary, show_saved};
use crate::regrid::Regridder;
use crate::render::{RenderOptions, encode_png, load_coastlines, render_field};
use crate::storage::{LocalStorage, StorageBackend};
use crate::writer::{save_bytes, save_field};
use ::log::{info, warn};
use serde::Serialize;

/// What a pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub source_shape: (usize, usize),
    pub regridded_shape: (usize, usize),
    pub extracted_shape: (usize, usize),
    /// Masked cells in the regridded field
    pub masked_cells: usize,
    /// Where the extracted field was written; `None` when the region was empty
    pub output: Option<String>,
    pub plots: Vec<String>,
}

/// Runs the whole pipeline for `config`, fetching the source over the
/// network or from storage as its identifier dictates.
pub async fn run_pipeline(
    config: &JobConfig,
    show_progress: bool,
    quiet: bool,
) -> Result<PipelineReport> {
    let fetcher = SourceFetcher::for_source(&config.source, show_progress).await?;
    let loader = Loader::new(fetcher, LocalStorage);
    run_pipeline_with(config, &loader, quiet).await
}

/// Runs the pipeline with an explicit loader.
pub async fn run_pipeline_with<F: Fetcher, S: StorageBackend>(
    config: &JobConfig,
    loader: &Loader<F, S>,
    quiet: bool,
) -> Result<PipelineReport> {
    config.validate()?;
    let summary = |stage: &str, field: &GriddedField| {
        if !quiet {
            show_field_summary(stage, field);
        }
    };

    let plotter = match &config.plots_dir {
        Some(dir) => {
            let coastlines = match &config.coastlines {
                Some(path) => load_coastlines(path)?,
                None => Vec::new(),
            };
            Some(Plotter {
                dir: dir.trim_end_matches('/').to_string(),
                options: RenderOptions {
                    coastlines,
                    ..RenderOptions::default()
                },
            })
        }
        None => None,
    };
    let mut plots = Vec::new();

    let cache = cache_path(&config.cache_dir, &config.source);
    let cache = cache.to_string_lossy();
    let source = loader
        .load(&config.source, &cache, config.variable.as_deref())
        .await?;
    summary("Source field", &source);
    if let Some(plotter) = &plotter {
        plots.push(plotter.plot("source", &source).await?);
    }

    let target = build_target_grid(&config.target_grid)?;
    summary("Target grid", &target);
    if let Some(plotter) = &plotter {
        plots.push(plotter.plot("target_grid", &target).await?);
    }

    let regridder = Regridder::new(&source, &target)?;
    info!(
        "{:.1}% of the target grid lies inside the source coverage",
        regridder.coverage() * 100.0
    );
    let regridded = regridder.regrid(&source)?;
    summary("Regridded field", &regridded);
    if let Some(plotter) = &plotter {
        plots.push(plotter.plot("regridded", &regridded).await?);
    }

    let extracted = extract_region(&regridded, &config.region)?;
    summary("Extracted region", &extracted);

    let output = if extracted.is_empty() {
        warn!(
            "Region {} does not intersect the regridded field; nothing saved",
            config.region
        );
        None
    } else {
        if let Some(plotter) = &plotter {
            plots.push(plotter.plot("extracted", &extracted).await?);
        }
        save_field(&extracted, &config.output).await?;
        if !quiet {
            show_saved("extracted region", &config.output);
        }
        Some(config.output.clone())
    };

    Ok(PipelineReport {
        source_shape: source.shape(),
        regridded_shape: regridded.shape(),
        extracted_shape: extracted.shape(),
        masked_cells: regridded.masked_count(),
        output,
        plots,
    })
}

/// Writes one PNG per stage into a directory (local or `s3://`).
struct Plotter {
    dir: String,
    options: RenderOptions,
}

impl Plotter {
    async fn plot(&self, stage: &str, field: &GriddedField) -> Result<String> {
        let img = render_field(field, &self.options)?;
        let png = encode_png(&img)?;
        let destination = format!("{}/{}.png", self.dir, stage);
        save_bytes(&png, &destination).await?;
        info!("Plotted {} to {}", stage, destination);
        Ok(destination)
    }
}
