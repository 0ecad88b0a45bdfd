//! # Error Types
//!
//! Every stage of the pipeline reports failures through [`RegridError`]. The
//! variants follow the three failure families of the pipeline:
//!
//! - **Transport**: the source could not be fetched or stored
//! - **Format**: the NetCDF content is not a usable 2D gridded field
//! - **Domain**: the request makes no sense for the data (undefined frame
//!   transform, degenerate grid or bounding box)
//!
//! None of them is recovered from; the CLI reports the error and exits.

use crate::storage::StorageError;
use thiserror::Error;

/// Errors produced by the loading, regridding, extraction, rendering and
/// writing stages.
#[derive(Error, Debug)]
pub enum RegridError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Field '{0}' is empty; nothing to write")]
    EmptyField(String),
}

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, RegridError>;

impl RegridError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        RegridError::Format(msg.into())
    }

    pub(crate) fn domain(msg: impl Into<String>) -> Self {
        RegridError::Domain(msg.into())
    }
}

impl From<reqwest::Error> for RegridError {
    fn from(e: reqwest::Error) -> Self {
        RegridError::Fetch(e.to_string())
    }
}
