//! # Storage Backends
//!
//! Reading and writing whole files on the local filesystem or on Amazon S3
//! through one [`StorageBackend`] trait. The backend is picked from the path:
//! `s3://bucket/key` goes to S3, anything else is treated as a local path.
//!
//! The loader uses storage to place downloaded files into the cache
//! directory, and the writer uses it to publish the extracted region.
//!
//! ```rust,no_run
//! use ncregrid::storage::{StorageBackend, StorageFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = StorageFactory::from_path("s3://my-bucket/london.nc").await?;
//!     let bytes = storage.read("s3://my-bucket/london.nc").await?;
//!     storage.write("s3://my-bucket/copy/london.nc", &bytes).await?;
//!     Ok(())
//! }
//! ```

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use log::debug;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

const S3_SCHEME: &str = "s3://";

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS S3 GetObject error: {0}")]
    S3GetObject(
        #[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
    ),

    #[error("AWS S3 PutObject error: {0}")]
    S3PutObject(
        #[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>,
    ),

    #[error("AWS ByteStream error: {0}")]
    ByteStream(String),

    #[error("Invalid S3 path format: {0}")]
    InvalidS3Path(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Whole-file storage operations shared by every backend.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the entire file at `path`.
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Writes `data` to `path`, replacing any existing file. Local parent
    /// directories are created when missing.
    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;
}

/// Local filesystem backend
#[derive(Debug, Clone, Default)]
pub struct LocalStorage;

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::PathNotFound(path.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::PermissionDenied(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        debug!("Writing {} bytes to {}", data.len(), path);
        match fs::write(path, data).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::PermissionDenied(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Amazon S3 backend. Credentials come from the usual AWS environment
/// variables, credentials file or instance role.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    pub async fn new() -> StorageResult<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Ok(S3Storage {
            client: S3Client::new(&config),
        })
    }

    /// Splits `s3://bucket/key` into `(bucket, key)`.
    fn parse_s3_path(s3_path: &str) -> StorageResult<(String, String)> {
        let rest = s3_path.strip_prefix(S3_SCHEME).ok_or_else(|| {
            StorageError::InvalidS3Path(format!("S3 path must start with 's3://': {}", s3_path))
        })?;

        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok((bucket.to_string(), key.to_string()))
            }
            _ => Err(StorageError::InvalidS3Path(format!(
                "Invalid S3 path format. Expected 's3://bucket/key': {}",
                s3_path
            ))),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                aws_sdk_s3::error::SdkError::ServiceError(service_err)
                    if service_err.err().is_no_such_key() =>
                {
                    StorageError::PathNotFound(path.to_string())
                }
                _ => StorageError::S3GetObject(e),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ByteStream(e.to_string()))?
            .into_bytes()
            .to_vec();

        debug!("Read {} bytes from {}", data.len(), path);
        Ok(data)
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let (bucket, key) = Self::parse_s3_path(path)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(StorageError::S3PutObject)?;

        debug!("Uploaded {} bytes to {}", data.len(), path);
        Ok(())
    }
}

/// A backend chosen at runtime
#[derive(Debug)]
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

#[async_trait::async_trait]
impl StorageBackend for Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match self {
            Storage::Local(storage) => storage.read(path).await,
            Storage::S3(storage) => storage.read(path).await,
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        match self {
            Storage::Local(storage) => storage.write(path, data).await,
            Storage::S3(storage) => storage.write(path, data).await,
        }
    }
}

/// Picks a storage backend from a path
pub struct StorageFactory;

impl StorageFactory {
    pub async fn from_path(path: &str) -> StorageResult<Storage> {
        if Self::is_s3_path(path) {
            Ok(Storage::S3(S3Storage::new().await?))
        } else {
            Ok(Storage::Local(LocalStorage))
        }
    }

    pub fn is_s3_path(path: &str) -> bool {
        path.starts_with(S3_SCHEME)
    }

    pub fn is_http_path(path: &str) -> bool {
        path.starts_with("http://") || path.starts_with("https://")
    }

    pub fn is_local_path(path: &str) -> bool {
        !Self::is_s3_path(path) && !Self::is_http_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_write_read() -> Result<(), Box<dyn std::error::Error>> {
        let storage = LocalStorage;
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("cache").join("ukv.nc");
        let file_path_str = file_path.to_str().unwrap();

        // Parent directory is created on demand
        storage.write(file_path_str, b"CDF\x01").await?;
        assert_eq!(storage.read(file_path_str).await?, b"CDF\x01");

        // Writing again replaces the content
        storage.write(file_path_str, b"HDF").await?;
        assert_eq!(storage.read(file_path_str).await?, b"HDF");

        Ok(())
    }

    #[tokio::test]
    async fn test_local_storage_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let storage = LocalStorage;

        let result = storage.read("/nonexistent/path/file.nc").await;
        assert!(matches!(result, Err(StorageError::PathNotFound(_))));

        // Through the runtime-selected backend as well
        let storage = StorageFactory::from_path("/nonexistent/path/file.nc").await?;
        let result = storage.read("/nonexistent/path/file.nc").await;
        assert!(matches!(result, Err(StorageError::PathNotFound(_))));

        Ok(())
    }

    #[test]
    fn test_local_storage_from_sync_code() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plot.png");
        let path = path.to_str().unwrap();

        tokio_test::block_on(LocalStorage.write(path, b"\x89PNG")).unwrap();
        assert_eq!(tokio_test::block_on(LocalStorage.read(path)).unwrap(), b"\x89PNG");
    }

    #[test]
    fn test_s3_path_parsing() {
        let (bucket, key) = S3Storage::parse_s3_path("s3://met-office/ukv/air_temp.nc").unwrap();
        assert_eq!(bucket, "met-office");
        assert_eq!(key, "ukv/air_temp.nc");

        assert!(S3Storage::parse_s3_path("http://bucket/file.nc").is_err());
        assert!(S3Storage::parse_s3_path("s3://").is_err());
        assert!(S3Storage::parse_s3_path("s3://bucket").is_err());
        assert!(S3Storage::parse_s3_path("s3:///file.nc").is_err());
    }

    #[tokio::test]
    async fn test_storage_factory_path_detection() -> Result<(), Box<dyn std::error::Error>> {
        assert!(StorageFactory::is_s3_path("s3://bucket/file.nc"));
        assert!(StorageFactory::is_http_path("https://example.com/file.nc"));
        assert!(StorageFactory::is_local_path("data/file.nc"));
        assert!(!StorageFactory::is_local_path("http://example.com/file.nc"));

        let local = StorageFactory::from_path("/tmp/file.nc").await?;
        assert!(matches!(local, Storage::Local(_)));

        Ok(())
    }
}
