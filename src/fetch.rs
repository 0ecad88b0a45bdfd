//! # Source Fetching
//!
//! The loader never talks to the network directly; it asks a [`Fetcher`] for
//! the bytes of a source. [`HttpFetcher`] downloads `http(s)://` URLs with a
//! progress bar, [`StorageFetcher`] reads `s3://` objects and local paths.
//! Tests plug in their own fetchers.

use crate::error::{RegridError, Result};
use crate::storage::{Storage, StorageBackend, StorageFactory};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

const MAX_PREALLOCATION: u64 = 64 << 20;

/// Retrieves the raw bytes of a source identifier.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>>;
}

/// Downloads over HTTP(S) with a single GET. Non-2xx responses are errors;
/// nothing is retried.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpFetcher {
    pub fn new(show_progress: bool) -> Self {
        HttpFetcher {
            client: reqwest::Client::new(),
            show_progress,
        }
    }

    pub fn with_client(client: reqwest::Client, show_progress: bool) -> Self {
        HttpFetcher {
            client,
            show_progress,
        }
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::with_template(
                    "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({eta})",
                ) {
                    bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
                }
                bar
            }
            None => ProgressBar::new_spinner(),
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        info!("Downloading {}", source);
        let mut response = self
            .client
            .get(source)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| RegridError::Fetch(format!("GET {} failed: {}", source, e)))?;

        let total = response.content_length();
        let bar = self.progress_bar(total);
        let mut data = Vec::with_capacity(preallocation(total));
        while let Some(chunk) = response.chunk().await? {
            bar.inc(chunk.len() as u64);
            data.extend_from_slice(&chunk);
        }
        bar.finish_and_clear();

        debug!("Downloaded {} bytes from {}", data.len(), source);
        Ok(data)
    }
}

/// Buffer size to reserve for a body of the announced length. The header is
/// only a hint, so the reservation is capped.
fn preallocation(content_length: Option<u64>) -> usize {
    content_length
        .map(|len| len.min(MAX_PREALLOCATION))
        .and_then(|len| usize::try_from(len).ok())
        .unwrap_or(0)
}

/// Reads sources through a storage backend (`s3://` or local paths).
#[derive(Debug)]
pub struct StorageFetcher {
    storage: Storage,
}

impl StorageFetcher {
    pub fn new(storage: Storage) -> Self {
        StorageFetcher { storage }
    }
}

#[async_trait::async_trait]
impl Fetcher for StorageFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        Ok(self.storage.read(source).await?)
    }
}

/// A fetcher chosen from the shape of the source identifier.
#[derive(Debug)]
pub enum SourceFetcher {
    Http(HttpFetcher),
    Storage(StorageFetcher),
}

impl SourceFetcher {
    pub async fn for_source(source: &str, show_progress: bool) -> Result<Self> {
        if StorageFactory::is_http_path(source) {
            Ok(SourceFetcher::Http(HttpFetcher::new(show_progress)))
        } else {
            let storage = StorageFactory::from_path(source).await?;
            Ok(SourceFetcher::Storage(StorageFetcher::new(storage)))
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for SourceFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        match self {
            SourceFetcher::Http(fetcher) => fetcher.fetch(source).await,
            SourceFetcher::Storage(fetcher) => fetcher.fetch(source).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_source_fetcher_selection() -> Result<()> {
        let http = SourceFetcher::for_source("https://example.com/ukv.nc", false).await?;
        assert!(matches!(http, SourceFetcher::Http(_)));

        let local = SourceFetcher::for_source("data/ukv.nc", false).await?;
        assert!(matches!(local, SourceFetcher::Storage(_)));
        Ok(())
    }

    #[test]
    fn test_preallocation_is_capped() {
        assert_eq!(preallocation(None), 0);
        assert_eq!(preallocation(Some(1024)), 1024);
        assert_eq!(preallocation(Some(u64::MAX)), MAX_PREALLOCATION as usize);
        assert_eq!(
            preallocation(Some(i64::MAX as u64)),
            MAX_PREALLOCATION as usize
        );
    }

    fn local_fetcher() -> Result<HttpFetcher> {
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(HttpFetcher::with_client(client, false))
    }

    /// Serves one canned HTTP response on a local port.
    async fn serve_once(response: &'static [u8]) -> std::io::Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            }
        });
        Ok(format!("http://{}/ukv.nc", addr))
    }

    #[tokio::test]
    async fn test_oversized_content_length_is_not_fatal() -> Result<()> {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 9223372036854775807\r\nConnection: close\r\n\r\nCDF\x01",
        )
        .await?;

        let result = local_fetcher()?.fetch(&url).await;
        assert!(matches!(result, Ok(_) | Err(RegridError::Fetch(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_fetch_reads_body_and_rejects_errors() -> Result<()> {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nCDF\x01",
        )
        .await?;
        assert_eq!(local_fetcher()?.fetch(&url).await?, b"CDF\x01");

        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await?;
        let result = local_fetcher()?.fetch(&url).await;
        assert!(matches!(result, Err(RegridError::Fetch(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_fetcher_reads_local_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("source.nc");
        std::fs::write(&path, b"netcdf bytes")?;

        let fetcher = StorageFetcher::new(Storage::Local(LocalStorage));
        let data = fetcher.fetch(path.to_str().unwrap()).await?;
        assert_eq!(data, b"netcdf bytes");
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_fetcher_missing_file_is_an_error() {
        let fetcher = StorageFetcher::new(Storage::Local(LocalStorage));
        let result = fetcher.fetch("/nonexistent/source.nc").await;
        assert!(matches!(result, Err(RegridError::Storage(_))));
    }
}
