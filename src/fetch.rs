//! Document fetching
//!
//! Resolves a material's file URL to bytes. `http(s)://` goes through
//! reqwest. `file://` reads from the local filesystem and is refused unless
//! `fetch.allow_file_urls` is set.

use crate::config::FetchConfig;
use crate::error::{Error, IngestError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Resolves a file URL to its bytes
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Fetch the document. Any failure is an `IngestError::Fetch`.
    async fn fetch(&self, file_url: &str) -> std::result::Result<Vec<u8>, IngestError>;
}

/// HTTP(S) and `file://` fetcher
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
    allow_file_urls: bool,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
            allow_file_urls: config.allow_file_urls,
        })
    }

    async fn fetch_http(&self, url: Url) -> std::result::Result<Vec<u8>, IngestError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| IngestError::Fetch(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Fetch(format!("HTTP {}: {}", status, url)));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(self.too_large(len as usize));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| IngestError::Fetch(format!("reading {} failed: {}", url, e)))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_bytes {
                return Err(self.too_large(body.len()));
            }
        }

        Ok(body)
    }

    async fn fetch_file(&self, url: &Url) -> std::result::Result<Vec<u8>, IngestError> {
        let path = url
            .to_file_path()
            .map_err(|_| IngestError::Fetch(format!("invalid file URL: {}", url)))?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| IngestError::Fetch(format!("{}: {}", path.display(), e)))?;
        if metadata.len() as usize > self.max_bytes {
            return Err(self.too_large(metadata.len() as usize));
        }

        tokio::fs::read(&path)
            .await
            .map_err(|e| IngestError::Fetch(format!("{}: {}", path.display(), e)))
    }

    fn too_large(&self, size: usize) -> IngestError {
        IngestError::Fetch(format!(
            "document is {} bytes, limit is {}",
            size, self.max_bytes
        ))
    }
}

#[async_trait]
impl BlobFetcher for HttpFetcher {
    async fn fetch(&self, file_url: &str) -> std::result::Result<Vec<u8>, IngestError> {
        let url = Url::parse(file_url)
            .map_err(|e| IngestError::Fetch(format!("invalid URL {}: {}", file_url, e)))?;

        debug!(url = %url, "Fetching document");
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            "file" if self.allow_file_urls => self.fetch_file(&url).await,
            "file" => Err(IngestError::Fetch(format!(
                "file URLs are disabled: {}",
                url
            ))),
            other => Err(IngestError::Fetch(format!(
                "unsupported URL scheme: {}",
                other
            ))),
        }
    }
}
