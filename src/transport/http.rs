// src/transport/http.rs

//! HTTP(S) feed transport

use super::Transport;
use crate::error::{Error, Result};
use crate::progress::{ProgressTracker, PERCENT};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Base delay between attempts, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 500;

/// HTTP transport rooted at a feed URL
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl HttpTransport {
    /// Create a transport for the feed at `base_url`
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        // Joining relative names needs a trailing slash on the base
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| Error::ConfigError(format!("Invalid feed URL {}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            max_retries: max_retries.max(1),
        })
    }

    /// Resolve a location against the feed root
    pub fn resolve(&self, location: &str) -> Result<Url> {
        if super::is_remote(location) {
            return Url::parse(location)
                .map_err(|e| Error::DownloadError(format!("Invalid URL {}: {}", location, e)));
        }
        self.base_url
            .join(location)
            .map_err(|e| Error::DownloadError(format!("Invalid location {}: {}", location, e)))
    }

    /// Send a GET, retrying connection failures and server errors
    async fn get_with_retry(&self, url: &Url) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.client.get(url.clone()).send().await;

            let retryable = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if !response.status().is_server_error() => {
                    return Err(Error::DownloadError(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }
                Ok(response) => format!("HTTP {}", response.status()),
                Err(e) => e.to_string(),
            };

            if attempt >= self.max_retries {
                return Err(Error::DownloadError(format!(
                    "Failed to fetch {} after {attempt} attempts: {retryable}",
                    url
                )));
            }
            warn!("Fetch of {} failed (attempt {}): {}, retrying...", url, attempt, retryable);
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
        }
    }

    async fn stream_to_file(
        &self,
        url: &Url,
        dest: &Path,
        progress: &Arc<dyn ProgressTracker>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let response = self.get_with_retry(url).await?;
        let total = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", dest.display()))
        })?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk
                .map_err(|e| Error::DownloadError(format!("Failed to read {}: {e}", url)))?;

            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if total > 0 {
                progress.set_position(downloaded * PERCENT / total);
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(downloaded)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download_bytes(&self, location: &str) -> Result<Vec<u8>> {
        let url = self.resolve(location)?;
        debug!("Fetching {}", url);

        let response = self.get_with_retry(&url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn download_to_file(
        &self,
        location: &str,
        dest: &Path,
        progress: Arc<dyn ProgressTracker>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let url = self.resolve(location)?;
        info!("Downloading {}", url);

        match self.stream_to_file(&url, dest, &progress, cancel).await {
            Ok(size) => {
                progress.set_position(PERCENT);
                Ok(size)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
