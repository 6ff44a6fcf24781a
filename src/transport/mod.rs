// src/transport/mod.rs

//! Feed transports
//!
//! A feed is either an HTTP(S) location or a local directory. Both serve a
//! `RELEASES` manifest plus the packages it lists. Locations passed to a
//! transport are either relative to the feed root (a bare filename) or an
//! absolute URL taken from a manifest entry.
//!
//! - **http**: reqwest client with timeout and retry
//! - **local**: plain file copies, manifest generated when missing

mod http;
mod local;

pub use http::HttpTransport;
pub use local::LocalTransport;

use crate::config::UpdaterConfig;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::release::RELEASES_FILENAME;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Buffer size for streaming copies
pub(crate) const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Source of manifests and packages
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a whole resource into memory
    async fn download_bytes(&self, location: &str) -> Result<Vec<u8>>;

    /// Stream a resource into `dest`, reporting 0..100 on `progress`.
    ///
    /// A partially written `dest` is removed when the transfer fails or is
    /// cancelled.
    async fn download_to_file(
        &self,
        location: &str,
        dest: &Path,
        progress: Arc<dyn ProgressTracker>,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// The feed's manifest text
    async fn fetch_releases(&self) -> Result<String> {
        let bytes = self.download_bytes(RELEASES_FILENAME).await?;
        String::from_utf8(bytes)
            .map_err(|e| Error::CorruptManifest(format!("RELEASES is not UTF-8: {}", e)))
    }

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// True for `http://` and `https://` sources
pub fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Pick the transport for a configured update source
pub fn transport_for(config: &UpdaterConfig) -> Result<Arc<dyn Transport>> {
    let source = config.update_source.trim();

    if is_remote(source) {
        let transport = HttpTransport::new(source, config.http_timeout(), config.download_retries)?;
        return Ok(Arc::new(transport));
    }

    let dir = match Url::parse(source) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| Error::ConfigError(format!("Invalid file URL: {}", source)))?,
        _ => PathBuf::from(source),
    };

    if !dir.is_dir() {
        return Err(Error::ConfigError(format!(
            "Update source {} is neither an http(s) URL nor a directory",
            source
        )));
    }
    Ok(Arc::new(LocalTransport::new(dir)))
}
