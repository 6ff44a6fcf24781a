// src/transport/local.rs

//! Local directory feed transport

use super::{Transport, STREAM_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::filesystem::path::join_under;
use crate::progress::{ProgressTracker, PERCENT};
use crate::release::{scan_packages, RELEASES_FILENAME};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Feed served from a directory on disk
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &str) -> Result<PathBuf> {
        if super::is_remote(location) {
            return Err(Error::InvalidPath(format!(
                "Absolute URL {} in a local feed",
                location
            )));
        }
        join_under(&self.root, location)
    }

    async fn copy_with_progress(
        &self,
        src: &Path,
        dest: &Path,
        progress: &Arc<dyn ProgressTracker>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut input = tokio::fs::File::open(src).await.map_err(|e| {
            Error::DownloadError(format!("Failed to open {}: {e}", src.display()))
        })?;
        let total = input.metadata().await?.len();
        let mut output = tokio::fs::File::create(dest).await?;
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
        let mut copied: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let read = input.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            output.write_all(&buffer[..read]).await?;
            copied += read as u64;
            if total > 0 {
                progress.set_position(copied * PERCENT / total);
            }
        }

        output.flush().await?;
        output.sync_all().await?;
        Ok(copied)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn download_bytes(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location)?;
        debug!("Reading {}", path.display());
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::DownloadError(format!("Failed to read {}: {e}", path.display())))
    }

    async fn download_to_file(
        &self,
        location: &str,
        dest: &Path,
        progress: Arc<dyn ProgressTracker>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let src = self.resolve(location)?;
        match self.copy_with_progress(&src, dest, &progress, cancel).await {
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

    /// Read `RELEASES`, or describe the packages present when the
    /// directory has none
    async fn fetch_releases(&self) -> Result<String> {
        let manifest = self.root.join(RELEASES_FILENAME);
        if manifest.exists() {
            let bytes = self.download_bytes(RELEASES_FILENAME).await?;
            return String::from_utf8(bytes)
                .map_err(|e| Error::CorruptManifest(format!("RELEASES is not UTF-8: {}", e)));
        }

        info!(
            "No {} in {}, generating from packages",
            RELEASES_FILENAME,
            self.root.display()
        );
        let root = self.root.clone();
        let set = tokio::task::spawn_blocking(move || scan_packages(&root))
            .await
            .map_err(|e| Error::IoError(format!("Package scan task failed: {e}")))??;
        Ok(set.to_manifest_string())
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::release::ReleaseSet;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_download_to_file() {
        let feed = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(feed.path().join("MyApp-1.0.0-full.nupkg"), b"package").unwrap();

        let transport = LocalTransport::new(feed.path());
        let progress = SilentProgress::percent();
        let dest = out.path().join("MyApp-1.0.0-full.nupkg");
        let size = transport
            .download_to_file(
                "MyApp-1.0.0-full.nupkg",
                &dest,
                progress.clone(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(size, 7);
        assert_eq!(fs::read(&dest).unwrap(), b"package");
        assert_eq!(progress.position(), 100);
    }

    #[tokio::test]
    async fn test_missing_file_leaves_nothing() {
        let feed = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let transport = LocalTransport::new(feed.path());
        let dest = out.path().join("missing.nupkg");

        let result = transport
            .download_to_file(
                "missing.nupkg",
                &dest,
                SilentProgress::percent(),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_cancelled_copy() {
        let feed = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(feed.path().join("a.nupkg"), vec![7u8; 1024]).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let dest = out.path().join("a.nupkg");
        let result = LocalTransport::new(feed.path())
            .download_to_file("a.nupkg", &dest, SilentProgress::percent(), &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_locations() {
        let feed = TempDir::new().unwrap();
        let transport = LocalTransport::new(feed.path());
        assert!(transport.download_bytes("../secret").await.is_err());
        assert!(transport.download_bytes("https://example.com/x").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_releases_generates_when_missing() {
        let feed = TempDir::new().unwrap();
        fs::write(feed.path().join("MyApp-1.0.0-full.nupkg"), b"one").unwrap();
        fs::write(feed.path().join("MyApp-1.1.0-full.nupkg"), b"two").unwrap();

        let text = LocalTransport::new(feed.path()).fetch_releases().await.unwrap();
        let set = ReleaseSet::parse(&text).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.latest_full().unwrap().version().to_string(), "1.1.0");

        // Nothing was written into the feed
        assert!(!feed.path().join(RELEASES_FILENAME).exists());
    }
}
