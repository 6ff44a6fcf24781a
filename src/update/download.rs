// src/update/download.rs

//! Concurrent package downloads into the local package store

use super::UpdateManager;
use crate::error::{Error, Result};
use crate::hash::{verify_file, HashAlgorithm};
use crate::progress::{ProgressTracker, WeightedProgress, PERCENT};
use crate::release::ReleaseEntry;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

impl UpdateManager {
    pub(super) async fn download_releases_impl(
        &self,
        releases: &[ReleaseEntry],
        progress: Arc<dyn ProgressTracker>,
    ) -> Result<()> {
        if releases.is_empty() {
            progress.set_position(PERCENT);
            return Ok(());
        }

        let packages_dir = self.config.packages_dir();
        tokio::fs::create_dir_all(&packages_dir).await?;

        let max_concurrent = self.config.max_concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let weighted = WeightedProgress::new(progress.clone(), releases.len());

        info!(
            "Downloading {} package(s) via {} (max {} concurrent)",
            releases.len(),
            self.transport.name(),
            max_concurrent
        );

        let downloads = stream::iter(releases.iter().enumerate())
            .map(|(i, entry)| {
                let permit = semaphore.clone();
                let slot = weighted.slot(i);
                let target = packages_dir.join(entry.filename());
                async move {
                    let _permit = permit
                        .acquire()
                        .await
                        .map_err(|e| Error::DownloadError(format!("Download pool closed: {e}")))?;
                    self.download_one(entry, &target, slot).await
                }
            })
            .buffer_unordered(max_concurrent);

        let results: Vec<Result<()>> = downloads.collect().await;
        for result in results {
            result?;
        }

        progress.set_position(PERCENT);
        Ok(())
    }

    async fn download_one(
        &self,
        entry: &ReleaseEntry,
        target: &Path,
        progress: Arc<dyn ProgressTracker>,
    ) -> Result<()> {
        if target.exists() && verify_package(target.to_path_buf(), entry.clone()).await.is_ok() {
            debug!("{} already downloaded and valid", entry.filename());
            progress.set_position(PERCENT);
            return Ok(());
        }

        let location = entry.location();
        match self.fetch_verified(&location, entry, target, &progress).await {
            Ok(()) => Ok(()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                let lowered = location.to_lowercase();
                if lowered == location {
                    return Err(e);
                }
                warn!(
                    "Downloading {} failed ({}), retrying as {}",
                    entry.filename(),
                    e,
                    lowered
                );
                progress.set_position(0);
                // Report the first failure; the lowercased name is a guess
                self.fetch_verified(&lowered, entry, target, &progress)
                    .await
                    .map_err(|retry| {
                        debug!("Retry as {} failed: {}", lowered, retry);
                        e
                    })
            }
        }
    }

    async fn fetch_verified(
        &self,
        location: &str,
        entry: &ReleaseEntry,
        target: &Path,
        progress: &Arc<dyn ProgressTracker>,
    ) -> Result<()> {
        self.transport
            .download_to_file(location, target, progress.clone(), &self.cancel)
            .await?;

        if let Err(e) = verify_package(target.to_path_buf(), entry.clone()).await {
            warn!("Removing corrupt download {}", target.display());
            let _ = tokio::fs::remove_file(target).await;
            return Err(e);
        }
        info!("Downloaded {}", entry.filename());
        Ok(())
    }
}

/// Size and SHA-1 check of a downloaded package, off the async runtime
async fn verify_package(path: PathBuf, entry: ReleaseEntry) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        verify_file(&path, entry.filesize(), entry.sha1(), HashAlgorithm::Sha1).map_err(|e| {
            Error::ChecksumMismatch {
                path: entry.filename().to_string(),
                expected: e.expected,
                actual: e.actual,
            }
        })
    })
    .await
    .map_err(|e| Error::IoError(format!("Verification task failed: {e}")))?
}
