// src/update/lock.rs

//! Cross-process update lock
//!
//! Only one process may check, download or apply updates for a given
//! install root at a time. The lock is an `flock(LOCK_EX)` on a file inside
//! the root itself, so every process that reaches the root, under any
//! spelling of its path and with any temp directory, contends on the same
//! inode. Unrelated installs never contend.
//!
//! # Example
//!
//! ```ignore
//! let path = UpdateLock::path_for(&config.root_dir)?;
//! let lock = UpdateLock::acquire(&path, config.lock_timeout(), config.lock_retry()).await?;
//! // ... update ...
//! // released on drop
//! ```

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lock file name under the install root
pub const LOCK_FILE_NAME: &str = ".updraft.lock";

/// Held exclusive lock on one install root
pub struct UpdateLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl UpdateLock {
    /// Lock file used for `root_dir`, creating the root if needed
    pub fn path_for(root_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(root_dir)?;
        let root = root_dir.canonicalize().map_err(|e| {
            Error::IoError(format!("Failed to resolve install root {:?}: {}", root_dir, e))
        })?;
        Ok(root.join(LOCK_FILE_NAME))
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns:
    /// - `Ok(Some(lock))` if the lock was acquired
    /// - `Ok(None)` if another process holds it
    /// - `Err` on I/O errors
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                log::info!("Acquired update lock at {:?}", path);
                Ok(Some(Self {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                log::debug!("Update lock already held at {:?}", path);
                Ok(None)
            }
            Err(e) => Err(Error::IoError(format!(
                "Failed to try-acquire update lock: {}",
                e
            ))),
        }
    }

    /// Acquire the lock, retrying every `retry` until `timeout` has passed
    pub async fn acquire(path: &Path, timeout: Duration, retry: Duration) -> Result<Self> {
        let started = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if started.elapsed() >= timeout {
                log::warn!(
                    "Gave up waiting for update lock at {:?} after {:?}",
                    path,
                    timeout
                );
                return Err(Error::LockContention(path.to_path_buf()));
            }
            tokio::time::sleep(retry).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        log::info!("Released update lock at {:?}", self.path);
    }
}
