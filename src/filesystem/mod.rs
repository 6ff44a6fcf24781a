// src/filesystem/mod.rs

//! Filesystem helpers for installing versions in place
//!
//! Everything that changes what a running application sees goes through
//! one of two primitives: a same-directory temp file plus `rename` for
//! single files, and a directory `rename` for whole versions. Deletes of
//! old versions race with processes that still have them open, so they are
//! retried with backoff and, failing that, the directory is marked dead
//! with a `.dead` file for a later run to collect.

pub mod path;

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

/// Marker file placed in a version directory that could not be removed
pub const DEAD_MARKER: &str = ".dead";

/// Default number of attempts for [`retry_blocking`]
pub const DEFAULT_RETRIES: u32 = 4;

/// Base delay for [`retry_blocking`], doubled after each failure
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Write `data` to `path` through a temp file in the same directory
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        Error::IoError(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Recursively copy `src` into `dst`, creating directories as needed
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0u64;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::InvalidPath(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Run a blocking operation, retrying with exponential backoff.
///
/// The last error is returned once `attempts` runs have failed.
pub fn retry_blocking<T, F>(attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                log::debug!("Attempt {}/{} failed: {}, retrying", attempt, attempts, e);
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Remove a directory tree, retrying while something holds it open
pub fn delete_dir_with_retry(path: &Path) -> Result<()> {
    retry_blocking(DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, || {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::FilesystemContention {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    })
}

/// Flag a directory so later runs skip it and try to remove it again
pub fn mark_dead(dir: &Path) -> Result<()> {
    File::create(dir.join(DEAD_MARKER))?;
    log::warn!("Marked {} as dead", dir.display());
    Ok(())
}

pub fn is_dead(dir: &Path) -> bool {
    dir.join(DEAD_MARKER).exists()
}

/// Delete `dir`, or mark it dead if it refuses to go
pub fn delete_or_mark_dead(dir: &Path) -> bool {
    match delete_dir_with_retry(dir) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Couldn't delete {}: {}", dir.display(), e);
            if let Err(mark_err) = mark_dead(dir) {
                log::warn!("Couldn't mark {} dead: {}", dir.display(), mark_err);
            }
            false
        }
    }
}

/// Move `src` to `dst`, replacing whatever directory is at `dst`.
///
/// The previous `dst` is first renamed aside, so at every point either
/// the old or the new tree is complete at `dst` or at the aside path.
pub fn replace_dir(src: &Path, dst: &Path) -> Result<()> {
    let aside = dst.with_file_name(format!(
        ".{}.old-{}",
        dst.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        uuid::Uuid::new_v4().simple()
    ));

    let had_previous = dst.exists();
    if had_previous {
        fs::rename(dst, &aside).map_err(|e| Error::FilesystemContention {
            path: dst.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    if let Err(e) = fs::rename(src, dst) {
        if had_previous {
            // Put the old tree back before reporting
            let _ = fs::rename(&aside, dst);
        }
        return Err(Error::FilesystemContention {
            path: dst.to_path_buf(),
            reason: e.to_string(),
        });
    }

    if had_previous {
        delete_or_mark_dead(&aside);
    }
    Ok(())
}
