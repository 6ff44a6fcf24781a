// src/delta/mod.rs

//! Delta packages
//!
//! A delta package has the same layout as a full package, except that each
//! file under `lib/` is replaced by how to derive it from the previous
//! version:
//!
//! ```text
//! lib/net45/app.exe.bsdiff   bsdiff patch against the base file
//! lib/net45/app.exe.shasum   "<SHA1> app.exe.shasum <size>" of the result
//! lib/net45/app.exe.diff     patch for an external diff tool
//! lib/net45/new.dll          shipped verbatim
//! ```
//!
//! A zero-length `.bsdiff`/`.diff` means the file is unchanged. Base files
//! under `lib/` with no entry in the delta were removed in the new version.
//! Files outside `lib/` (the nuspec, package metadata) are always copied
//! from the delta.
//!
//! # Architecture
//!
//! - **DeltaPackageBuilder**: holds the scratch directory, archive format
//!   and diff engine shared by apply and create
//! - **applier**: reconstructs a full package from base + delta(s)
//! - **generator**: produces a delta from two full packages
//! - **DeltaMetrics**: bandwidth savings of a generated delta

mod applier;
mod engine;
mod generator;
mod metrics;

pub use engine::{CommandDiffEngine, DiffEngine, UnsupportedDiffEngine};
pub use metrics::{DeltaMetrics, FileOutcome, MAX_DELTA_RATIO};

use crate::archive::{Archive, ZipArchive};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

/// Suffix of a bsdiff patch entry
pub const BSDIFF_SUFFIX: &str = ".bsdiff";

/// Suffix of an external-tool patch entry
pub const DIFF_SUFFIX: &str = ".diff";

/// Suffix of the checksum side-channel file
pub const SHASUM_SUFFIX: &str = ".shasum";

/// Builds and applies delta packages
#[derive(Clone)]
pub struct DeltaPackageBuilder {
    temp_dir: PathBuf,
    archive: Arc<dyn Archive>,
    diff_engine: Arc<dyn DiffEngine>,
    cancel: CancellationToken,
}

impl DeltaPackageBuilder {
    /// Builder scratching under `temp_dir`, with zip packages and no
    /// external diff support
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            archive: Arc::new(ZipArchive::new()),
            diff_engine: Arc::new(UnsupportedDiffEngine),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_diff_engine(mut self, engine: Arc<dyn DiffEngine>) -> Self {
        self.diff_engine = engine;
        self
    }

    /// Checked between files; a fired token fails the operation
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn scratch_dir(&self, prefix: &str) -> Result<TempDir> {
        fs::create_dir_all(&self.temp_dir)?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.temp_dir)
            .map_err(|e| {
                Error::IoError(format!(
                    "Failed to create scratch directory in {}: {}",
                    self.temp_dir.display(),
                    e
                ))
            })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Pack `src_dir` into `output`.
    ///
    /// The archive is written next to `output` and renamed into place, so a
    /// failure never leaves a partial package behind.
    fn pack_into(&self, src_dir: &Path, output: &Path) -> Result<()> {
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let partial = tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(".nupkg")
            .tempfile_in(&parent)?
            .into_temp_path();
        self.archive.create_from_directory(&partial, src_dir)?;
        partial.persist(output).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", output.display(), e.error))
        })?;
        debug!("Wrote package {}", output.display());
        Ok(())
    }
}

/// Every file under `root`, as sorted `/`-separated relative paths
pub(crate) fn relative_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}

/// Whether a relative package path lives under `lib/` (any case)
pub(crate) fn is_lib_path(relative: &str) -> bool {
    relative
        .split('/')
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case("lib"))
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// `app.exe.bsdiff` / `app.exe.diff` to `app.exe`; anything else unchanged
pub(crate) fn strip_patch_suffix(relative: &str) -> &str {
    for suffix in [BSDIFF_SUFFIX, DIFF_SUFFIX] {
        if ends_with_ignore_case(relative, suffix) {
            return &relative[..relative.len() - suffix.len()];
        }
    }
    relative
}
