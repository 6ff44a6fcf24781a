// src/error.rs

//! Error types for the update engine
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! separate conditions callers are expected to react to (checksum failures,
//! lock contention, a broken delta chain) from plain I/O failures so that
//! the orchestrator can decide between retrying, falling back to a full
//! package, or surfacing the error.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Update engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// A RELEASES manifest or a single manifest line could not be parsed
    #[error("Corrupt release manifest: {0}")]
    CorruptManifest(String),

    /// Size or SHA-1 of a file did not match what the manifest promised
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A binary patch is structurally broken (bad magic, bad lengths)
    #[error("Corrupt patch: {0}")]
    CorruptPatch(String),

    /// Another process holds the update lock for this install root
    #[error("Couldn't acquire update lock, another instance may be running updates ({0})")]
    LockContention(PathBuf),

    /// A file or directory is in use and could not be changed
    #[error("Filesystem contention on {path}: {reason}")]
    FilesystemContention { path: PathBuf, reason: String },

    /// Reconstructing a full package from deltas failed
    #[error("Delta chain failed: {0}")]
    DeltaChain(String),

    /// Remote feed carries no full release to fall back to
    #[error("Release feed contains no full release")]
    NoFullRelease,

    /// Fetching a manifest or package failed
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Reading or writing a package archive failed
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Version string could not be parsed
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Path is not acceptable where it was given
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Archive entry tried to escape its extraction root
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Component could not be initialized
    #[error("Initialization error: {0}")]
    InitError(String),

    /// External helper tool failed
    #[error("Helper process failed: {0}")]
    ProcessError(String),

    /// Operation was cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for size/SHA-1 mismatches
    pub fn is_checksum(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }

    /// True when another process is holding the update lock
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::LockContention(_))
    }

    /// Whether a failed apply is worth repeating with full packages only.
    ///
    /// Lock contention and cancellation would fail the same way again.
    pub fn is_retryable_with_full(&self) -> bool {
        !matches!(self, Self::LockContention(_) | Self::Cancelled | Self::NoFullRelease)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveError(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
