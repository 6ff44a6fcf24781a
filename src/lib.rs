// src/lib.rs

//! Updraft application self-update engine
//!
//! Keeps an installed application current from a feed of versioned
//! packages, downloading binary deltas instead of full packages when that
//! is cheaper.
//!
//! # Architecture
//!
//! - Feeds: a `RELEASES` manifest plus `.nupkg` (zip) packages, served
//!   over HTTP or from a directory
//! - Deltas: per-file BSDIFF40 patches with SHA-1 side channels, chained
//!   to reach the newest version
//! - Installs: each version in its own `app-<version>` directory, `current`
//!   swapped by rename, leftovers collected on the next run
//! - Exclusion: one update at a time per install root, via a file lock

pub mod archive;
pub mod bsdiff;
pub mod config;
pub mod delta;
mod error;
pub mod filesystem;
pub mod hash;
pub mod process;
pub mod progress;
pub mod release;
pub mod shell;
pub mod transport;
pub mod update;
pub mod version;

pub use config::UpdaterConfig;
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressTracker, ScaledProgress, SilentProgress,
};
pub use release::{ReleaseEntry, ReleaseSet};
pub use update::{UpdateInfo, UpdateManager, UpdateState};
pub use version::PackageVersion;
