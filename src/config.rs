// src/config.rs

//! Updater configuration
//!
//! All state the engine touches hangs off an explicit [`UpdaterConfig`];
//! nothing is read from globals. A config can be built in code or loaded
//! from a TOML file:
//!
//! ```toml
//! root_dir = "/opt/myapp"
//! update_source = "https://releases.example.com/myapp"
//! max_concurrency = 4
//! diff_helper = "/usr/lib/myapp/msdelta-apply"
//! staging_client_id = "4f1c2e9a-8d3b-4c7e-9a6f-1b2c3d4e5f60"
//! ```
//!
//! # Layout under `root_dir`
//!
//! - `packages/` downloaded packages and the local `RELEASES`
//! - `app-<version>/` one directory per installed version
//! - `current/` the active version, swapped in by rename
//! - `staging/` scratch area for versions being installed

use crate::error::{Error, Result};
use crate::release::RELEASES_FILENAME;
use crate::version::PackageVersion;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Directory prefix of an installed version
pub const APP_DIR_PREFIX: &str = "app-";

/// File inside `current/` naming the version it holds
pub const VERSION_FILE: &str = ".version";

/// Configuration for one installed application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Root directory of the installed application
    pub root_dir: PathBuf,

    /// Feed location: an `http(s)://` URL or a local directory
    pub update_source: String,

    /// Where lock files and scratch extraction go
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// How long to wait for the update lock before giving up
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Pause between lock attempts
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,

    /// Concurrent package downloads
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Attempts per HTTP request before a download fails
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// External tool for `.diff` entries in delta packages
    #[serde(default)]
    pub diff_helper: Option<PathBuf>,

    /// Identity used for staged rollouts. Without one every staged
    /// release is visible.
    #[serde(default)]
    pub staging_client_id: Option<Uuid>,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_lock_timeout_ms() -> u64 {
    2000
}

fn default_lock_retry_ms() -> u64 {
    250
}

fn default_max_concurrency() -> usize {
    4
}

fn default_download_retries() -> u32 {
    4
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl UpdaterConfig {
    /// Configuration with defaults for everything but the two required fields
    pub fn new(root_dir: impl Into<PathBuf>, update_source: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            update_source: update_source.into(),
            temp_dir: default_temp_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_retry_ms: default_lock_retry_ms(),
            max_concurrency: default_max_concurrency(),
            download_retries: default_download_retries(),
            http_timeout_secs: default_http_timeout_secs(),
            diff_helper: None,
            staging_client_id: None,
        }
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration, retry: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self.lock_retry_ms = retry.as_millis() as u64;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_diff_helper(mut self, helper: impl Into<PathBuf>) -> Self {
        self.diff_helper = Some(helper.into());
        self
    }

    pub fn with_staging_client_id(mut self, id: Uuid) -> Self {
        self.staging_client_id = Some(id);
        self
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::ConfigError("root_dir must not be empty".to_string()));
        }
        if self.update_source.trim().is_empty() {
            return Err(Error::ConfigError("update_source must not be empty".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::ConfigError("max_concurrency must be at least 1".to_string()));
        }
        if self.lock_retry_ms == 0 {
            return Err(Error::ConfigError("lock_retry_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root_dir.join("packages")
    }

    pub fn releases_file(&self) -> PathBuf {
        self.packages_dir().join(RELEASES_FILENAME)
    }

    pub fn app_dir_for(&self, version: &PackageVersion) -> PathBuf {
        self.root_dir.join(format!("{}{}", APP_DIR_PREFIX, version))
    }

    pub fn current_dir(&self) -> PathBuf {
        self.root_dir.join("current")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root_dir.join("staging")
    }
}
