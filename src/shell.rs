// src/shell.rs

//! Desktop integration hooks run after a version is promoted
//!
//! Failures here are logged by the caller and never fail an update.

use crate::error::Result;
use crate::version::PackageVersion;
use std::path::{Path, PathBuf};
use tracing::info;

pub trait ShellIntegration: Send + Sync {
    /// Point shortcuts that target any of `old_dirs` at `new_dir`
    fn rewrite_shortcuts(&self, old_dirs: &[PathBuf], new_dir: &Path) -> Result<()>;

    /// Record `version` with the platform's uninstall registry
    fn register_uninstaller(&self, version: &PackageVersion) -> Result<()>;
}

/// Logs what it would do
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopShell;

impl ShellIntegration for NoopShell {
    fn rewrite_shortcuts(&self, old_dirs: &[PathBuf], new_dir: &Path) -> Result<()> {
        if old_dirs.is_empty() {
            info!("No previous versions, no shortcuts to rewrite");
            return Ok(());
        }
        for dir in old_dirs {
            info!(
                "Would rewrite shortcuts from {} to {}",
                dir.display(),
                new_dir.display()
            );
        }
        Ok(())
    }

    fn register_uninstaller(&self, version: &PackageVersion) -> Result<()> {
        info!("Would register uninstaller for version {}", version);
        Ok(())
    }
}
