// src/update/info.rs

//! Choosing what to download
//!
//! [`UpdateInfo::create`] decides between a chain of delta packages and the
//! latest full package. It is a pure function of its inputs.

use crate::error::{Error, Result};
use crate::release::{ReleaseEntry, ReleaseSet};
use crate::version::PackageVersion;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The plan for one update cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Installed full release, `None` on first install
    pub currently_installed: Option<ReleaseEntry>,
    /// Empty, one full entry, or an ascending chain of deltas
    pub releases_to_apply: Vec<ReleaseEntry>,
    /// The release the plan ends at
    pub future_release: ReleaseEntry,
    /// Local package store the plan downloads into
    pub package_directory: PathBuf,
}

impl UpdateInfo {
    /// Resolve the cheapest way from `current` to the newest release in
    /// `remote`.
    ///
    /// Deltas are chosen only when every newer version has one and their
    /// combined size is below the latest full package.
    pub fn create(
        current: Option<&ReleaseEntry>,
        remote: &ReleaseSet,
        package_directory: impl Into<PathBuf>,
    ) -> Result<Self> {
        let package_directory = package_directory.into();
        let latest_full = remote.latest_full().ok_or(Error::NoFullRelease)?;

        let Some(current) = current else {
            debug!("Nothing installed, planning full {}", latest_full.filename());
            return Ok(Self::with_releases(
                None,
                vec![latest_full.clone()],
                latest_full,
                package_directory,
            ));
        };

        if current.version() >= latest_full.version() {
            debug!("{} is up to date", current.version());
            return Ok(Self::with_releases(
                Some(current.clone()),
                Vec::new(),
                latest_full,
                package_directory,
            ));
        }

        let newer: Vec<&ReleaseEntry> = remote
            .iter()
            .filter(|e| e.version() > current.version())
            .collect();
        let newer_versions: BTreeSet<&PackageVersion> =
            newer.iter().map(|e| e.version()).collect();
        let deltas: Vec<ReleaseEntry> = newer
            .iter()
            .filter(|e| e.is_delta())
            .map(|e| (*e).clone())
            .collect();
        let delta_total: u64 = deltas.iter().map(ReleaseEntry::filesize).sum();
        let every_version_has_delta = deltas.len() == newer_versions.len();

        let releases = if every_version_has_delta
            && delta_total > 0
            && delta_total < latest_full.filesize()
        {
            debug!(
                "Delta chain of {} ({} bytes) beats full package ({} bytes)",
                deltas.len(),
                delta_total,
                latest_full.filesize()
            );
            deltas
        } else {
            debug!(
                "Full package {} ({} bytes) chosen over {} bytes of deltas",
                latest_full.filename(),
                latest_full.filesize(),
                delta_total
            );
            vec![latest_full.clone()]
        };

        Ok(Self::with_releases(
            Some(current.clone()),
            releases,
            latest_full,
            package_directory,
        ))
    }

    /// Plan `releases` as given; `fallback` is the future release of an
    /// empty plan
    pub(crate) fn with_releases(
        currently_installed: Option<ReleaseEntry>,
        releases_to_apply: Vec<ReleaseEntry>,
        fallback: &ReleaseEntry,
        package_directory: PathBuf,
    ) -> Self {
        let future_release = releases_to_apply
            .iter()
            .max_by(|a, b| a.version().cmp(b.version()))
            .unwrap_or(fallback)
            .clone();

        Self {
            currently_installed,
            releases_to_apply,
            future_release,
            package_directory,
        }
    }

    /// First install: nothing was installed before
    pub fn is_bootstrapping(&self) -> bool {
        self.currently_installed.is_none()
    }

    pub fn has_updates(&self) -> bool {
        !self.releases_to_apply.is_empty()
    }

    pub fn is_delta_chain(&self) -> bool {
        !self.releases_to_apply.is_empty() && self.releases_to_apply.iter().all(|e| e.is_delta())
    }

    /// Bytes the plan downloads
    pub fn download_size(&self) -> u64 {
        self.releases_to_apply.iter().map(ReleaseEntry::filesize).sum()
    }

    /// Where `entry` lives in the package store
    pub fn package_path(&self, entry: &ReleaseEntry) -> PathBuf {
        self.package_directory.join(entry.filename())
    }

    pub fn package_directory(&self) -> &Path {
        &self.package_directory
    }
}
