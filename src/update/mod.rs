// src/update/mod.rs

//! Update orchestration
//!
//! [`UpdateManager`] drives one install root through
//! check -> download -> apply:
//!
//! - **check**: compare the local `RELEASES` with the feed and resolve an
//!   [`UpdateInfo`]
//! - **download**: fetch the planned packages into `packages/`, verifying
//!   size and SHA-1
//! - **apply**: rebuild full packages from deltas, install into
//!   `app-<version>`, swap `current`, clean up
//!
//! Each public operation holds the cross-process [`UpdateLock`] for its
//! duration. `update_app` runs all three under one lock and repeats the
//! cycle with full packages only if the first attempt fails.

mod download;
mod info;
mod install;
mod lock;

pub use info::UpdateInfo;
pub use lock::{UpdateLock, LOCK_FILE_NAME};

use crate::archive::{Archive, ZipArchive};
use crate::config::{UpdaterConfig, VERSION_FILE};
use crate::delta::{CommandDiffEngine, DeltaPackageBuilder, DiffEngine, UnsupportedDiffEngine};
use crate::error::{Error, Result};
use crate::filesystem::{delete_dir_with_retry, is_dead};
use crate::progress::{ProgressTracker, ScaledProgress, PERCENT};
use crate::release::{ReleaseEntry, ReleaseSet};
use crate::shell::{NoopShell, ShellIntegration};
use crate::transport::{transport_for, Transport};
use crate::version::PackageVersion;
use install::{app_dirs, Installer};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where an [`UpdateManager`] is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    Downloading,
    Applying,
    Failed,
}

impl UpdateState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Checking | Self::Downloading | Self::Applying)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Applying => "applying",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Self-update engine for one install root
pub struct UpdateManager {
    config: UpdaterConfig,
    transport: Arc<dyn Transport>,
    archive: Arc<dyn Archive>,
    diff_engine: Arc<dyn DiffEngine>,
    shell: Arc<dyn ShellIntegration>,
    cancel: CancellationToken,
    state: Mutex<UpdateState>,
}

impl UpdateManager {
    /// Manager with the transport the config's source calls for, zip
    /// packages, no-op shell integration, and the configured diff helper
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        config.validate()?;
        let transport = transport_for(&config)?;
        let cancel = CancellationToken::new();
        let diff_engine: Arc<dyn DiffEngine> = match &config.diff_helper {
            Some(helper) => Arc::new(CommandDiffEngine::new(helper).with_cancellation(cancel.clone())),
            None => Arc::new(UnsupportedDiffEngine),
        };

        Ok(Self {
            config,
            transport,
            archive: Arc::new(ZipArchive::new()),
            diff_engine,
            shell: Arc::new(NoopShell),
            cancel,
            state: Mutex::new(UpdateState::Idle),
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_diff_engine(mut self, engine: Arc<dyn DiffEngine>) -> Self {
        self.diff_engine = engine;
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn ShellIntegration>) -> Self {
        self.shell = shell;
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Token that aborts downloads, delta application and helpers
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> UpdateState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: UpdateState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Record the outcome of a phase
    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        self.set_state(if result.is_ok() {
            UpdateState::Idle
        } else {
            UpdateState::Failed
        });
        result
    }

    async fn acquire_lock(&self) -> Result<UpdateLock> {
        let path = UpdateLock::path_for(&self.config.root_dir)?;
        UpdateLock::acquire(&path, self.config.lock_timeout(), self.config.lock_retry()).await
    }

    fn installer(&self) -> Installer {
        Installer {
            config: self.config.clone(),
            archive: self.archive.clone(),
            builder: DeltaPackageBuilder::new(&self.config.temp_dir)
                .with_archive(self.archive.clone())
                .with_diff_engine(self.diff_engine.clone())
                .with_cancellation(self.cancel.clone()),
            shell: self.shell.clone(),
        }
    }

    /// Compare the installed releases with the feed.
    ///
    /// Returns `None` when the feed lists nothing.
    pub async fn check_for_update(
        &self,
        ignore_delta_updates: bool,
        progress: Arc<dyn ProgressTracker>,
    ) -> Result<Option<UpdateInfo>> {
        let _lock = self.acquire_lock().await?;
        self.set_state(UpdateState::Checking);
        let result = self.check_impl(ignore_delta_updates, &progress).await;
        self.finish(result)
    }

    /// Fetch `releases` into the package store
    pub async fn download_releases(
        &self,
        releases: &[ReleaseEntry],
        progress: Arc<dyn ProgressTracker>,
    ) -> Result<()> {
        let _lock = self.acquire_lock().await?;
        self.set_state(UpdateState::Downloading);
        let result = self.download_releases_impl(releases, progress).await;
        self.finish(result)
    }

    /// Install a downloaded plan and make it current; returns the app
    /// directory of the resulting version
    pub async fn apply_releases(
        &self,
        info: &UpdateInfo,
        progress: Arc<dyn ProgressTracker>,
    ) -> Result<PathBuf> {
        let _lock = self.acquire_lock().await?;
        self.set_state(UpdateState::Applying);
        let result = self.apply_impl(info, progress).await;
        self.finish(result)
    }

    /// Check, download and apply in one go.
    ///
    /// Returns the release now installed, or `None` if the feed is empty.
    /// A failed attempt is repeated once ignoring delta packages.
    pub async fn update_app(
        &self,
        progress: Arc<dyn ProgressTracker>,
    ) -> Result<Option<ReleaseEntry>> {
        let _lock = self.acquire_lock().await?;

        let first = self.update_cycle(false, &progress).await;
        let result = match first {
            Err(e) if e.is_retryable_with_full() => {
                warn!("Update failed ({}), retrying with full packages only", e);
                progress.set_position(0);
                self.update_cycle(true, &progress).await
            }
            other => other,
        };

        if let Err(e) = &result {
            warn!("Update failed: {}", e);
        }
        self.finish(result)
    }

    async fn update_cycle(
        &self,
        ignore_delta_updates: bool,
        progress: &Arc<dyn ProgressTracker>,
    ) -> Result<Option<ReleaseEntry>> {
        self.set_state(UpdateState::Checking);
        let check_progress = ScaledProgress::window(progress, 0, 33);
        let Some(info) = self.check_impl(ignore_delta_updates, &check_progress).await? else {
            progress.set_position(PERCENT);
            return Ok(None);
        };

        self.set_state(UpdateState::Downloading);
        let download_progress = ScaledProgress::window(progress, 33, 66);
        self.download_releases_impl(&info.releases_to_apply, download_progress)
            .await?;

        self.set_state(UpdateState::Applying);
        let apply_progress = ScaledProgress::window(progress, 66, 100);
        self.apply_impl(&info, apply_progress).await?;

        Ok(Some(info.future_release))
    }

    async fn check_impl(
        &self,
        ignore_delta_updates: bool,
        progress: &Arc<dyn ProgressTracker>,
    ) -> Result<Option<UpdateInfo>> {
        let local = self.load_local_releases().await?;

        info!("Fetching RELEASES via {}", self.transport.name());
        let text = self.transport.fetch_releases().await?;
        progress.set_position(33);

        let remote =
            ReleaseSet::parse_with_staging(&text, self.config.staging_client_id.as_ref())?;
        progress.set_position(66);

        let info = if remote.is_empty() {
            info!("Remote feed lists no releases");
            None
        } else {
            Some(self.determine_update_info(&local, &remote, ignore_delta_updates)?)
        };

        progress.set_position(PERCENT);
        Ok(info)
    }

    /// Local `RELEASES`; a missing or unreadable one resets the package
    /// store
    async fn load_local_releases(&self) -> Result<ReleaseSet> {
        let path = self.config.releases_file();
        let loaded = match tokio::fs::read_to_string(&path).await {
            Ok(text) => ReleaseSet::parse(&text),
            Err(e) => Err(Error::IoError(format!("{}: {}", path.display(), e))),
        };

        match loaded {
            Ok(set) => Ok(set),
            Err(e) => {
                warn!("Failed to load local releases, starting from scratch: {}", e);
                let packages = self.config.packages_dir();
                let dir = packages.clone();
                tokio::task::spawn_blocking(move || delete_dir_with_retry(&dir))
                    .await
                    .map_err(|e| Error::IoError(format!("Cleanup task failed: {e}")))??;
                tokio::fs::create_dir_all(&packages).await?;
                Ok(ReleaseSet::new())
            }
        }
    }

    fn determine_update_info(
        &self,
        local: &ReleaseSet,
        remote: &ReleaseSet,
        ignore_delta_updates: bool,
    ) -> Result<UpdateInfo> {
        let package_dir = self.config.packages_dir();

        if local.len() == remote.len() {
            info!("No updates, remote and local are the same");
            let latest = remote.latest_full().ok_or(Error::NoFullRelease)?;
            return UpdateInfo::create(
                local.latest_full(),
                &ReleaseSet::from_entries([latest.clone()]),
                package_dir,
            );
        }

        let filtered;
        let remote = if ignore_delta_updates {
            filtered = remote.without_deltas();
            &filtered
        } else {
            remote
        };

        if local.is_empty() {
            warn!("First run or local directory is corrupt, starting from scratch");
            return UpdateInfo::create(None, remote, package_dir);
        }

        if local.max_version() > remote.max_version() {
            warn!("Local version is newer than the feed, reinstalling the feed's latest");
            let latest = remote.latest_full().ok_or(Error::NoFullRelease)?;
            return Ok(UpdateInfo::with_releases(
                local.latest_full().cloned(),
                vec![latest.clone()],
                latest,
                package_dir,
            ));
        }

        UpdateInfo::create(local.latest_full(), remote, package_dir)
    }

    async fn apply_impl(
        &self,
        info: &UpdateInfo,
        progress: Arc<dyn ProgressTracker>,
    ) -> Result<PathBuf> {
        let installer = self.installer();
        let info = info.clone();
        tokio::task::spawn_blocking(move || installer.apply(&info, &progress))
            .await
            .map_err(|e| Error::IoError(format!("Apply task failed: {e}")))?
    }

    /// Version held by `current`, else the newest installed version
    pub fn current_version(&self) -> Option<PackageVersion> {
        let marker = self.config.current_dir().join(VERSION_FILE);
        if let Ok(text) = std::fs::read_to_string(&marker)
            && let Ok(version) = PackageVersion::parse(text.trim())
        {
            return Some(version);
        }

        app_dirs(&self.config.root_dir)
            .into_iter()
            .filter(|(dir, _)| !is_dead(dir))
            .filter_map(|(_, version)| version)
            .max()
    }
}
