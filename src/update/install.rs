// src/update/install.rs

//! Installing a planned release on disk
//!
//! Everything here is blocking filesystem work; the manager runs it on
//! `spawn_blocking`. A new version is assembled under `staging/`, renamed
//! to `app-<version>`, and only then swapped in as `current`, so an
//! interrupted install never touches the running version.

use super::info::UpdateInfo;
use crate::archive::Archive;
use crate::config::{UpdaterConfig, APP_DIR_PREFIX, VERSION_FILE};
use crate::delta::{is_lib_path, relative_files, DeltaPackageBuilder};
use crate::error::{Error, Result};
use crate::filesystem::{
    copy_dir_all, delete_dir_with_retry, delete_or_mark_dead, is_dead, replace_dir,
    retry_blocking, write_atomic, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY,
};
use crate::progress::{ProgressTracker, ScaledProgress};
use crate::release::{build_releases_file, ReleaseEntry, DELTA_SUFFIX};
use crate::shell::ShellIntegration;
use crate::version::PackageVersion;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Suffix given to packages rebuilt from a delta chain
const FULL_SUFFIX: &str = "-full.nupkg";

/// Name prefix of the tree staged for the `current` swap
const CURRENT_STAGING_PREFIX: &str = "current-";

#[derive(Clone)]
pub(crate) struct Installer {
    pub(crate) config: UpdaterConfig,
    pub(crate) archive: Arc<dyn Archive>,
    pub(crate) builder: DeltaPackageBuilder,
    pub(crate) shell: Arc<dyn ShellIntegration>,
}

impl Installer {
    /// Install what `info` plans and make it current; returns the app
    /// directory of the installed version
    pub(crate) fn apply(
        &self,
        info: &UpdateInfo,
        progress: &Arc<dyn ProgressTracker>,
    ) -> Result<PathBuf> {
        self.clean_dead_versions_and_staging();
        progress.set_position(5);

        let chain_progress = ScaledProgress::window(progress, 5, 40);
        let Some(release) = self.create_full_package(info, &chain_progress)? else {
            info!("No release to install");
            progress.set_position(100);
            return Ok(match &info.currently_installed {
                Some(current) => self.config.app_dir_for(current.version()),
                None => self.config.current_dir(),
            });
        };
        progress.set_position(40);

        let app_dir = self.install_package(info, &release)?;
        progress.set_position(60);

        self.promote_current(release.version(), &app_dir)?;
        progress.set_position(70);

        self.run_shell_fixups(release.version(), &app_dir);
        progress.set_position(80);

        let original = info.currently_installed.as_ref().map(|e| e.version());
        self.clean_old_versions(original, release.version());
        progress.set_position(90);

        self.clean_packages(release.version())?;
        progress.set_position(100);

        info!("Installed version {} at {}", release.version(), app_dir.display());
        Ok(app_dir)
    }

    /// The full package to install, rebuilding it from deltas when the
    /// plan is a chain
    fn create_full_package(
        &self,
        info: &UpdateInfo,
        progress: &Arc<dyn ProgressTracker>,
    ) -> Result<Option<ReleaseEntry>> {
        let releases = &info.releases_to_apply;
        if releases.is_empty() {
            return Ok(None);
        }

        if releases.iter().all(|e| !e.is_delta()) {
            return Ok(releases.iter().max_by(|a, b| a.version().cmp(b.version())).cloned());
        }

        if !releases.iter().all(ReleaseEntry::is_delta) {
            return Err(Error::DeltaChain(
                "cannot apply a mix of delta and full packages".to_string(),
            ));
        }

        let current = info.currently_installed.as_ref().ok_or_else(|| {
            Error::DeltaChain("no installed release to apply deltas to".to_string())
        })?;
        let base = info.package_path(current);
        if !base.exists() {
            return Err(Error::DeltaChain(format!(
                "base package {} is missing",
                base.display()
            )));
        }

        let mut chain: Vec<&ReleaseEntry> = releases.iter().collect();
        chain.sort_by(|a, b| a.version().cmp(b.version()));
        let deltas: Vec<PathBuf> = chain.iter().map(|e| info.package_path(e)).collect();

        let last = chain[chain.len() - 1];
        let output = info.package_path(last).with_file_name(full_filename_for(last.filename()));
        if output.exists() {
            debug!("Removing stale {}", output.display());
            fs::remove_file(&output)?;
        }

        info!(
            "Rebuilding {} from {} with {} delta(s)",
            output.display(),
            current.filename(),
            deltas.len()
        );
        self.builder.apply_delta_chain(&base, &deltas, &output, progress)?;
        ReleaseEntry::generate_from_file(&output).map(Some)
    }

    /// Unpack `release` into `app-<version>` by way of `staging/`
    fn install_package(&self, info: &UpdateInfo, release: &ReleaseEntry) -> Result<PathBuf> {
        let package = info.package_path(release);
        let target = self.config.app_dir_for(release.version());
        let staged = self
            .config
            .staging_dir()
            .join(format!("{}{}", APP_DIR_PREFIX, release.version()));

        if staged.exists() {
            delete_dir_with_retry(&staged)?;
        }
        if target.exists() {
            warn!(
                "Found partially applied release folder, removing {}",
                target.display()
            );
            delete_dir_with_retry(&target)?;
        }
        fs::create_dir_all(&staged)?;

        fs::create_dir_all(&self.config.temp_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("install-")
            .tempdir_in(&self.config.temp_dir)?;
        self.archive.extract_all(&package, scratch.path())?;

        let files = relative_files(scratch.path())?;

        // Sorted, sequential: a later framework folder overwrites an
        // earlier one's copy of the same file
        let lib_files: Vec<&String> = files.iter().filter(|f| is_lib_path(f)).collect();
        debug!("Writing {} lib files to {}", lib_files.len(), staged.display());
        for relative in &lib_files {
            if let Some(effective) = effective_lib_path(relative) {
                copy_file_to(&scratch.path().join(relative), &staged.join(effective))?;
            }
        }

        files
            .par_iter()
            .filter_map(|f| effective_content_path(f).map(|e| (f, e)))
            .map(|(relative, effective)| {
                copy_file_to(&scratch.path().join(relative), &staged.join(effective))
            })
            .collect::<Result<Vec<_>>>()?;

        retry_blocking(DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, || {
            fs::rename(&staged, &target).map_err(|e| Error::FilesystemContention {
                path: target.clone(),
                reason: e.to_string(),
            })
        })?;
        Ok(target)
    }

    /// Swap a copy of `app_dir` in as `current`
    fn promote_current(&self, version: &PackageVersion, app_dir: &Path) -> Result<()> {
        let staged = self.config.staging_dir().join(format!(
            "{}{}",
            CURRENT_STAGING_PREFIX,
            uuid::Uuid::new_v4().simple()
        ));
        copy_dir_all(app_dir, &staged)?;
        write_atomic(&staged.join(VERSION_FILE), version.to_string().as_bytes())?;

        if let Err(e) = replace_dir(&staged, &self.config.current_dir()) {
            let _ = delete_dir_with_retry(&staged);
            return Err(e);
        }
        info!("current is now {}", version);
        Ok(())
    }

    fn run_shell_fixups(&self, version: &PackageVersion, app_dir: &Path) {
        let old_dirs: Vec<PathBuf> = app_dirs(&self.config.root_dir)
            .into_iter()
            .map(|(dir, _)| dir)
            .filter(|dir| dir != app_dir)
            .collect();

        if let Err(e) = self.shell.rewrite_shortcuts(&old_dirs, app_dir) {
            warn!("Failed to rewrite shortcuts, continuing: {}", e);
        }
        if let Err(e) = self.shell.register_uninstaller(version) {
            warn!("Failed to register uninstaller, continuing: {}", e);
        }
    }

    /// Remove leftovers of interrupted or failed runs
    pub(crate) fn clean_dead_versions_and_staging(&self) {
        let staging = self.config.staging_dir();
        if let Ok(entries) = fs::read_dir(&staging) {
            for entry in entries.flatten() {
                let path = entry.path();
                info!("Removing stale staging entry {}", path.display());
                let result = if path.is_dir() {
                    delete_dir_with_retry(&path)
                } else {
                    fs::remove_file(&path).map_err(Error::from)
                };
                if let Err(e) = result {
                    warn!("Couldn't remove {}: {}", path.display(), e);
                }
            }
        }

        for (dir, _) in app_dirs(&self.config.root_dir) {
            if is_dead(&dir) {
                info!("Removing dead version {}", dir.display());
                delete_or_mark_dead(&dir);
            }
        }

        let Ok(entries) = fs::read_dir(&self.config.root_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(".current.old-") && entry.path().is_dir() {
                info!("Removing previous current tree {}", name);
                delete_or_mark_dead(&entry.path());
            }
        }
    }

    /// Best-effort removal of every version but `original` and `new`
    fn clean_old_versions(&self, original: Option<&PackageVersion>, new: &PackageVersion) {
        for (dir, version) in app_dirs(&self.config.root_dir) {
            let keep = version
                .as_ref()
                .is_some_and(|v| v == new || Some(v) == original);
            if keep && !is_dead(&dir) {
                continue;
            }
            info!("Removing old version {}", dir.display());
            if !delete_or_mark_dead(&dir) {
                warn!("{} is still in use, marked dead", dir.display());
            }
        }
    }

    /// Keep only the full package of `current` and rebuild `RELEASES`
    fn clean_packages(&self, current: &PackageVersion) -> Result<()> {
        let packages = self.config.packages_dir();
        for entry in fs::read_dir(&packages)?.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.to_ascii_lowercase().ends_with(".nupkg") {
                continue;
            }
            let keep = !name.to_ascii_lowercase().ends_with(DELTA_SUFFIX)
                && PackageVersion::from_filename(&name).is_ok_and(|v| &v == current);
            if !keep {
                debug!("Removing package {}", name);
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Couldn't remove {}: {}", path.display(), e);
                }
            }
        }

        build_releases_file(&packages)?;
        Ok(())
    }
}

/// Installed version directories under `root`, with their versions
pub(crate) fn app_dirs(root: &Path) -> Vec<(PathBuf, Option<PackageVersion>)> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut dirs: Vec<_> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let prefix = name.get(..APP_DIR_PREFIX.len())?;
            if !prefix.eq_ignore_ascii_case(APP_DIR_PREFIX) {
                return None;
            }
            let version = PackageVersion::parse(&name[APP_DIR_PREFIX.len()..]).ok();
            Some((e.path(), version))
        })
        .collect();
    dirs.sort_by(|a, b| a.1.cmp(&b.1));
    dirs
}

/// `MyApp-1.2.0-delta.nupkg` to `MyApp-1.2.0-full.nupkg`
fn full_filename_for(delta_filename: &str) -> String {
    let lower = delta_filename.to_ascii_lowercase();
    if lower.ends_with(DELTA_SUFFIX) {
        format!(
            "{}{}",
            &delta_filename[..delta_filename.len() - DELTA_SUFFIX.len()],
            FULL_SUFFIX
        )
    } else {
        delta_filename.to_string()
    }
}

/// `lib/<framework>/a/b.dll` to `a/b.dll`
fn effective_lib_path(relative: &str) -> Option<String> {
    let parts: Vec<&str> = relative.split('/').collect();
    match parts.len() {
        0 | 1 => None,
        2 => Some(parts[1].to_string()),
        _ => Some(parts[2..].join("/")),
    }
}

/// `content/a/b.txt` to `a/b.txt`
fn effective_content_path(relative: &str) -> Option<String> {
    let (first, rest) = relative.split_once('/')?;
    (first.eq_ignore_ascii_case("content") && !rest.is_empty()).then(|| rest.to_string())
}

fn copy_file_to(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() {
        fs::remove_file(dst)?;
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst).map_err(|e| {
        Error::IoError(format!("Failed to write {}: {}", dst.display(), e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_full_filename_for() {
        assert_eq!(full_filename_for("MyApp-1.2.0-delta.nupkg"), "MyApp-1.2.0-full.nupkg");
        assert_eq!(full_filename_for("MyApp-1.2.0-DELTA.nupkg"), "MyApp-1.2.0-full.nupkg");
    }

    #[test]
    fn test_effective_paths() {
        assert_eq!(effective_lib_path("lib/net45/app.exe").as_deref(), Some("app.exe"));
        assert_eq!(effective_lib_path("lib/net45/x/y.dll").as_deref(), Some("x/y.dll"));
        assert_eq!(effective_lib_path("lib/app.exe").as_deref(), Some("app.exe"));
        assert_eq!(effective_content_path("content/readme.txt").as_deref(), Some("readme.txt"));
        assert_eq!(effective_content_path("MyApp.nuspec"), None);
    }

    #[test]
    fn test_app_dirs_sorted_by_version() {
        let temp = TempDir::new().unwrap();
        for name in ["app-1.10.0", "app-1.2.0", "packages", "app-garbage"] {
            fs::create_dir_all(temp.path().join(name)).unwrap();
        }

        let dirs = app_dirs(temp.path());
        let versions: Vec<String> = dirs
            .iter()
            .filter_map(|(_, v)| v.as_ref().map(|v| v.to_string()))
            .collect();
        assert_eq!(dirs.len(), 3);
        assert_eq!(versions, vec!["1.2.0", "1.10.0"]);
    }
}
