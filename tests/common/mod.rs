// tests/common/mod.rs

//! Shared fixtures for integration tests: deterministic package contents,
//! a directory-backed feed, and an empty install root.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use updraft::archive::{Archive, ZipArchive};
use updraft::delta::DeltaPackageBuilder;
use updraft::release::build_releases_file;
use updraft::{ProgressTracker, ReleaseSet, SilentProgress, UpdateManager, UpdaterConfig};

pub const APP: &str = "MyApp";

/// Pseudo-random bytes from a fixed seed
pub fn payload(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

/// Minor component of a `1.N.0` fixture version
fn build_number(version: &str) -> usize {
    version
        .split('.')
        .nth(1)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Executable for a version: a shared body with a few bytes changed per
/// build and a version trailer
pub fn exe_bytes(version: &str) -> Vec<u8> {
    let mut bytes = payload(7, 96 * 1024);
    for build in 0..=build_number(version) {
        for k in 0..8 {
            let at = (build * 4099 + k * 1021) % bytes.len();
            bytes[at] = (build as u8).wrapping_add(k as u8);
        }
    }
    bytes.extend_from_slice(format!("build {}", version).as_bytes());
    bytes
}

/// Relative paths and contents of the fixture package for `version`.
///
/// Every version has the same directory layout. `Legacy.dll` exists only
/// in 1.0.0 and `Feature.dll` only from 1.1.0 on.
pub fn package_files(version: &str) -> Vec<(String, Vec<u8>)> {
    let build = build_number(version);
    let mut files = vec![
        (
            format!("{}.nuspec", APP),
            format!(
                "<?xml version=\"1.0\"?>\n<package><metadata><id>{}</id><version>{}</version></metadata></package>\n",
                APP, version
            )
            .into_bytes(),
        ),
        ("content/readme.txt".to_string(), format!("{} {}\n", APP, version).into_bytes()),
        ("lib/net45/MyApp.exe".to_string(), exe_bytes(version)),
        ("lib/net45/Shared.dll".to_string(), payload(11, 48 * 1024)),
    ];
    if build == 0 {
        files.push(("lib/net45/Legacy.dll".to_string(), payload(13, 8 * 1024)));
    } else {
        files.push(("lib/net45/Feature.dll".to_string(), payload(17 + build as u64, 4 * 1024)));
    }
    files
}

/// Write `files` as a tree under `dir`
pub fn write_tree(dir: &Path, files: &[(String, Vec<u8>)]) {
    for (relative, bytes) in files {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }
}

/// Pack the fixture package for `version` into `path`
pub fn write_package(path: &Path, version: &str) {
    let tree = TempDir::new().unwrap();
    write_tree(tree.path(), &package_files(version));
    ZipArchive::new()
        .create_from_directory(path, tree.path())
        .unwrap();
}

/// Unpack `package` and return its files keyed by relative path
pub fn read_package(package: &Path) -> Vec<(String, Vec<u8>)> {
    let dir = TempDir::new().unwrap();
    ZipArchive::new().extract_all(package, dir.path()).unwrap();
    let mut files: Vec<_> = walkdir::WalkDir::new(dir.path())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e
                .path()
                .strip_prefix(dir.path())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (relative, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

pub fn full_name(version: &str) -> String {
    format!("{}-{}-full.nupkg", APP, version)
}

pub fn delta_name(version: &str) -> String {
    format!("{}-{}-delta.nupkg", APP, version)
}

pub fn silent() -> Arc<dyn ProgressTracker> {
    Arc::new(SilentProgress::new())
}

/// A feed directory that packages get published into
pub struct TestFeed {
    pub dir: TempDir,
    scratch: TempDir,
}

impl TestFeed {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            scratch: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn package(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn publish_full(&self, version: &str) -> PathBuf {
        let path = self.package(&full_name(version));
        write_package(&path, version);
        path
    }

    /// Delta from `base`'s full package to `new`'s; both must be published
    pub fn publish_delta(&self, base: &str, new: &str) -> PathBuf {
        let output = self.package(&delta_name(new));
        DeltaPackageBuilder::new(self.scratch.path())
            .create_delta_package(
                &self.package(&full_name(base)),
                &self.package(&full_name(new)),
                &output,
            )
            .unwrap();
        output
    }

    /// Rewrite the feed's RELEASES from its packages
    pub fn releasify(&self) -> ReleaseSet {
        build_releases_file(self.dir.path()).unwrap()
    }
}

/// An install root plus its scratch directory
pub struct TestInstall {
    pub root: TempDir,
    pub temp: TempDir,
}

impl TestInstall {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn config(&self, feed: &TestFeed) -> UpdaterConfig {
        UpdaterConfig::new(self.root.path(), feed.path().to_string_lossy().to_string())
            .with_temp_dir(self.temp.path())
            .with_lock_timeout(Duration::from_millis(300), Duration::from_millis(20))
    }

    pub fn manager(&self, feed: &TestFeed) -> UpdateManager {
        UpdateManager::new(self.config(feed)).unwrap()
    }

    pub fn app_dir(&self, version: &str) -> PathBuf {
        self.root.path().join(format!("app-{}", version))
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.path().join("packages")
    }

    /// Names of the files in `packages/`, sorted
    pub fn package_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.packages_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Install `version` from a feed that holds only its full package
pub async fn install_version(install: &TestInstall, feed: &TestFeed, version: &str) {
    feed.publish_full(version);
    feed.releasify();
    let installed = install
        .manager(feed)
        .update_app(silent())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(installed.version().to_string(), version);
}
