// tests/update_flow.rs

//! End-to-end updates against a directory feed

mod common;

use common::{
    delta_name, exe_bytes, full_name, install_version, silent, TestFeed, TestInstall,
};
use std::fs;
use tempfile::TempDir;
use updraft::archive::{Archive, ZipArchive};
use updraft::filesystem::DEAD_MARKER;
use updraft::hash::{hash_file, HashAlgorithm};
use updraft::update::UpdateLock;
use updraft::{Error, PackageVersion, ReleaseEntry, UpdateState};

fn sha1_of(path: &std::path::Path) -> String {
    hash_file(HashAlgorithm::Sha1, path).unwrap().0.as_str().to_string()
}

fn version(s: &str) -> PackageVersion {
    PackageVersion::parse(s).unwrap()
}

#[tokio::test]
async fn test_bootstrap_installs_latest_full() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.publish_full("1.1.0");
    feed.publish_delta("1.0.0", "1.1.0");
    feed.releasify();

    let install = TestInstall::new();
    let manager = install.manager(&feed);
    assert_eq!(manager.current_version(), None);

    let installed = manager.update_app(silent()).await.unwrap().unwrap();
    assert_eq!(installed.version(), &version("1.1.0"));
    assert!(!installed.is_delta());

    let app = install.app_dir("1.1.0");
    assert_eq!(fs::read(app.join("MyApp.exe")).unwrap(), exe_bytes("1.1.0"));
    assert!(app.join("Shared.dll").exists());
    assert!(app.join("Feature.dll").exists());
    assert_eq!(fs::read_to_string(app.join("readme.txt")).unwrap(), "MyApp 1.1.0\n");
    assert!(!install.app_dir("1.0.0").exists());

    let current = install.root().join("current");
    assert_eq!(fs::read_to_string(current.join(".version")).unwrap().trim(), "1.1.0");
    assert_eq!(fs::read(current.join("MyApp.exe")).unwrap(), exe_bytes("1.1.0"));

    assert_eq!(manager.current_version(), Some(version("1.1.0")));
    assert_eq!(manager.state(), UpdateState::Idle);
    assert_eq!(install.package_names(), vec![full_name("1.1.0"), "RELEASES".to_string()]);
}

#[tokio::test]
async fn test_up_to_date_check_has_no_updates() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    let info = install
        .manager(&feed)
        .check_for_update(false, silent())
        .await
        .unwrap()
        .unwrap();
    assert!(!info.has_updates());
    assert_eq!(info.future_release.version(), &version("1.0.0"));
    assert_eq!(
        info.currently_installed.as_ref().map(|e| e.version().clone()),
        Some(version("1.0.0"))
    );
}

#[tokio::test]
async fn test_delta_update_step_by_step() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    let published = feed.publish_full("1.1.0");
    feed.publish_delta("1.0.0", "1.1.0");
    feed.releasify();

    let manager = install.manager(&feed);
    let info = manager.check_for_update(false, silent()).await.unwrap().unwrap();
    assert!(info.is_delta_chain());
    assert_eq!(info.releases_to_apply.len(), 1);
    assert_eq!(info.releases_to_apply[0].filename(), delta_name("1.1.0"));
    assert!(info.download_size() < fs::metadata(&published).unwrap().len());

    manager
        .download_releases(&info.releases_to_apply, silent())
        .await
        .unwrap();
    assert!(install.packages_dir().join(delta_name("1.1.0")).exists());

    let app = manager.apply_releases(&info, silent()).await.unwrap();
    assert_eq!(app, install.app_dir("1.1.0"));
    assert_eq!(fs::read(app.join("MyApp.exe")).unwrap(), exe_bytes("1.1.0"));
    assert!(app.join("Feature.dll").exists());
    assert!(!app.join("Legacy.dll").exists());
    assert_eq!(manager.current_version(), Some(version("1.1.0")));

    // The version being replaced stays on disk
    assert!(install.app_dir("1.0.0").exists());

    // Package store holds only the rebuilt full package, identical to the feed's
    assert_eq!(install.package_names(), vec![full_name("1.1.0"), "RELEASES".to_string()]);
    let rebuilt = install.packages_dir().join(full_name("1.1.0"));
    assert_eq!(sha1_of(&rebuilt), sha1_of(&published));
}

#[tokio::test]
async fn test_two_hop_delta_update() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    feed.publish_full("1.1.0");
    let published = feed.publish_full("1.2.0");
    feed.publish_delta("1.0.0", "1.1.0");
    feed.publish_delta("1.1.0", "1.2.0");
    feed.releasify();

    let manager = install.manager(&feed);
    let info = manager.check_for_update(false, silent()).await.unwrap().unwrap();
    let names: Vec<&str> = info.releases_to_apply.iter().map(ReleaseEntry::filename).collect();
    assert_eq!(names, vec![delta_name("1.1.0"), delta_name("1.2.0")]);

    let installed = manager.update_app(silent()).await.unwrap().unwrap();
    assert_eq!(installed.version(), &version("1.2.0"));
    assert_eq!(
        fs::read(install.app_dir("1.2.0").join("MyApp.exe")).unwrap(),
        exe_bytes("1.2.0")
    );
    let rebuilt = install.packages_dir().join(full_name("1.2.0"));
    assert_eq!(sha1_of(&rebuilt), sha1_of(&published));
}

#[tokio::test]
async fn test_old_versions_removed_on_next_update() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    feed.publish_full("1.1.0");
    feed.releasify();
    install.manager(&feed).update_app(silent()).await.unwrap();
    assert!(install.app_dir("1.0.0").exists());

    feed.publish_full("1.2.0");
    feed.releasify();
    install.manager(&feed).update_app(silent()).await.unwrap();

    assert!(!install.app_dir("1.0.0").exists());
    assert!(install.app_dir("1.1.0").exists());
    assert!(install.app_dir("1.2.0").exists());
    assert_eq!(install.package_names(), vec![full_name("1.2.0"), "RELEASES".to_string()]);
}

#[tokio::test]
async fn test_corrupt_delta_falls_back_to_full() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    feed.publish_full("1.1.0");
    let delta = feed.publish_delta("1.0.0", "1.1.0");

    // Ship a delta whose checksum describes different content; the
    // package itself is listed with its true hash so it downloads fine
    let tree = TempDir::new().unwrap();
    let archive = ZipArchive::new();
    archive.extract_all(&delta, tree.path()).unwrap();
    let wrong = ReleaseEntry::generate_from_reader(
        &mut exe_bytes("1.7.0").as_slice(),
        "MyApp.exe.shasum",
    )
    .unwrap();
    fs::write(tree.path().join("lib/net45/MyApp.exe.shasum"), wrong.entry_as_string()).unwrap();
    fs::remove_file(&delta).unwrap();
    archive.create_from_directory(&delta, tree.path()).unwrap();
    feed.releasify();

    let manager = install.manager(&feed);
    let installed = manager.update_app(silent()).await.unwrap().unwrap();

    assert_eq!(installed.version(), &version("1.1.0"));
    assert_eq!(
        fs::read(install.app_dir("1.1.0").join("MyApp.exe")).unwrap(),
        exe_bytes("1.1.0")
    );
    assert_eq!(manager.current_version(), Some(version("1.1.0")));
    assert_eq!(install.package_names(), vec![full_name("1.1.0"), "RELEASES".to_string()]);
}

#[tokio::test]
async fn test_download_checksum_mismatch_leaves_install_alone() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    let package = feed.publish_full("1.1.0");
    let good = ReleaseEntry::generate_from_file(&feed.package(&full_name("1.0.0"))).unwrap();
    let size = fs::metadata(&package).unwrap().len();
    fs::write(
        feed.package("RELEASES"),
        format!(
            "{}\n{} {} {}\n",
            good.entry_as_string(),
            "0000000000000000000000000000000000000000",
            full_name("1.1.0"),
            size
        ),
    )
    .unwrap();

    let manager = install.manager(&feed);
    let err = manager.update_app(silent()).await.unwrap_err();
    assert!(err.is_checksum(), "got {err:?}");

    assert_eq!(manager.state(), UpdateState::Failed);
    assert!(!install.packages_dir().join(full_name("1.1.0")).exists());
    assert!(!install.app_dir("1.1.0").exists());
    assert_eq!(manager.current_version(), Some(version("1.0.0")));
}

#[tokio::test]
async fn test_unreadable_package_keeps_current() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    // Hashes match, but the bytes are not a zip
    fs::write(feed.package(&full_name("1.1.0")), b"definitely not a zip archive").unwrap();
    feed.releasify();

    let manager = install.manager(&feed);
    let err = manager.update_app(silent()).await.unwrap_err();
    assert!(matches!(err, Error::ArchiveError(_)), "got {err:?}");

    assert!(!install.app_dir("1.1.0").exists());
    let current = install.root().join("current");
    assert_eq!(fs::read_to_string(current.join(".version")).unwrap().trim(), "1.0.0");
    assert_eq!(fs::read(current.join("MyApp.exe")).unwrap(), exe_bytes("1.0.0"));
}

#[tokio::test]
async fn test_leftovers_cleaned_on_next_run() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    // An interrupted install and a version that couldn't be deleted earlier
    let staged = install.root().join("staging").join("app-1.1.0");
    fs::create_dir_all(&staged).unwrap();
    fs::write(staged.join("MyApp.exe"), b"half written").unwrap();
    let dead = install.app_dir("0.9.0");
    fs::create_dir_all(&dead).unwrap();
    fs::write(dead.join(DEAD_MARKER), b"").unwrap();
    let old_current = install.root().join(".current.old-1234");
    fs::create_dir_all(&old_current).unwrap();

    feed.publish_full("1.1.0");
    feed.releasify();
    install.manager(&feed).update_app(silent()).await.unwrap();

    assert!(!dead.exists());
    assert!(!old_current.exists());
    let leftovers: Vec<_> = fs::read_dir(install.root().join("staging"))
        .map(|entries| entries.flatten().collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty());
    assert_eq!(
        fs::read(install.app_dir("1.1.0").join("MyApp.exe")).unwrap(),
        exe_bytes("1.1.0")
    );
}

#[tokio::test]
async fn test_corrupt_local_manifest_resets_store() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    fs::write(install.packages_dir().join("RELEASES"), "not a manifest\n").unwrap();
    fs::write(install.packages_dir().join("junk.nupkg"), b"junk").unwrap();

    feed.publish_full("1.1.0");
    feed.publish_delta("1.0.0", "1.1.0");
    feed.releasify();

    let info = install
        .manager(&feed)
        .check_for_update(false, silent())
        .await
        .unwrap()
        .unwrap();

    // Nothing local to patch, so the plan starts over from the latest full
    assert!(info.is_bootstrapping());
    assert_eq!(info.releases_to_apply.len(), 1);
    assert_eq!(info.releases_to_apply[0].filename(), full_name("1.1.0"));
    assert!(!install.packages_dir().join("junk.nupkg").exists());
}

#[tokio::test]
async fn test_ignore_deltas_plans_full_package() {
    let feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &feed, "1.0.0").await;

    feed.publish_full("1.1.0");
    feed.publish_delta("1.0.0", "1.1.0");
    feed.releasify();

    let info = install
        .manager(&feed)
        .check_for_update(true, silent())
        .await
        .unwrap()
        .unwrap();
    assert!(!info.is_delta_chain());
    assert_eq!(info.releases_to_apply[0].filename(), full_name("1.1.0"));
}

#[tokio::test]
async fn test_feed_older_than_install_plans_reinstall() {
    let newer_feed = TestFeed::new();
    let install = TestInstall::new();
    install_version(&install, &newer_feed, "1.1.0").await;

    let older_feed = TestFeed::new();
    older_feed.publish_full("0.9.0");
    older_feed.publish_full("1.0.0");
    older_feed.releasify();

    let info = install
        .manager(&older_feed)
        .check_for_update(false, silent())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.future_release.version(), &version("1.0.0"));
    let names: Vec<&str> = info.releases_to_apply.iter().map(ReleaseEntry::filename).collect();
    assert_eq!(names, vec![full_name("1.0.0")]);
}

#[tokio::test]
async fn test_empty_feed_reports_nothing() {
    let feed = TestFeed::new();
    fs::write(feed.package("RELEASES"), "").unwrap();

    let install = TestInstall::new();
    let manager = install.manager(&feed);
    assert!(manager.update_app(silent()).await.unwrap().is_none());
    assert_eq!(manager.current_version(), None);
}

#[tokio::test]
async fn test_held_lock_blocks_second_updater() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.releasify();

    let install = TestInstall::new();
    let lock_path = UpdateLock::path_for(install.root()).unwrap();
    let held = UpdateLock::try_acquire(&lock_path).unwrap().unwrap();

    let manager = install.manager(&feed);
    let err = manager.check_for_update(false, silent()).await.unwrap_err();
    assert!(err.is_lock_contention(), "got {err:?}");
    assert_eq!(manager.current_version(), None);

    drop(held);
    assert!(manager.update_app(silent()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_lock_shared_across_temp_dirs() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.releasify();

    let install = TestInstall::new();
    let first = install.manager(&feed);
    let _held = UpdateLock::try_acquire(&UpdateLock::path_for(install.root()).unwrap())
        .unwrap()
        .unwrap();

    // Same root, spelled differently, with its own temp dir
    let other_temp = TempDir::new().unwrap();
    let mut config = install.config(&feed).with_temp_dir(other_temp.path());
    config.root_dir = install.root().join(".");
    let second = updraft::UpdateManager::new(config).unwrap();

    for manager in [&first, &second] {
        let err = manager.check_for_update(false, silent()).await.unwrap_err();
        assert!(err.is_lock_contention(), "got {err:?}");
    }
}
