// tests/delta_package.rs

//! Delta package creation and reconstruction against real zip packages

mod common;

use common::{
    delta_name, exe_bytes, full_name, package_files, read_package, silent, write_tree, TestFeed,
};
use std::fs;
use tempfile::TempDir;
use updraft::archive::{Archive, ZipArchive};
use updraft::bsdiff::{PatchHeader, HEADER_SIZE};
use updraft::delta::DeltaPackageBuilder;
use updraft::hash::{hash_file, HashAlgorithm};
use updraft::{Error, ReleaseEntry};

fn sha1_of(path: &std::path::Path) -> String {
    hash_file(HashAlgorithm::Sha1, path).unwrap().0.as_str().to_string()
}

#[test]
fn test_delta_layout() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.publish_full("1.1.0");
    feed.publish_delta("1.0.0", "1.1.0");

    let files: Vec<String> = read_package(&feed.package(&delta_name("1.1.0")))
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    assert!(files.contains(&"lib/net45/MyApp.exe.bsdiff".to_string()));
    assert!(files.contains(&"lib/net45/MyApp.exe.shasum".to_string()));
    assert!(files.contains(&"lib/net45/Shared.dll.bsdiff".to_string()));
    // New file shipped as-is, removed file absent
    assert!(files.contains(&"lib/net45/Feature.dll".to_string()));
    assert!(!files.iter().any(|f| f.contains("Legacy.dll")));
    assert!(!files.contains(&"lib/net45/MyApp.exe".to_string()));
    // Non-lib files ride along untouched
    assert!(files.contains(&"content/readme.txt".to_string()));
    assert!(files.contains(&"MyApp.nuspec".to_string()));
}

#[test]
fn test_unchanged_and_patched_side_files() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.publish_full("1.1.0");
    feed.publish_delta("1.0.0", "1.1.0");

    let files = read_package(&feed.package(&delta_name("1.1.0")));
    let get = |name: &str| {
        files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.clone())
            .unwrap()
    };

    assert!(get("lib/net45/Shared.dll.bsdiff").is_empty());
    assert!(get("lib/net45/Shared.dll.shasum").is_empty());

    let patch = get("lib/net45/MyApp.exe.bsdiff");
    assert_eq!(&patch[..8], b"BSDIFF40");

    let shasum = String::from_utf8(get("lib/net45/MyApp.exe.shasum")).unwrap();
    let expected = ReleaseEntry::generate_from_reader(
        &mut exe_bytes("1.1.0").as_slice(),
        "MyApp.exe.shasum",
    )
    .unwrap();
    assert_eq!(shasum, expected.entry_as_string());
}

#[test]
fn test_metrics() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.publish_full("1.1.0");
    let scratch = TempDir::new().unwrap();
    let output = feed.package(&delta_name("1.1.0"));

    let metrics = DeltaPackageBuilder::new(scratch.path())
        .create_delta_package(
            &feed.package(&full_name("1.0.0")),
            &feed.package(&full_name("1.1.0")),
            &output,
        )
        .unwrap();

    assert_eq!(metrics.files_patched, 1);
    assert_eq!(metrics.files_unchanged, 1);
    assert_eq!(metrics.files_added, 1);
    assert_eq!(metrics.delta_size, fs::metadata(&output).unwrap().len());
    assert!(metrics.is_worthwhile());
}

#[test]
fn test_apply_reproduces_new_package() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    let published = feed.publish_full("1.1.0");
    let delta = feed.publish_delta("1.0.0", "1.1.0");

    let out_dir = TempDir::new().unwrap();
    let rebuilt = out_dir.path().join(full_name("1.1.0"));
    DeltaPackageBuilder::new(out_dir.path())
        .apply_delta_package(&feed.package(&full_name("1.0.0")), &delta, &rebuilt, &silent())
        .unwrap();

    let mut expected = package_files("1.1.0");
    expected.sort();
    assert_eq!(read_package(&rebuilt), expected);
    assert_eq!(sha1_of(&rebuilt), sha1_of(&published));
}

#[test]
fn test_two_hop_chain_matches_published_full() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.publish_full("1.1.0");
    let published = feed.publish_full("1.2.0");
    let first = feed.publish_delta("1.0.0", "1.1.0");
    let second = feed.publish_delta("1.1.0", "1.2.0");

    let out_dir = TempDir::new().unwrap();
    let rebuilt = out_dir.path().join(full_name("1.2.0"));
    DeltaPackageBuilder::new(out_dir.path())
        .apply_delta_chain(
            &feed.package(&full_name("1.0.0")),
            &[first, second],
            &rebuilt,
            &silent(),
        )
        .unwrap();

    assert_eq!(sha1_of(&rebuilt), sha1_of(&published));
}

#[test]
fn test_empty_chain_is_rejected() {
    let feed = TestFeed::new();
    let base = feed.publish_full("1.0.0");
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("out.nupkg");

    let err = DeltaPackageBuilder::new(out_dir.path())
        .apply_delta_chain(&base, &[], &output, &silent())
        .unwrap_err();
    assert!(matches!(err, Error::DeltaChain(_)));
    assert!(!output.exists());
}

#[test]
fn test_tampered_shasum_fails_without_output() {
    let feed = TestFeed::new();
    feed.publish_full("1.0.0");
    feed.publish_full("1.1.0");
    let delta = feed.publish_delta("1.0.0", "1.1.0");

    // Repack the delta with a checksum for different content
    let tree = TempDir::new().unwrap();
    let archive = ZipArchive::new();
    archive.extract_all(&delta, tree.path()).unwrap();
    let wrong = ReleaseEntry::generate_from_reader(
        &mut exe_bytes("1.5.0").as_slice(),
        "MyApp.exe.shasum",
    )
    .unwrap();
    fs::write(
        tree.path().join("lib/net45/MyApp.exe.shasum"),
        wrong.entry_as_string(),
    )
    .unwrap();
    let tampered = feed.package("tampered-1.1.0-delta.nupkg");
    archive.create_from_directory(&tampered, tree.path()).unwrap();

    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join(full_name("1.1.0"));
    let err = DeltaPackageBuilder::new(out_dir.path())
        .apply_delta_package(&feed.package(&full_name("1.0.0")), &tampered, &output, &silent())
        .unwrap_err();

    match err {
        Error::ChecksumMismatch { path, .. } => assert_eq!(path, "lib/net45/MyApp.exe"),
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_corrupt_bsdiff_fails_without_output() {
    let feed = TestFeed::new();
    let base = feed.publish_full("1.0.0");
    feed.publish_full("1.1.0");
    let delta = feed.publish_delta("1.0.0", "1.1.0");

    let archive = ZipArchive::new();
    let tree = TempDir::new().unwrap();
    archive.extract_all(&delta, tree.path()).unwrap();
    let patch_path = tree.path().join("lib/net45/MyApp.exe.bsdiff");
    let patch = fs::read(&patch_path).unwrap();
    let header = PatchHeader::parse(&patch).unwrap();

    // Byte 5 of a bzip2 stream sits in the block magic
    let control_start = HEADER_SIZE;
    let diff_start = HEADER_SIZE + header.control_len as usize;
    for (segment, offset) in [("control", control_start + 5), ("diff", diff_start + 5)] {
        let mut damaged = patch.clone();
        damaged[offset] ^= 0x55;
        fs::write(&patch_path, &damaged).unwrap();
        let broken = feed.package(&format!("broken-{segment}-1.1.0-delta.nupkg"));
        archive.create_from_directory(&broken, tree.path()).unwrap();

        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join(full_name("1.1.0"));
        let err = DeltaPackageBuilder::new(out_dir.path())
            .apply_delta_package(&base, &broken, &output, &silent())
            .unwrap_err();

        assert!(
            matches!(err, Error::CorruptPatch(_) | Error::ChecksumMismatch { .. }),
            "{segment}: got {err:?}"
        );
        assert!(!output.exists(), "{segment}: output left behind");
    }
}

#[cfg(unix)]
#[test]
fn test_diff_helper_output_is_verified() {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use updraft::delta::CommandDiffEngine;

    let feed = TestFeed::new();
    let base = feed.publish_full("1.0.0");
    let new_exe = exe_bytes("1.1.0");
    let shasum =
        ReleaseEntry::generate_from_reader(&mut new_exe.as_slice(), "MyApp.exe.shasum").unwrap();

    let tree = TempDir::new().unwrap();
    write_tree(
        tree.path(),
        &[
            ("lib/net45/MyApp.exe.diff".to_string(), new_exe.clone()),
            ("lib/net45/MyApp.exe.shasum".to_string(), shasum.entry_as_string().into_bytes()),
        ],
    );
    let delta = feed.package(&delta_name("1.1.0"));
    ZipArchive::new().create_from_directory(&delta, tree.path()).unwrap();

    let helpers = TempDir::new().unwrap();
    let helper = |name: &str, body: &str| {
        let path = helpers.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    };
    // The "diff" is the new file itself
    let copying = helper("copy-diff.sh", "cat \"$2\" > \"$3\"");
    let silent_helper = helper("silent-diff.sh", "exit 0");

    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join(full_name("1.1.0"));
    DeltaPackageBuilder::new(out_dir.path())
        .with_diff_engine(Arc::new(CommandDiffEngine::new(&copying)))
        .apply_delta_package(&base, &delta, &output, &silent())
        .unwrap();
    let files = read_package(&output);
    let exe = files.iter().find(|(name, _)| name == "lib/net45/MyApp.exe").unwrap();
    assert_eq!(exe.1, new_exe);

    let output = out_dir.path().join("silent-1.1.0-full.nupkg");
    let err = DeltaPackageBuilder::new(out_dir.path())
        .with_diff_engine(Arc::new(CommandDiffEngine::new(&silent_helper)))
        .apply_delta_package(&base, &delta, &output, &silent())
        .unwrap_err();
    match err {
        Error::ChecksumMismatch { path, .. } => assert_eq!(path, "lib/net45/MyApp.exe"),
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_diff_entry_without_helper_fails() {
    let feed = TestFeed::new();
    let base = feed.publish_full("1.0.0");

    let tree = TempDir::new().unwrap();
    write_tree(
        tree.path(),
        &[
            ("lib/net45/MyApp.exe.diff".to_string(), b"external".to_vec()),
            ("lib/net45/MyApp.exe.shasum".to_string(), Vec::new()),
        ],
    );
    let delta = feed.package(&delta_name("1.1.0"));
    ZipArchive::new().create_from_directory(&delta, tree.path()).unwrap();

    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join(full_name("1.1.0"));
    let err = DeltaPackageBuilder::new(out_dir.path())
        .apply_delta_package(&base, &delta, &output, &silent())
        .unwrap_err();
    assert!(matches!(err, Error::DeltaChain(_)), "got {err:?}");
    assert!(!output.exists());
}

#[test]
fn test_create_refuses_downgrade_and_existing_output() {
    let feed = TestFeed::new();
    let old = feed.publish_full("1.0.0");
    let new = feed.publish_full("1.1.0");
    let scratch = TempDir::new().unwrap();
    let builder = DeltaPackageBuilder::new(scratch.path());

    let backwards = scratch.path().join("backwards-delta.nupkg");
    let err = builder.create_delta_package(&new, &old, &backwards).unwrap_err();
    assert!(matches!(err, Error::InvalidVersion(_)));
    assert!(!backwards.exists());

    let same = builder.create_delta_package(&old, &old, &backwards).unwrap_err();
    assert!(matches!(same, Error::InvalidVersion(_)));

    let existing = feed.package(&delta_name("1.1.0"));
    fs::write(&existing, b"occupied").unwrap();
    let err = builder.create_delta_package(&old, &new, &existing).unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)));
    assert_eq!(fs::read(&existing).unwrap(), b"occupied");
}
