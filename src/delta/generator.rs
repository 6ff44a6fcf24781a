// src/delta/generator.rs

//! Producing a delta package from two full packages

use super::metrics::FileOutcome;
use super::{is_lib_path, relative_files, DeltaMetrics, DeltaPackageBuilder, BSDIFF_SUFFIX, SHASUM_SUFFIX};
use crate::bsdiff;
use crate::error::{Error, Result};
use crate::release::ReleaseEntry;
use crate::version::PackageVersion;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

impl DeltaPackageBuilder {
    /// Create a delta package that turns `base` into `new`.
    ///
    /// Fails if `base` is not older than `new`. Files under `lib/` present
    /// in both packages become a `.bsdiff` plus `.shasum` pair (both empty
    /// when unchanged); files only in `new` are shipped as they are.
    pub fn create_delta_package(
        &self,
        base: &Path,
        new: &Path,
        output: &Path,
    ) -> Result<DeltaMetrics> {
        let base_version = package_version(base)?;
        let new_version = package_version(new)?;
        if base_version >= new_version {
            return Err(Error::InvalidVersion(format!(
                "base package {} must be older than new package {}",
                base_version, new_version
            )));
        }
        if output.exists() {
            return Err(Error::InvalidPath(format!(
                "Output package {} already exists",
                output.display()
            )));
        }
        info!(
            "Creating delta from {} to {}",
            base_version, new_version
        );

        let base_dir = self.scratch_dir("base-")?;
        let work_dir = self.scratch_dir("new-")?;
        self.archive.extract_all(base, base_dir.path())?;
        self.archive.extract_all(new, work_dir.path())?;

        let base_lib: HashMap<String, PathBuf> = relative_files(base_dir.path())?
            .into_iter()
            .filter(|f| is_lib_path(f))
            .map(|f| {
                let full = base_dir.path().join(&f);
                (f, full)
            })
            .collect();

        let new_lib: Vec<String> = relative_files(work_dir.path())?
            .into_iter()
            .filter(|f| is_lib_path(f))
            .collect();
        if new_lib.is_empty() {
            return Err(Error::ArchiveError(format!(
                "{} has no files under lib/",
                new.display()
            )));
        }

        let outcomes = new_lib
            .par_iter()
            .map(|relative| {
                self.check_cancelled()?;
                diff_file(&work_dir.path().join(relative), relative, &base_lib)
            })
            .collect::<Result<Vec<_>>>()?;

        self.pack_into(work_dir.path(), output)?;

        let metrics = DeltaMetrics::new(
            fs::metadata(base)?.len(),
            fs::metadata(new)?.len(),
            fs::metadata(output)?.len(),
        )
        .tally(&outcomes);

        info!(
            "Delta {}: {} patched, {} unchanged, {} new, {:.1}% smaller than full",
            output.display(),
            metrics.files_patched,
            metrics.files_unchanged,
            metrics.files_added,
            metrics.savings_percentage()
        );
        Ok(metrics)
    }
}

fn package_version(path: &Path) -> Result<PackageVersion> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
    PackageVersion::from_filename(name)
}

/// Replace `target` in the new package tree by its delta representation
fn diff_file(
    target: &Path,
    relative: &str,
    base_lib: &HashMap<String, PathBuf>,
) -> Result<FileOutcome> {
    let Some(base_file) = base_lib.get(relative) else {
        debug!("{} not found in base package, marking as new", relative);
        return Ok(FileOutcome::Added);
    };

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(target.display().to_string()))?;
    let patch_path = target.with_file_name(format!("{}{}", name, BSDIFF_SUFFIX));
    let shasum_path = target.with_file_name(format!("{}{}", name, SHASUM_SUFFIX));

    let old = fs::read(base_file)?;
    let new = fs::read(target)?;

    let outcome = if old == new {
        debug!("{} hasn't changed, writing dummy files", relative);
        fs::write(&patch_path, b"")?;
        fs::write(&shasum_path, b"")?;
        FileOutcome::Unchanged
    } else {
        debug!("Delta patching {}", relative);
        let patch = bsdiff::create(&old, &new)?;
        fs::write(&patch_path, &patch)?;

        let checksum = ReleaseEntry::generate_from_reader(
            &mut new.as_slice(),
            &format!("{}{}", name, SHASUM_SUFFIX),
        )?;
        fs::write(&shasum_path, checksum.entry_as_string())?;
        FileOutcome::Patched
    };

    fs::remove_file(target)?;
    Ok(outcome)
}
