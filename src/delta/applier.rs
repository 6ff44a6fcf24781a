// src/delta/applier.rs

//! Reconstructing full packages from a base package plus deltas

use super::{
    is_lib_path, relative_files, strip_patch_suffix, DeltaPackageBuilder, BSDIFF_SUFFIX,
    DIFF_SUFFIX, SHASUM_SUFFIX,
};
use crate::bsdiff;
use crate::error::{Error, Result};
use crate::hash::{hash_file, HashAlgorithm};
use crate::progress::{ProgressTracker, ScaledProgress};
use crate::release::ReleaseEntry;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl DeltaPackageBuilder {
    /// Apply `delta` to the full package `base`, writing the reconstructed
    /// full package to `output`.
    ///
    /// Every patched file is checked against its `.shasum` before it
    /// replaces the base file. On any error `output` is not created.
    /// Progress reports 25 after the delta is unpacked, 50 after the base,
    /// 75 once all patches are applied, 80 after removals, 100 when packed.
    pub fn apply_delta_package(
        &self,
        base: &Path,
        delta: &Path,
        output: &Path,
        progress: &Arc<dyn ProgressTracker>,
    ) -> Result<()> {
        if output.exists() {
            return Err(Error::InvalidPath(format!(
                "Output package {} already exists",
                output.display()
            )));
        }
        info!(
            "Applying delta {} to {}",
            delta.display(),
            base.display()
        );

        let delta_dir = self.scratch_dir("delta-")?;
        let work_dir = self.scratch_dir("work-")?;

        self.archive.extract_all(delta, delta_dir.path())?;
        progress.set_position(25);

        self.archive.extract_all(base, work_dir.path())?;
        progress.set_position(50);

        let delta_files = relative_files(delta_dir.path())?;
        let present: HashSet<String> = delta_files.iter().map(|f| f.to_lowercase()).collect();

        let mut visited = HashSet::new();
        for relative in delta_files.iter().filter(|f| is_lib_path(f)) {
            let lower = relative.to_lowercase();
            if lower.ends_with(SHASUM_SUFFIX) {
                continue;
            }
            // A .bsdiff sibling takes precedence over an external-tool diff
            if lower.ends_with(DIFF_SUFFIX) && !lower.ends_with(BSDIFF_SUFFIX) {
                let bsdiff_sibling = format!(
                    "{}{}",
                    &lower[..lower.len() - DIFF_SUFFIX.len()],
                    BSDIFF_SUFFIX
                );
                if present.contains(&bsdiff_sibling) {
                    continue;
                }
            }

            self.check_cancelled()?;
            visited.insert(strip_patch_suffix(relative).to_lowercase());
            self.apply_file(delta_dir.path(), relative, work_dir.path())?;
        }
        progress.set_position(75);

        for relative in relative_files(work_dir.path())? {
            if is_lib_path(&relative) && !visited.contains(&relative.to_lowercase()) {
                debug!("{} was removed in the new version", relative);
                fs::remove_file(work_dir.path().join(&relative))?;
            }
        }
        progress.set_position(80);

        for relative in delta_files.iter().filter(|f| !is_lib_path(f)) {
            let target = work_dir.path().join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(delta_dir.path().join(relative), &target)?;
        }

        self.pack_into(work_dir.path(), output)?;
        progress.set_position(100);
        Ok(())
    }

    /// Apply `deltas` in order starting from `base`.
    ///
    /// Each hop consumes the previous hop's output. Any failure aborts the
    /// whole chain and leaves no `output`.
    pub fn apply_delta_chain(
        &self,
        base: &Path,
        deltas: &[PathBuf],
        output: &Path,
        progress: &Arc<dyn ProgressTracker>,
    ) -> Result<()> {
        if deltas.is_empty() {
            return Err(Error::DeltaChain("no delta packages to apply".to_string()));
        }

        let scratch = self.scratch_dir("chain-")?;
        let hops = deltas.len() as u64;
        let mut current = base.to_path_buf();

        for (i, delta) in deltas.iter().enumerate() {
            let last = i + 1 == deltas.len();
            let target = if last {
                output.to_path_buf()
            } else {
                scratch.path().join(format!("hop-{}.nupkg", i))
            };

            let window = ScaledProgress::window(
                progress,
                i as u64 * 100 / hops,
                (i as u64 + 1) * 100 / hops,
            );
            if let Err(e) = self.apply_delta_package(&current, delta, &target, &window) {
                warn!(
                    "Delta chain failed at hop {} of {} ({}): {}",
                    i + 1,
                    hops,
                    delta.display(),
                    e
                );
                return Err(e);
            }
            current = target;
        }

        Ok(())
    }

    fn apply_file(&self, delta_dir: &Path, relative: &str, work_dir: &Path) -> Result<()> {
        let input = delta_dir.join(relative);
        let final_relative = strip_patch_suffix(relative);
        let final_target = work_dir.join(final_relative);

        if fs::metadata(&input)?.len() == 0 {
            debug!("{} exists unchanged, skipping", final_relative);
            return Ok(());
        }

        let lower = relative.to_lowercase();
        let patched = tempfile::Builder::new()
            .prefix("patch-")
            .tempfile_in(&self.temp_dir)?
            .into_temp_path();

        if lower.ends_with(BSDIFF_SUFFIX) {
            debug!("Applying bsdiff to {}", final_relative);
            let old = fs::read(&final_target).map_err(|e| {
                Error::DeltaChain(format!(
                    "base package has no {} to patch: {}",
                    final_relative, e
                ))
            })?;
            let patch = fs::read(&input)?;
            let mut out = File::create(&patched)?;
            bsdiff::apply_to_writer(&old, &patch, &mut out)?;
            out.flush()?;
            drop(out);
            verify_patched_file(&input, relative, &patched)?;
        } else if lower.ends_with(DIFF_SUFFIX) {
            debug!(
                "Applying {} diff to {}",
                self.diff_engine.name(),
                final_relative
            );
            self.diff_engine.apply(&final_target, &input, &patched)?;
            verify_patched_file(&input, relative, &patched)?;
        } else {
            debug!("Adding new file {}", final_relative);
            fs::copy(&input, &patched)?;
        }

        if final_target.exists() {
            fs::remove_file(&final_target)?;
        }
        if let Some(parent) = final_target.parent() {
            fs::create_dir_all(parent)?;
        }
        patched.persist(&final_target).map_err(|e| {
            Error::IoError(format!(
                "Failed to move patched {} into place: {}",
                final_relative, e.error
            ))
        })?;
        Ok(())
    }
}

/// Compare a patched file against the `.shasum` shipped next to its patch,
/// size first and then SHA-1
fn verify_patched_file(patch: &Path, relative: &str, patched: &Path) -> Result<()> {
    let patch_name = patch
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let shasum_name = format!("{}{}", strip_patch_suffix(&patch_name), SHASUM_SUFFIX);
    let shasum = patch.with_file_name(&shasum_name);

    let text = fs::read_to_string(&shasum).map_err(|e| {
        Error::DeltaChain(format!("missing checksum for {}: {}", relative, e))
    })?;
    let (expected_sha1, expected_size) = ReleaseEntry::parse_checksum(&text)?;
    let (actual, actual_size) = hash_file(HashAlgorithm::Sha1, patched)?;
    let target = strip_patch_suffix(relative).to_string();

    if actual_size != expected_size {
        warn!(
            "Patched file {} has incorrect size, expected {}, got {}",
            target, expected_size, actual_size
        );
        return Err(Error::ChecksumMismatch {
            path: target,
            expected: format!("{} bytes", expected_size),
            actual: format!("{} bytes", actual_size),
        });
    }

    if !actual.matches(&expected_sha1) {
        warn!(
            "Patched file {} has incorrect SHA1, expected {}, got {}",
            target, expected_sha1, actual
        );
        return Err(Error::ChecksumMismatch {
            path: target,
            expected: expected_sha1,
            actual: actual.as_str().to_uppercase(),
        });
    }

    Ok(())
}
