// src/commands/delta.rs
//! Delta package commands

use super::phase_progress;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use updraft::delta::{CommandDiffEngine, DeltaPackageBuilder};
use updraft::release::DELTA_SUFFIX;

fn builder(temp_dir: Option<&Path>) -> DeltaPackageBuilder {
    DeltaPackageBuilder::new(temp_dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir))
}

/// `MyApp-1.1.0-full.nupkg` to `MyApp-1.1.0-delta.nupkg`
fn default_delta_output(new: &Path) -> Result<PathBuf> {
    let name = new
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("invalid package path {}", new.display()))?;
    let stem = name
        .strip_suffix("-full.nupkg")
        .or_else(|| name.strip_suffix(".nupkg"))
        .ok_or_else(|| anyhow!("{} is not a .nupkg", name))?;
    Ok(new.with_file_name(format!("{}{}", stem, DELTA_SUFFIX)))
}

pub fn cmd_delta_create(
    base: &Path,
    new: &Path,
    output: Option<&Path>,
    temp_dir: Option<&Path>,
) -> Result<()> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => default_delta_output(new)?,
    };
    info!("Creating delta {}", output.display());

    let metrics = builder(temp_dir).create_delta_package(base, new, &output)?;

    println!("Wrote {}", output.display());
    println!(
        "  {} patched, {} unchanged, {} new",
        metrics.files_patched, metrics.files_unchanged, metrics.files_added
    );
    println!(
        "  {} bytes vs {} bytes full ({:.1}% saved)",
        metrics.delta_size,
        metrics.new_size,
        metrics.savings_percentage()
    );
    if !metrics.is_worthwhile() {
        println!("  warning: delta is not meaningfully smaller than the full package");
    }
    Ok(())
}

pub fn cmd_delta_apply(
    base: &Path,
    deltas: &[PathBuf],
    output: &Path,
    diff_helper: Option<&Path>,
    temp_dir: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let mut builder = builder(temp_dir);
    if let Some(helper) = diff_helper {
        builder = builder.with_diff_engine(Arc::new(CommandDiffEngine::new(helper)));
    }

    let progress = phase_progress("Applying deltas", quiet);
    match builder.apply_delta_chain(base, deltas, output, &progress) {
        Ok(()) => {
            progress.finish_with_message("Applied");
            println!("Wrote {}", output.display());
            Ok(())
        }
        Err(e) => {
            progress.finish_with_error("Failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delta_output() {
        assert_eq!(
            default_delta_output(Path::new("/feed/MyApp-1.1.0-full.nupkg")).unwrap(),
            PathBuf::from("/feed/MyApp-1.1.0-delta.nupkg")
        );
        assert!(default_delta_output(Path::new("/feed/notes.txt")).is_err());
    }
}
