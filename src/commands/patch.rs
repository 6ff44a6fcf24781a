// src/commands/patch.rs
//! Raw bsdiff commands

use anyhow::{Context, Result};
use std::path::Path;
use updraft::bsdiff;

pub fn cmd_diff(old: &Path, new: &Path, patch: &Path) -> Result<()> {
    let size = bsdiff::create_file(old, new, patch)
        .with_context(|| format!("diffing {} against {}", new.display(), old.display()))?;
    println!("Wrote {} ({} bytes)", patch.display(), size);
    Ok(())
}

pub fn cmd_patch(old: &Path, patch: &Path, output: &Path) -> Result<()> {
    let size = bsdiff::apply_file(old, patch, output)
        .with_context(|| format!("applying {} to {}", patch.display(), old.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), size);
    Ok(())
}
