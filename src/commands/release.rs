// src/commands/release.rs
//! Publishing a feed directory

use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;
use updraft::release::{build_releases_file, ReleaseSet, RELEASES_FILENAME};

/// Rebuild `RELEASES` from the packages in `dir`
pub fn cmd_releasify(dir: &Path, stage: Option<u8>) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    info!("Releasifying {}", dir.display());

    let mut set = build_releases_file(dir)?;

    if let Some(percent) = stage {
        if percent > 100 {
            bail!("staging percentage must be between 0 and 100");
        }
        let Some(latest) = set.latest_full().cloned() else {
            bail!("{} holds no full package to stage", dir.display());
        };
        set = ReleaseSet::from_entries(set.iter().cloned().map(|entry| {
            if entry == latest {
                entry.with_staging_percentage(percent)
            } else {
                entry
            }
        }));
        set.write_atomic(&dir.join(RELEASES_FILENAME))?;
        println!("Staged {} to {}% of clients", latest.filename(), percent);
    }

    println!("Wrote {} ({} entries):", dir.join(RELEASES_FILENAME).display(), set.len());
    for entry in &set {
        println!("  {}", entry.entry_as_string());
    }
    Ok(())
}
