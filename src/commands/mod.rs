// src/commands/mod.rs
//! Command handlers for the updraft CLI

mod delta;
mod patch;
mod release;
mod update;

pub use delta::{cmd_delta_apply, cmd_delta_create};
pub use patch::{cmd_diff, cmd_patch};
pub use release::cmd_releasify;
pub use update::{cmd_apply, cmd_check, cmd_download, cmd_update, cmd_version};

use std::sync::Arc;
use updraft::progress::{CliProgress, ProgressTracker, SilentProgress};

/// Progress bar for one phase, or nothing when `quiet`
pub(crate) fn phase_progress(message: &str, quiet: bool) -> Arc<dyn ProgressTracker> {
    if quiet {
        SilentProgress::percent()
    } else {
        CliProgress::percent(message)
    }
}
