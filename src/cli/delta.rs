// src/cli/delta.rs
//! Delta package subcommands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum DeltaCommands {
    /// Create a delta package from two full packages
    Create {
        /// Older full package
        base: PathBuf,

        /// Newer full package
        new: PathBuf,

        /// Output delta package (default: next to NEW, named -delta.nupkg)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Scratch directory
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },

    /// Rebuild a full package from a base package and one or more deltas
    Apply {
        /// Base full package
        base: PathBuf,

        /// Delta packages, in ascending version order
        #[arg(required = true)]
        deltas: Vec<PathBuf>,

        /// Output full package
        #[arg(short, long)]
        output: PathBuf,

        /// Helper for .diff entries: `<helper> <old> <diff> <out>`
        #[arg(long)]
        diff_helper: Option<PathBuf>,

        /// Scratch directory
        #[arg(long)]
        temp_dir: Option<PathBuf>,
    },
}
