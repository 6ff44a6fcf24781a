// src/cli/mod.rs
//! CLI definitions for updraft
//!
//! Client commands operate on one install root:
//! - `check` - Compare the installed version with the feed
//! - `download` - Fetch the packages an update needs
//! - `apply` - Install already-downloaded packages
//! - `update` - Check, download and apply in one go
//!
//! Publisher commands:
//! - `releasify` - Rebuild `RELEASES` for a directory of packages
//! - `diff` / `patch` - Raw bsdiff on two files
//! - `delta` - Create or apply delta packages

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod delta;

pub use delta::DeltaCommands;

#[derive(Parser)]
#[command(name = "updraft")]
#[command(author = "Updraft Contributors")]
#[command(version)]
#[command(about = "Application self-update engine with binary delta packages", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Don't draw progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the installed application lives and where its feed is
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root directory of the installed application
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Feed URL or directory
    #[arg(short, long)]
    pub source: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the feed for a newer version
    Check {
        #[command(flatten)]
        install: InstallArgs,

        /// Plan with full packages only
        #[arg(long)]
        ignore_deltas: bool,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download the packages needed to update
    Download {
        #[command(flatten)]
        install: InstallArgs,

        /// Plan with full packages only
        #[arg(long)]
        ignore_deltas: bool,
    },

    /// Install packages that were already downloaded
    Apply {
        #[command(flatten)]
        install: InstallArgs,

        /// Plan with full packages only
        #[arg(long)]
        ignore_deltas: bool,
    },

    /// Check, download and apply
    Update {
        #[command(flatten)]
        install: InstallArgs,
    },

    /// Print the installed version
    Version {
        #[command(flatten)]
        install: InstallArgs,
    },

    /// Rebuild the RELEASES file for a directory of packages
    Releasify {
        /// Directory holding the .nupkg files
        dir: PathBuf,

        /// Staged rollout percentage for the newest full package
        #[arg(long)]
        stage: Option<u8>,
    },

    /// Create a bsdiff patch between two files
    Diff {
        old: PathBuf,
        new: PathBuf,
        patch: PathBuf,
    },

    /// Apply a bsdiff patch
    Patch {
        old: PathBuf,
        patch: PathBuf,
        output: PathBuf,
    },

    /// Delta package commands
    #[command(subcommand)]
    Delta(DeltaCommands),
}
