// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands, DeltaCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let quiet = cli.quiet;
    match cli.command {
        Commands::Check {
            install,
            ignore_deltas,
            json,
        } => commands::cmd_check(&install, ignore_deltas, json, quiet).await,
        Commands::Download {
            install,
            ignore_deltas,
        } => commands::cmd_download(&install, ignore_deltas, quiet).await,
        Commands::Apply {
            install,
            ignore_deltas,
        } => commands::cmd_apply(&install, ignore_deltas, quiet).await,
        Commands::Update { install } => commands::cmd_update(&install, quiet).await,
        Commands::Version { install } => commands::cmd_version(&install),
        Commands::Releasify { dir, stage } => commands::cmd_releasify(&dir, stage),
        Commands::Diff { old, new, patch } => commands::cmd_diff(&old, &new, &patch),
        Commands::Patch { old, patch, output } => commands::cmd_patch(&old, &patch, &output),
        Commands::Delta(DeltaCommands::Create {
            base,
            new,
            output,
            temp_dir,
        }) => commands::cmd_delta_create(&base, &new, output.as_deref(), temp_dir.as_deref()),
        Commands::Delta(DeltaCommands::Apply {
            base,
            deltas,
            output,
            diff_helper,
            temp_dir,
        }) => commands::cmd_delta_apply(
            &base,
            &deltas,
            &output,
            diff_helper.as_deref(),
            temp_dir.as_deref(),
            quiet,
        ),
    }
}
