// src/commands/update.rs
//! Client update commands

use super::phase_progress;
use crate::cli::InstallArgs;
use anyhow::{anyhow, Context, Result};
use tracing::info;
use updraft::{UpdateInfo, UpdateManager, UpdaterConfig};

/// Config file first, command-line flags override it
fn load_config(args: &InstallArgs) -> Result<UpdaterConfig> {
    let mut config = match &args.config {
        Some(path) => UpdaterConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let root = args
                .root
                .clone()
                .ok_or_else(|| anyhow!("--root is required without --config"))?;
            let source = args
                .source
                .clone()
                .ok_or_else(|| anyhow!("--source is required without --config"))?;
            UpdaterConfig::new(root, source)
        }
    };

    if args.config.is_some() {
        if let Some(root) = &args.root {
            config.root_dir = root.clone();
        }
        if let Some(source) = &args.source {
            config.update_source = source.clone();
        }
    }
    config.validate()?;
    Ok(config)
}

fn manager(args: &InstallArgs) -> Result<UpdateManager> {
    let config = load_config(args)?;
    info!(
        "Using root {} with feed {}",
        config.root_dir.display(),
        config.update_source
    );
    Ok(UpdateManager::new(config)?)
}

fn print_plan(info: &UpdateInfo) {
    match &info.currently_installed {
        Some(current) => println!("Installed: {}", current.version()),
        None => println!("Installed: none"),
    }
    if !info.has_updates() {
        println!("Up to date");
        return;
    }
    println!(
        "Update to {} via {} ({} bytes):",
        info.future_release.version(),
        if info.is_delta_chain() { "delta chain" } else { "full package" },
        info.download_size()
    );
    for entry in &info.releases_to_apply {
        println!("  {} ({} bytes)", entry.filename(), entry.filesize());
    }
}

fn plan_json(info: &UpdateInfo) -> serde_json::Value {
    serde_json::json!({
        "currently_installed": info.currently_installed.as_ref().map(|e| e.version().to_string()),
        "future_release": info.future_release.version().to_string(),
        "is_delta_chain": info.is_delta_chain(),
        "download_size": info.download_size(),
        "releases_to_apply": info
            .releases_to_apply
            .iter()
            .map(|e| serde_json::json!({
                "filename": e.filename(),
                "sha1": e.sha1(),
                "filesize": e.filesize(),
            }))
            .collect::<Vec<_>>(),
    })
}

pub async fn cmd_check(args: &InstallArgs, ignore_deltas: bool, json: bool, quiet: bool) -> Result<()> {
    let manager = manager(args)?;
    let progress = phase_progress("Checking", quiet || json);
    let info = manager.check_for_update(ignore_deltas, progress.clone()).await?;
    progress.finish_with_message("Checked");

    match info {
        None => println!("Feed lists no releases"),
        Some(info) if json => println!("{}", serde_json::to_string_pretty(&plan_json(&info))?),
        Some(info) => print_plan(&info),
    }
    Ok(())
}

pub async fn cmd_download(args: &InstallArgs, ignore_deltas: bool, quiet: bool) -> Result<()> {
    let manager = manager(args)?;
    let Some(info) = manager
        .check_for_update(ignore_deltas, phase_progress("Checking", true))
        .await?
    else {
        println!("Feed lists no releases");
        return Ok(());
    };

    let progress = phase_progress("Downloading", quiet);
    manager
        .download_releases(&info.releases_to_apply, progress.clone())
        .await?;
    progress.finish_with_message("Downloaded");
    println!(
        "Downloaded {} package(s) to {}",
        info.releases_to_apply.len(),
        info.package_directory.display()
    );
    Ok(())
}

pub async fn cmd_apply(args: &InstallArgs, ignore_deltas: bool, quiet: bool) -> Result<()> {
    let manager = manager(args)?;
    let Some(info) = manager
        .check_for_update(ignore_deltas, phase_progress("Checking", true))
        .await?
    else {
        println!("Feed lists no releases");
        return Ok(());
    };

    let progress = phase_progress("Applying", quiet);
    let app_dir = manager.apply_releases(&info, progress.clone()).await?;
    progress.finish_with_message("Applied");
    println!("Version {} installed at {}", info.future_release.version(), app_dir.display());
    Ok(())
}

pub async fn cmd_update(args: &InstallArgs, quiet: bool) -> Result<()> {
    let manager = manager(args)?;
    let progress = phase_progress("Updating", quiet);
    let result = manager.update_app(progress.clone()).await;

    match result {
        Ok(Some(release)) => {
            progress.finish_with_message("Updated");
            println!("Now at version {}", release.version());
            Ok(())
        }
        Ok(None) => {
            progress.finish_with_message("Nothing to do");
            println!("Feed lists no releases");
            Ok(())
        }
        Err(e) => {
            progress.finish_with_error("Update failed");
            Err(e.into())
        }
    }
}

pub fn cmd_version(args: &InstallArgs) -> Result<()> {
    let manager = manager(args)?;
    match manager.current_version() {
        Some(version) => println!("{}", version),
        None => println!("Not installed"),
    }
    Ok(())
}
