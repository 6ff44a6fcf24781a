// src/archive.rs

//! Package archive access
//!
//! Packages are zip files. The engine only ever needs two operations,
//! unpack everything and pack a directory, so the seam is a small trait
//! and [`ZipArchive`] is the implementation used everywhere outside tests.

use crate::error::{Error, Result};
use crate::filesystem::path::entry_path;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Read/write access to package archives
pub trait Archive: Send + Sync {
    /// Unpack every entry of `archive` under `dest`
    fn extract_all(&self, archive: &Path, dest: &Path) -> Result<()>;

    /// Pack the contents of `src_dir` into a new archive at `output`
    fn create_from_directory(&self, output: &Path, src_dir: &Path) -> Result<()>;
}

/// Zip-backed package archives
///
/// Archives are written with entries in sorted order, fixed timestamps and
/// fixed permissions, so packing the same tree twice yields the same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchive;

impl ZipArchive {
    pub fn new() -> Self {
        Self
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644)
    }
}

impl Archive for ZipArchive {
    fn extract_all(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive).map_err(|e| {
            Error::ArchiveError(format!("Failed to open {}: {}", archive.display(), e))
        })?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
        fs::create_dir_all(dest)?;

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let relative = entry_path(entry.name())?;
            let target = dest.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(&target)?);
            io::copy(&mut entry, &mut out)?;
            out.flush()?;
        }

        debug!(
            "Extracted {} entries from {} to {}",
            zip.len(),
            archive.display(),
            dest.display()
        );
        Ok(())
    }

    fn create_from_directory(&self, output: &Path, src_dir: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(output).map_err(|e| {
            Error::ArchiveError(format!("Failed to create {}: {}", output.display(), e))
        })?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = Self::options();
        let mut count = 0usize;

        for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(src_dir)
                .map_err(|e| Error::InvalidPath(e.to_string()))?;
            // Zip names always use forward slashes
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                zip.add_directory(name, options)?;
            } else {
                zip.start_file(name, options)?;
                let mut input = File::open(entry.path())?;
                io::copy(&mut input, &mut zip)?;
                count += 1;
            }
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| Error::IoError(e.to_string()))?
            .sync_all()?;

        debug!("Packed {} files from {} into {}", count, src_dir.display(), output.display());
        Ok(())
    }
}
