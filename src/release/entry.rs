// src/release/entry.rs

//! A single line of a RELEASES manifest

use crate::error::{Error, Result};
use crate::hash::{hash_reader, HashAlgorithm};
use crate::version::PackageVersion;
use regex::Regex;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use url::Url;
use uuid::Uuid;

use super::staging::staging_bucket;

static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{40})\s+(\S+)\s+(\d+)[\r]*$").expect("static regex")
});

static STAGING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\s*(\d{1,3})%").expect("static regex"));

/// Characters that may never appear in a bare filename
const INVALID_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Suffix that marks a delta package
pub const DELTA_SUFFIX: &str = "-delta.nupkg";

/// Descriptor of one package artifact in a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    sha1: String,
    filename: String,
    filesize: u64,
    is_delta: bool,
    version: PackageVersion,
    base_url: Option<String>,
    query: Option<String>,
    staging_percentage: Option<u8>,
}

impl ReleaseEntry {
    /// Build an entry, validating the checksum and filename
    pub fn new(sha1: &str, filename: &str, filesize: u64) -> Result<Self> {
        if sha1.len() != 40 || !sha1.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::CorruptManifest(format!(
                "invalid SHA-1 '{}' for {}",
                sha1, filename
            )));
        }
        validate_filename(filename)?;

        Ok(Self {
            sha1: sha1.to_string(),
            filename: filename.to_string(),
            filesize,
            is_delta: is_delta_filename(filename),
            version: PackageVersion::from_filename(filename)?,
            base_url: None,
            query: None,
            staging_percentage: None,
        })
    }

    /// Parse one manifest line.
    ///
    /// Returns `Ok(None)` for blank and comment-only lines.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let staging_percentage = STAGING_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .map(|p| p.min(100));

        let content = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let caps = ENTRY_RE
            .captures(content)
            .ok_or_else(|| Error::CorruptManifest(format!("invalid release entry: {}", line)))?;

        let sha1 = &caps[1];
        let location = &caps[2];
        let filesize = caps[3]
            .parse::<u64>()
            .map_err(|e| Error::CorruptManifest(format!("invalid size in '{}': {}", line, e)))?;

        let (base_url, filename, query) = split_location(location)?;
        if filesize == 0 {
            return Err(Error::CorruptManifest(format!(
                "release entry for {} has zero size",
                filename
            )));
        }

        let mut entry = Self::new(sha1, &filename, filesize)?;
        entry.base_url = base_url;
        entry.query = query;
        entry.staging_percentage = staging_percentage;
        Ok(Some(entry))
    }

    /// Parse the single line of a `.shasum` side-channel file.
    ///
    /// Unlike manifest lines, a zero size is valid here (an emptied file).
    pub fn parse_checksum(text: &str) -> Result<(String, u64)> {
        let text = super::strip_bom(text).trim();
        let caps = ENTRY_RE
            .captures(text)
            .ok_or_else(|| Error::CorruptManifest(format!("invalid checksum entry: {}", text)))?;
        let size = caps[3]
            .parse::<u64>()
            .map_err(|e| Error::CorruptManifest(format!("invalid size in '{}': {}", text, e)))?;
        Ok((caps[1].to_string(), size))
    }

    /// Hash a file on disk and describe it
    pub fn generate_from_file(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
        let mut file = File::open(path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::generate_from_reader(&mut file, filename)
    }

    /// Hash a stream and describe it under `filename`
    pub fn generate_from_reader<R: Read>(reader: &mut R, filename: &str) -> Result<Self> {
        let (hash, size) = hash_reader(HashAlgorithm::Sha1, reader)?;
        validate_filename(filename)?;

        Ok(Self {
            sha1: hash.value.to_uppercase(),
            filename: filename.to_string(),
            filesize: size,
            is_delta: is_delta_filename(filename),
            // Side-channel files such as `.shasum` carry no version
            version: PackageVersion::from_filename(filename).unwrap_or_default(),
            base_url: None,
            query: None,
            staging_percentage: None,
        })
    }

    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    pub fn version(&self) -> &PackageVersion {
        &self.version
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Staging percentage as a fraction in `[0, 1]`
    pub fn staging_percentage(&self) -> Option<f32> {
        self.staging_percentage.map(|p| f32::from(p) / 100.0)
    }

    /// Attach a staging percentage (0 to 100)
    pub fn with_staging_percentage(mut self, percent: u8) -> Self {
        self.staging_percentage = Some(percent.min(100));
        self
    }

    /// Attach a base URL that will prefix the filename when serialized
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Package id, the filename up to the first `-` or `.`
    pub fn package_name(&self) -> &str {
        match self.filename.find(['-', '.']) {
            Some(idx) => &self.filename[..idx],
            None => &self.filename,
        }
    }

    /// Location to fetch this entry from, relative to a feed root.
    ///
    /// Absolute when the manifest carried a URL.
    pub fn location(&self) -> String {
        format!(
            "{}{}{}",
            self.base_url.as_deref().unwrap_or(""),
            self.filename,
            self.query.as_deref().unwrap_or("")
        )
    }

    /// Whether a client falls inside this entry's staged rollout
    pub fn is_staging_match(&self, client_id: &Uuid) -> bool {
        match self.staging_percentage {
            None => true,
            Some(percent) => staging_bucket(client_id) < u32::from(percent),
        }
    }

    /// The manifest line for this entry
    pub fn entry_as_string(&self) -> String {
        let line = format!("{} {} {}", self.sha1, self.location(), self.filesize);
        match self.staging_percentage {
            Some(p) => format!("{} # {}%", line, p),
            None => line,
        }
    }

    /// Same artifact by content, ignoring where it is hosted
    pub fn same_content(&self, other: &Self) -> bool {
        self.filesize == other.filesize && self.sha1.eq_ignore_ascii_case(&other.sha1)
    }
}

impl fmt::Display for ReleaseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entry_as_string())
    }
}

/// True for `*-delta.nupkg`, case-insensitively
pub fn is_delta_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(DELTA_SUFFIX)
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || filename.contains(INVALID_FILENAME_CHARS)
        || filename.chars().any(char::is_control)
        || filename == "."
        || filename == ".."
    {
        return Err(Error::CorruptManifest(format!(
            "Filename can either be an absolute HTTP[s] URL, *or* a file name: {}",
            filename
        )));
    }
    Ok(())
}

/// Split a manifest location into (base_url, filename, query)
fn split_location(location: &str) -> Result<(Option<String>, String, Option<String>)> {
    let Ok(url) = Url::parse(location) else {
        return Ok((None, location.to_string(), None));
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::CorruptManifest(format!(
            "Filename can either be an absolute HTTP[s] URL, *or* a file name: {}",
            location
        )));
    }

    let without_query = location.split('?').next().unwrap_or(location);
    let split_at = without_query.rfind('/').map_or(0, |i| i + 1);
    let base_url = without_query[..split_at].to_string();
    let filename = without_query[split_at..].to_string();
    let query = url.query().map(|q| format!("?{}", q));

    Ok((Some(base_url), filename, query))
}
