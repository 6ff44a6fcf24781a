// src/release/set.rs

//! The RELEASES manifest as an ordered collection of entries

use super::entry::ReleaseEntry;
use super::{strip_bom, RELEASES_FILENAME};
use crate::error::{Error, Result};
use crate::filesystem::write_atomic;
use crate::version::PackageVersion;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Entries sorted by version, deltas before fulls at equal versions.
///
/// At most one entry exists per `(version, is_delta)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseSet {
    entries: Vec<ReleaseEntry>,
}

impl ReleaseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, keeping the last entry seen for a duplicated key
    pub fn from_entries(entries: impl IntoIterator<Item = ReleaseEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry);
        }
        set
    }

    /// Add an entry, replacing any entry with the same version and kind
    pub fn insert(&mut self, entry: ReleaseEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.version() == entry.version() && e.is_delta() == entry.is_delta())
        {
            warn!(
                "Duplicate release entry for {} ({}), keeping {}",
                entry.version(),
                if entry.is_delta() { "delta" } else { "full" },
                entry.filename()
            );
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
        self.sort();
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.version()
                .cmp(b.version())
                .then_with(|| b.is_delta().cmp(&a.is_delta()))
        });
    }

    /// Parse manifest text
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_staging(text, None)
    }

    /// Parse manifest text, dropping entries whose staged rollout
    /// excludes `client_id`
    pub fn parse_with_staging(text: &str, client_id: Option<&Uuid>) -> Result<Self> {
        let mut entries = Vec::new();
        for line in strip_bom(text).lines() {
            let Some(entry) = ReleaseEntry::parse(line)? else {
                continue;
            };
            if let Some(id) = client_id
                && !entry.is_staging_match(id)
            {
                debug!("Skipping {}: outside staged rollout", entry.filename());
                continue;
            }
            entries.push(entry);
        }
        Ok(Self::from_entries(entries))
    }

    /// Read and parse a RELEASES file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Manifest text: one line per entry, `\n` separated, no trailing newline
    pub fn to_manifest_string(&self) -> String {
        self.entries
            .iter()
            .map(ReleaseEntry::entry_as_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the file at `path` with this manifest
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_manifest_string().as_bytes())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReleaseEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    /// Highest-versioned full release
    pub fn latest_full(&self) -> Option<&ReleaseEntry> {
        self.entries.iter().rev().find(|e| !e.is_delta())
    }

    pub fn max_version(&self) -> Option<&PackageVersion> {
        self.entries.last().map(ReleaseEntry::version)
    }

    /// Copy of this set with delta entries removed
    pub fn without_deltas(&self) -> Self {
        Self {
            entries: self.entries.iter().filter(|e| !e.is_delta()).cloned().collect(),
        }
    }

    /// Full entry for an exact version
    pub fn find_full(&self, version: &PackageVersion) -> Option<&ReleaseEntry> {
        self.entries
            .iter()
            .find(|e| !e.is_delta() && e.version() == version)
    }
}

impl<'a> IntoIterator for &'a ReleaseSet {
    type Item = &'a ReleaseEntry;
    type IntoIter = std::slice::Iter<'a, ReleaseEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Describe every `*.nupkg` in `dir`, without writing anything
pub fn scan_packages(dir: &Path) -> Result<ReleaseSet> {
    let mut packages = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_package = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("nupkg"));
        if is_package {
            packages.push(path);
        }
    }

    let entries = packages
        .par_iter()
        .map(|path| ReleaseEntry::generate_from_file(path))
        .collect::<Result<Vec<_>>>()?;

    Ok(ReleaseSet::from_entries(entries))
}

/// Hash every package in `dir` and rewrite `dir/RELEASES` to match
pub fn build_releases_file(dir: &Path) -> Result<ReleaseSet> {
    let set = scan_packages(dir)?;
    set.write_atomic(&dir.join(RELEASES_FILENAME))?;
    info!(
        "Wrote {} with {} entries",
        dir.join(RELEASES_FILENAME).display(),
        set.len()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const A: &str = "94689FEDE03FED7AB59C24337673A27837F0C3EC";
    const B: &str = "3A2EB4ED2DD6FE4A0C3B37D4F4BF1DDB6A62A6A8";
    const C: &str = "14DB31D2647C3A8BAF8A1F1E3F5E3E8CD3C1F0B2";

    #[test]
    fn test_parse_and_sort() {
        let text = format!(
            "{A} MyApp-1.1.0-full.nupkg 1040561\n\
             {B} MyApp-1.0.0-full.nupkg 1004502\n\
             {C} MyApp-1.1.0-delta.nupkg 80396\n"
        );
        let set = ReleaseSet::parse(&text).unwrap();

        let names: Vec<&str> = set.iter().map(|e| e.filename()).collect();
        assert_eq!(
            names,
            vec![
                "MyApp-1.0.0-full.nupkg",
                "MyApp-1.1.0-delta.nupkg",
                "MyApp-1.1.0-full.nupkg"
            ]
        );
        assert_eq!(set.latest_full().unwrap().filesize(), 1_040_561);
        assert_eq!(set.max_version().unwrap().to_string(), "1.1.0");
    }

    #[test]
    fn test_parse_strips_bom_and_skips_blanks() {
        let text = format!("\u{feff}{A} MyApp-1.0.0-full.nupkg 1\r\n\r\n# comment\r\n");
        let set = ReleaseSet::parse(&text).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_parse_empty() {
        assert!(ReleaseSet::parse("").unwrap().is_empty());
        assert!(ReleaseSet::parse("\u{feff}").unwrap().is_empty());
    }

    #[test]
    fn test_manifest_roundtrip_is_byte_identical() {
        let text = format!(
            "{B} MyApp-1.0.0-full.nupkg 1004502\n\
             {C} MyApp-1.1.0-delta.nupkg 80396\n\
             {A} https://cdn.example.com/r/MyApp-1.1.0-full.nupkg?sig=1 1040561 # 40%"
        );
        let set = ReleaseSet::parse(&text).unwrap();
        assert_eq!(set.to_manifest_string(), text);
    }

    #[test]
    fn test_duplicates_collapse() {
        let text = format!(
            "{A} MyApp-1.0.0-full.nupkg 10\n\
             {B} MyApp-1.0.0-full.nupkg 20\n"
        );
        let set = ReleaseSet::parse(&text).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].filesize(), 20);
    }

    #[test]
    fn test_one_bad_line_fails_the_manifest() {
        let text = format!("{A} MyApp-1.0.0-full.nupkg 10\ngarbage line here\n");
        assert!(matches!(
            ReleaseSet::parse(&text),
            Err(Error::CorruptManifest(_))
        ));
    }

    #[test]
    fn test_parse_with_staging_filters() {
        let text = format!(
            "{A} MyApp-1.0.0-full.nupkg 10\n\
             {B} MyApp-1.1.0-full.nupkg 20 # 0%\n"
        );
        let id = Uuid::new_v4();
        let set = ReleaseSet::parse_with_staging(&text, Some(&id)).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.latest_full().unwrap().version().to_string(), "1.0.0");

        // Without a client id nothing is filtered
        assert_eq!(ReleaseSet::parse(&text).unwrap().len(), 2);
    }

    #[test]
    fn test_without_deltas() {
        let text = format!(
            "{A} MyApp-1.1.0-full.nupkg 10\n\
             {C} MyApp-1.1.0-delta.nupkg 5\n"
        );
        let set = ReleaseSet::parse(&text).unwrap().without_deltas();
        assert_eq!(set.len(), 1);
        assert!(!set.entries()[0].is_delta());
    }

    #[test]
    fn test_build_releases_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("MyApp-1.0.0-full.nupkg"), b"first package").unwrap();
        fs::write(temp.path().join("MyApp-1.1.0-full.nupkg"), b"second package").unwrap();
        fs::write(temp.path().join("notes.txt"), b"ignored").unwrap();

        let set = build_releases_file(temp.path()).unwrap();
        assert_eq!(set.len(), 2);

        let written = fs::read_to_string(temp.path().join(RELEASES_FILENAME)).unwrap();
        assert_eq!(written, set.to_manifest_string());
        assert!(!written.ends_with('\n'));

        let reloaded = ReleaseSet::load(&temp.path().join(RELEASES_FILENAME)).unwrap();
        assert_eq!(reloaded, set);
    }
}
