// src/version/mod.rs

//! Package versions as they appear in release filenames
//!
//! A package filename looks like `MyApp-1.2.3-beta10-full.nupkg`. The version
//! is the trailing run of two to four numeric fields plus an optional
//! prerelease tag, read after stripping the `-full`/`-delta` and `.nupkg`
//! suffixes.
//!
//! Ordering rules:
//! - numeric fields compare numerically, missing fields count as zero
//!   (`1.2 == 1.2.0`)
//! - a release without a tag sorts above every prerelease of the same
//!   numbers
//! - tags are split into digit and letter runs; digit runs compare
//!   numerically, so `beta9 < beta10 < beta100`

use crate::error::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(-full|-delta)?\.nupkg$").expect("static regex")
});

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+){1,3})(?:-([A-Za-z][0-9A-Za-z.-]*))?$").expect("static regex")
});

/// A parsed package version
#[derive(Debug, Clone)]
pub struct PackageVersion {
    numbers: Vec<u64>,
    prerelease: Option<String>,
}

impl PackageVersion {
    /// Parse a bare version string such as `1.2.3` or `2.0.0-beta10`
    pub fn parse(s: &str) -> Result<Self> {
        let caps = VERSION_RE
            .captures(s)
            .filter(|c| c.get(0).is_some_and(|m| m.start() == 0))
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))?;
        Self::from_captures(s, &caps)
    }

    /// Extract the version from a package filename
    pub fn from_filename(filename: &str) -> Result<Self> {
        let stem = SUFFIX_RE.replace(filename, "");
        let caps = VERSION_RE
            .captures(&stem)
            .ok_or_else(|| Error::InvalidVersion(filename.to_string()))?;
        Self::from_captures(filename, &caps)
    }

    fn from_captures(source: &str, caps: &regex::Captures<'_>) -> Result<Self> {
        let numbers = caps
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|e| Error::InvalidVersion(format!("{}: {}", source, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            numbers,
            prerelease: caps.get(2).map(|m| m.as_str().to_string()),
        })
    }

    /// Numeric fields as parsed
    pub fn numbers(&self) -> &[u64] {
        &self.numbers
    }

    /// Prerelease tag, if any
    pub fn prerelease(&self) -> Option<&str> {
        self.prerelease.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Numeric fields with trailing zeros removed (`1.2.0` -> `[1, 2]`)
    fn normalized(&self) -> &[u64] {
        let end = self
            .numbers
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1);
        &self.numbers[..end]
    }
}

impl Default for PackageVersion {
    /// `0.0`, the version of a file that does not name one
    fn default() -> Self {
        Self {
            numbers: vec![0, 0],
            prerelease: None,
        }
    }
}

/// One token of a prerelease tag
#[derive(Debug, PartialEq, Eq)]
enum TagToken<'a> {
    Number(u64),
    Text(&'a str),
}

fn tokenize(tag: &str) -> Vec<TagToken<'_>> {
    let mut tokens = Vec::new();
    let bytes = tag.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        if !bytes[start].is_ascii_alphanumeric() {
            start += 1;
            continue;
        }
        let digits = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len()
            && bytes[end].is_ascii_alphanumeric()
            && bytes[end].is_ascii_digit() == digits
        {
            end += 1;
        }
        let run = &tag[start..end];
        tokens.push(if digits {
            // Overlong digit runs saturate rather than fail
            TagToken::Number(run.parse().unwrap_or(u64::MAX))
        } else {
            TagToken::Text(run)
        });
        start = end;
    }
    tokens
}

fn compare_tags(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);

    for (l, r) in left.iter().zip(&right) {
        let ord = match (l, r) {
            (TagToken::Number(x), TagToken::Number(y)) => x.cmp(y),
            (TagToken::Text(x), TagToken::Text(y)) => {
                x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase())
            }
            (TagToken::Number(_), TagToken::Text(_)) => Ordering::Less,
            (TagToken::Text(_), TagToken::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => compare_tags(a, b),
        }
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
        if let Some(tag) = &self.prerelease {
            for token in tokenize(tag) {
                match token {
                    TagToken::Number(n) => n.hash(state),
                    TagToken::Text(t) => t.to_ascii_lowercase().hash(state),
                }
            }
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.numbers.iter().map(u64::to_string).collect();
        write!(f, "{}", numbers.join("."))?;
        if let Some(tag) = &self.prerelease {
            write!(f, "-{}", tag)?;
        }
        Ok(())
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
