// src/filesystem/path.rs

//! Turning untrusted names into paths
//!
//! Two kinds of names reach the disk from outside: entry names inside a
//! package archive, and file locations read from a local feed's RELEASES.
//! Neither may climb out of the directory it is joined onto.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Relative path for an archive entry name.
///
/// Packages built on Windows store `lib\net45\MyApp.exe`, so backslashes
/// count as separators. Leading separators and `.` segments are dropped;
/// any `..` segment is an error.
///
/// ```
/// use updraft::filesystem::path::entry_path;
/// use std::path::PathBuf;
///
/// assert_eq!(entry_path("lib\\net45\\MyApp.exe").unwrap(), PathBuf::from("lib/net45/MyApp.exe"));
/// assert!(entry_path("lib/../../MyApp.exe").is_err());
/// ```
pub fn entry_path(name: &str) -> Result<PathBuf> {
    let unified = name.replace('\\', "/");
    let mut relative = PathBuf::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(Error::PathTraversal(name.to_string())),
            _ => relative.push(segment),
        }
    }

    // A drive prefix such as `C:` would make the join absolute on Windows
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(Error::PathTraversal(name.to_string()));
    }
    if relative.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!("Empty entry name {:?}", name)));
    }
    Ok(relative)
}

/// Resolve a feed location under `root`.
///
/// Beyond the lexical check in [`entry_path`], a location that resolves
/// through a symlink to somewhere outside the feed is refused.
pub fn join_under(root: &Path, location: &str) -> Result<PathBuf> {
    let joined = root.join(entry_path(location)?);

    if let (Ok(real_root), Ok(real_target)) = (root.canonicalize(), joined.canonicalize())
        && !real_target.starts_with(&real_root)
    {
        return Err(Error::PathTraversal(format!(
            "{} resolves outside {}",
            location,
            root.display()
        )));
    }
    Ok(joined)
}
