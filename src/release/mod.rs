// src/release/mod.rs

//! Release manifests
//!
//! A feed publishes a `RELEASES` file listing every package it serves:
//!
//! ```text
//! 94689FEDE03FED7AB59C24337673A27837F0C3EC MyApp-1.0.0-full.nupkg 1004502
//! 3A2EB4ED2DD6FE4A0C3B37D4F4BF1DDB6A62A6A8 MyApp-1.1.0-delta.nupkg 80396
//! 14DB31D2647C3A8BAF8A1F1E3F5E3E8CD3C1F0B2 MyApp-1.1.0-full.nupkg 1040561 # 20%
//! ```
//!
//! Each line is a [`ReleaseEntry`]; the file as a whole is a [`ReleaseSet`].
//! A trailing `# NN%` marks a staged rollout, see [`staging_bucket`].

mod entry;
mod set;
mod staging;

pub use entry::{is_delta_filename, ReleaseEntry, DELTA_SUFFIX};
pub use set::{build_releases_file, scan_packages, ReleaseSet};
pub use staging::staging_bucket;

/// Name of the manifest file in a feed or package directory
pub const RELEASES_FILENAME: &str = "RELEASES";

/// Strip a leading UTF-8 byte order mark
pub(crate) fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
