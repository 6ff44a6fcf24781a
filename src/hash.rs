// src/hash.rs

//! Checksums for packages and patched files
//!
//! | Use | Algorithm | Form |
//! |-----|-----------|------|
//! | RELEASES lines, `.shasum` files | SHA-1 | uppercase hex |
//! | Update lock file name | SHA-1 | uppercase hex |
//! | Staging bucket | SHA-256 | raw digest (see `release::staging`) |
//!
//! Feeds in the wild carry both upper- and lowercase hex, so comparisons
//! go through [`Hash::matches`], which ignores case.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read buffer for streaming hashes; packages run to hundreds of megabytes
const HASH_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        })
    }
}

/// A digest in lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl Hash {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Compare against hex in either case
    pub fn matches(&self, other: &str) -> bool {
        self.value.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Streaming hasher over either algorithm
pub enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        match self {
            Self::Sha1(h) => Hash {
                algorithm: HashAlgorithm::Sha1,
                value: hex::encode(h.finalize()),
            },
            Self::Sha256(h) => Hash {
                algorithm: HashAlgorithm::Sha256,
                value: hex::encode(h.finalize()),
            },
        }
    }
}

pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Hash everything `reader` yields; returns the digest and the byte count
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<(Hash, u64)> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    Ok((hasher.finalize(), total))
}

pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<(Hash, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    hash_reader(algorithm, &mut reader)
}

/// Uppercase SHA-1 hex, the form RELEASES files carry
pub fn sha1_hex(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha1, data).value.to_uppercase()
}

/// A file that is not what its descriptor says
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{algorithm} check failed: expected {expected}, got {actual}")]
pub struct VerifyError {
    pub algorithm: HashAlgorithm,
    pub expected: String,
    pub actual: String,
}

/// Check a file's size, then its digest.
///
/// The size check is free and catches truncated downloads before the
/// whole file is read.
pub fn verify_file(
    path: &Path,
    expected_size: u64,
    expected: &str,
    algorithm: HashAlgorithm,
) -> Result<(), VerifyError> {
    let mismatch = |expected: String, actual: String| VerifyError {
        algorithm,
        expected,
        actual,
    };

    let size = std::fs::metadata(path)
        .map_err(|e| mismatch(format!("{} bytes", expected_size), format!("unreadable: {}", e)))?
        .len();
    if size != expected_size {
        return Err(mismatch(
            format!("{} bytes", expected_size),
            format!("{} bytes", size),
        ));
    }

    let (actual, _) = hash_file(algorithm, path)
        .map_err(|e| mismatch(expected.to_string(), format!("unreadable: {}", e)))?;
    if !actual.matches(expected) {
        return Err(mismatch(expected.to_string(), actual.value));
    }
    Ok(())
}
