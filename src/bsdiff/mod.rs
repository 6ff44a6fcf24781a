// src/bsdiff/mod.rs

//! Binary diff/patch codec in the BSDIFF40 format
//!
//! Produces and consumes patches that are byte-compatible with the classic
//! bsdiff 4.x tool, so patches generated elsewhere can be applied here and
//! vice versa.
//!
//! # Format
//!
//! ```text
//! offset  size  field
//! 0       8     "BSDIFF40"
//! 8       8     X = length of bzip2(control)
//! 16      8     Y = length of bzip2(diff)
//! 24      8     length of new file
//! 32      X     bzip2(control): triples (copy_len, extra_len, seek)
//! 32+X    Y     bzip2(diff): new - old, byte-wise mod 256
//! 32+X+Y  ...   bzip2(extra): literal bytes
//! ```
//!
//! Header and control integers are "offtout" encoded: 63-bit little-endian
//! magnitude, sign carried in the top bit of the last byte.
//!
//! # Architecture
//!
//! - **suffix**: qsufsort suffix array plus longest-match search
//! - **create**: greedy match scan producing control/diff/extra blocks
//! - **apply**: decoder walking the control triples
//!
//! Both directions are pure: no I/O beyond the buffers passed in.

mod apply;
mod create;
mod suffix;

pub use apply::{apply, apply_to_writer};
pub use create::create;

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Magic bytes at the start of every patch
pub const BSDIFF_MAGIC: [u8; 8] = *b"BSDIFF40";

/// Size of the fixed header
pub const HEADER_SIZE: usize = 32;

/// Encode a signed integer in bsdiff's sign-magnitude layout
pub fn encode_offset(value: i64) -> [u8; 8] {
    let mut buf = value.unsigned_abs().to_le_bytes();
    if value < 0 {
        buf[7] |= 0x80;
    }
    buf
}

/// Decode a sign-magnitude integer written by [`encode_offset`]
pub fn decode_offset(buf: &[u8; 8]) -> i64 {
    let mut raw = *buf;
    let negative = raw[7] & 0x80 != 0;
    raw[7] &= 0x7F;
    let magnitude = i64::from_le_bytes(raw);
    if negative { -magnitude } else { magnitude }
}

/// Parsed patch header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchHeader {
    pub control_len: i64,
    pub diff_len: i64,
    pub new_size: i64,
}

impl PatchHeader {
    /// Parse and validate the 32-byte header at the start of `patch`
    pub fn parse(patch: &[u8]) -> Result<Self> {
        if patch.len() < HEADER_SIZE {
            return Err(Error::CorruptPatch(format!(
                "patch is {} bytes, shorter than the {}-byte header",
                patch.len(),
                HEADER_SIZE
            )));
        }
        if patch[..8] != BSDIFF_MAGIC {
            return Err(Error::CorruptPatch("bad magic".to_string()));
        }

        let field = |offset: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&patch[offset..offset + 8]);
            decode_offset(&raw)
        };
        let header = Self {
            control_len: field(8),
            diff_len: field(16),
            new_size: field(24),
        };

        if header.control_len < 0 || header.diff_len < 0 || header.new_size < 0 {
            return Err(Error::CorruptPatch(format!(
                "negative header lengths ({}, {}, {})",
                header.control_len, header.diff_len, header.new_size
            )));
        }

        let body = (patch.len() - HEADER_SIZE) as i64;
        if header.control_len > body || header.diff_len > body - header.control_len {
            return Err(Error::CorruptPatch(format!(
                "segment lengths ({} + {}) exceed patch body of {} bytes",
                header.control_len, header.diff_len, body
            )));
        }

        Ok(header)
    }
}

/// Diff two files on disk, writing the patch to `patch_path`
pub fn create_file(old_path: &Path, new_path: &Path, patch_path: &Path) -> Result<u64> {
    let old = fs::read(old_path)?;
    let new = fs::read(new_path)?;
    let patch = create(&old, &new)?;
    fs::write(patch_path, &patch)?;
    Ok(patch.len() as u64)
}

/// Apply the patch at `patch_path` to `old_path`, writing `out_path`
pub fn apply_file(old_path: &Path, patch_path: &Path, out_path: &Path) -> Result<u64> {
    let old = fs::read(old_path)?;
    let patch = fs::read(patch_path)?;
    let mut out = fs::File::create(out_path)?;
    let written = apply_to_writer(&old, &patch, &mut out)?;
    out.sync_all()?;
    Ok(written)
}
