// src/bsdiff/apply.rs

//! Patch application
//!
//! The three segments are decompressed through independent readers over the
//! same patch buffer and consumed in lockstep while walking the control
//! triples.

use super::{decode_offset, PatchHeader, HEADER_SIZE};
use crate::error::{Error, Result};
use bzip2::read::BzDecoder;
use std::io::{Read, Write};

/// Buffer size for streaming diff and extra bytes
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Upper bound on output preallocation
const PREALLOC_LIMIT: usize = 64 * 1024 * 1024;

/// Apply `patch` to `old`, returning the reconstructed file
pub fn apply(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let header = PatchHeader::parse(patch)?;
    // Header sizes are untrusted until the triples have been walked
    let mut out = Vec::with_capacity((header.new_size as usize).min(PREALLOC_LIMIT));
    apply_to_writer(old, patch, &mut out)?;
    Ok(out)
}

/// Apply `patch` to `old`, streaming the result into `out`
pub fn apply_to_writer<W: Write>(old: &[u8], patch: &[u8], out: &mut W) -> Result<u64> {
    let header = PatchHeader::parse(patch)?;

    let control_start = HEADER_SIZE;
    let diff_start = control_start + header.control_len as usize;
    let extra_start = diff_start + header.diff_len as usize;
    if extra_start > patch.len() {
        return Err(Error::CorruptPatch(format!(
            "segments extend past end of patch ({} > {} bytes)",
            extra_start,
            patch.len()
        )));
    }

    let mut control = BzDecoder::new(&patch[control_start..diff_start]);
    let mut diff = BzDecoder::new(&patch[diff_start..extra_start]);
    let mut extra = BzDecoder::new(&patch[extra_start..]);

    let new_size = header.new_size;
    let old_len = old.len() as i64;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE.min(new_size.max(1) as usize)];
    let mut old_pos: i64 = 0;
    let mut new_pos: i64 = 0;

    while new_pos < new_size {
        let mut triple = [0i64; 3];
        for value in triple.iter_mut() {
            let mut raw = [0u8; 8];
            read_segment(&mut control, &mut raw, "control")?;
            *value = decode_offset(&raw);
        }
        let [copy_len, extra_len, seek] = triple;

        if copy_len < 0 || extra_len < 0 {
            return Err(Error::CorruptPatch(format!(
                "negative control lengths ({}, {})",
                copy_len, extra_len
            )));
        }
        if copy_len > new_size - new_pos {
            return Err(Error::CorruptPatch(format!(
                "copy of {} bytes at {} exceeds declared size {}",
                copy_len, new_pos, new_size
            )));
        }

        let mut remaining = copy_len;
        while remaining > 0 {
            let chunk = remaining.min(buffer.len() as i64) as usize;
            read_segment(&mut diff, &mut buffer[..chunk], "diff")?;
            for (i, byte) in buffer[..chunk].iter_mut().enumerate() {
                if let Some(src) = old_pos.checked_add(i as i64)
                    && src >= 0
                    && src < old_len
                {
                    *byte = byte.wrapping_add(old[src as usize]);
                }
            }
            out.write_all(&buffer[..chunk])?;
            old_pos = advance(old_pos, chunk as i64)?;
            new_pos += chunk as i64;
            remaining -= chunk as i64;
        }

        if extra_len > new_size - new_pos {
            return Err(Error::CorruptPatch(format!(
                "extra of {} bytes at {} exceeds declared size {}",
                extra_len, new_pos, new_size
            )));
        }

        let mut remaining = extra_len;
        while remaining > 0 {
            let chunk = remaining.min(buffer.len() as i64) as usize;
            read_segment(&mut extra, &mut buffer[..chunk], "extra")?;
            out.write_all(&buffer[..chunk])?;
            new_pos += chunk as i64;
            remaining -= chunk as i64;
        }

        old_pos = advance(old_pos, seek)?;
    }

    Ok(new_pos as u64)
}

/// Move the old-file cursor; a patch that overflows it is corrupt
fn advance(pos: i64, by: i64) -> Result<i64> {
    pos.checked_add(by).ok_or_else(|| {
        Error::CorruptPatch(format!("old file offset {} + {} overflows", pos, by))
    })
}

fn read_segment<R: Read>(reader: &mut R, buf: &mut [u8], segment: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        Error::CorruptPatch(format!("{} segment truncated or unreadable: {}", segment, e))
    })
}
