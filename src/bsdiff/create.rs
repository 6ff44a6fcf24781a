// src/bsdiff/create.rs

//! Patch generation
//!
//! Greedy scan of the new file against the suffix array of the old one.
//! A match is extended while it is an exact continuation of the previous
//! alignment, and cut when a candidate is found that beats that alignment
//! by more than eight bytes. At each cut the boundary between the previous
//! approximate match and the next one is placed where it maximizes matching
//! bytes, and one control triple is emitted.

use super::suffix::{search, suffix_sort};
use super::{encode_offset, BSDIFF_MAGIC, HEADER_SIZE};
use crate::error::Result;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::io::Write;
use tracing::debug;

/// Create a patch turning `old` into `new`
pub fn create(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    let sa = suffix_sort(old);

    let old_len = old.len() as i64;
    let new_len = new.len() as i64;

    let mut diff_block: Vec<u8> = Vec::with_capacity(new.len());
    let mut extra_block: Vec<u8> = Vec::new();
    let mut control = BzEncoder::new(Vec::new(), Compression::best());
    let mut triples = 0usize;

    let mut scan: i64 = 0;
    let mut len: i64 = 0;
    let mut pos: i64 = 0;
    let mut last_scan: i64 = 0;
    let mut last_pos: i64 = 0;
    let mut last_offset: i64 = 0;

    let old_at = |i: i64| old[i as usize];
    let new_at = |i: i64| new[i as usize];

    while scan < new_len {
        let mut old_score: i64 = 0;
        scan += len;
        let mut scsc = scan;

        while scan < new_len {
            let (match_len, match_pos) = search(&sa, old, new, scan as usize);
            len = match_len as i64;
            pos = match_pos as i64;

            while scsc < scan + len {
                if scsc + last_offset < old_len && old_at(scsc + last_offset) == new_at(scsc) {
                    old_score += 1;
                }
                scsc += 1;
            }

            if (len == old_score && len != 0) || len > old_score + 8 {
                break;
            }

            if scan + last_offset < old_len && old_at(scan + last_offset) == new_at(scan) {
                old_score -= 1;
            }
            scan += 1;
        }

        if len != old_score || scan == new_len {
            // Forward extension of the previous match
            let mut s: i64 = 0;
            let mut sf: i64 = 0;
            let mut lenf: i64 = 0;
            let mut i: i64 = 0;
            while last_scan + i < scan && last_pos + i < old_len {
                if old_at(last_pos + i) == new_at(last_scan + i) {
                    s += 1;
                }
                i += 1;
                if s * 2 - i > sf * 2 - lenf {
                    sf = s;
                    lenf = i;
                }
            }

            // Backward extension of the next match
            let mut lenb: i64 = 0;
            if scan < new_len {
                let mut s: i64 = 0;
                let mut sb: i64 = 0;
                let mut i: i64 = 1;
                while scan >= last_scan + i && pos >= i {
                    if old_at(pos - i) == new_at(scan - i) {
                        s += 1;
                    }
                    if s * 2 - i > sb * 2 - lenb {
                        sb = s;
                        lenb = i;
                    }
                    i += 1;
                }
            }

            // Resolve overlap between the two extensions
            if last_scan + lenf > scan - lenb {
                let overlap = (last_scan + lenf) - (scan - lenb);
                let mut s: i64 = 0;
                let mut ss: i64 = 0;
                let mut lens: i64 = 0;
                for i in 0..overlap {
                    if new_at(last_scan + lenf - overlap + i) == old_at(last_pos + lenf - overlap + i) {
                        s += 1;
                    }
                    if new_at(scan - lenb + i) == old_at(pos - lenb + i) {
                        s -= 1;
                    }
                    if s > ss {
                        ss = s;
                        lens = i + 1;
                    }
                }
                lenf += lens - overlap;
                lenb -= lens;
            }

            for i in 0..lenf {
                diff_block.push(new_at(last_scan + i).wrapping_sub(old_at(last_pos + i)));
            }
            let extra_len = (scan - lenb) - (last_scan + lenf);
            for i in 0..extra_len {
                extra_block.push(new_at(last_scan + lenf + i));
            }

            let seek = (pos - lenb) - (last_pos + lenf);
            control.write_all(&encode_offset(lenf))?;
            control.write_all(&encode_offset(extra_len))?;
            control.write_all(&encode_offset(seek))?;
            triples += 1;

            last_scan = scan - lenb;
            last_pos = pos - lenb;
            last_offset = pos - scan;
        }
    }

    let control = control.finish()?;
    let diff = compress(&diff_block)?;
    let extra = compress(&extra_block)?;

    debug!(
        "bsdiff: {} triples, control {} / diff {} / extra {} compressed bytes",
        triples,
        control.len(),
        diff.len(),
        extra.len()
    );

    let mut patch = Vec::with_capacity(HEADER_SIZE + control.len() + diff.len() + extra.len());
    patch.extend_from_slice(&BSDIFF_MAGIC);
    patch.extend_from_slice(&encode_offset(control.len() as i64));
    patch.extend_from_slice(&encode_offset(diff.len() as i64));
    patch.extend_from_slice(&encode_offset(new_len));
    patch.extend_from_slice(&control);
    patch.extend_from_slice(&diff);
    patch.extend_from_slice(&extra);

    Ok(patch)
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
