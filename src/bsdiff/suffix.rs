// src/bsdiff/suffix.rs

//! Suffix sorting (qsufsort) and longest-match search
//!
//! Larsson-Sadakane suffix sorting as used by bsdiff: an initial bucket sort
//! on the first byte followed by prefix-doubling refinement. Unsorted groups
//! are split with a ternary partition. The partition recursion is replaced
//! by an explicit work stack so that multi-megabyte inputs cannot overflow
//! the thread stack; tasks are popped in the same order the recursive form
//! would visit them, so the resulting array is identical.
//!
//! Conventions: `index` holds suffix start positions, with sorted groups
//! encoded as negative run lengths during sorting. `group` holds, for each
//! suffix, the index of the last slot of its current group. The empty suffix
//! at position `old.len()` always sorts first.

/// Work item for the iterative split
enum SplitTask {
    /// Sort `index[start..start + len]` by the key at offset `h`
    Split { start: usize, len: usize },
    /// Assign the group number to the equal-key partition `jj..kk`
    Finish { jj: usize, kk: usize },
}

/// Build the suffix array of `old` (length `old.len() + 1`, entry 0 is the
/// empty suffix).
pub fn suffix_sort(old: &[u8]) -> Vec<i64> {
    let n = old.len();
    let mut buckets = [0usize; 256];

    for &b in old {
        buckets[b as usize] += 1;
    }
    for i in 1..256 {
        buckets[i] += buckets[i - 1];
    }
    for i in (1..256).rev() {
        buckets[i] = buckets[i - 1];
    }
    buckets[0] = 0;

    let mut index = vec![0i64; n + 1];
    for (i, &b) in old.iter().enumerate() {
        buckets[b as usize] += 1;
        index[buckets[b as usize]] = i as i64;
    }

    let mut group = vec![0i64; n + 1];
    for (i, &b) in old.iter().enumerate() {
        group[i] = buckets[b as usize] as i64;
    }

    for i in 1..256 {
        if buckets[i] == buckets[i - 1] + 1 {
            index[buckets[i]] = -1;
        }
    }
    index[0] = -1;

    let mut h = 1usize;
    while index[0] != -((n as i64) + 1) {
        let mut len: i64 = 0;
        let mut i: usize = 0;
        while i < n + 1 {
            if index[i] < 0 {
                // Skip a run of already-sorted suffixes
                len -= index[i];
                i = (i as i64 - index[i]) as usize;
            } else {
                if len != 0 {
                    index[i - len as usize] = -len;
                }
                let group_len = (group[index[i] as usize] + 1 - i as i64) as usize;
                split(&mut index, &mut group, i, group_len, h);
                i += group_len;
                len = 0;
            }
        }
        if len != 0 {
            index[i - len as usize] = -len;
        }
        h += h;
    }

    for i in 0..=n {
        index[group[i] as usize] = i as i64;
    }
    index
}

#[inline]
fn key(index: &[i64], group: &[i64], slot: usize, h: usize) -> i64 {
    group[index[slot] as usize + h]
}

fn split(index: &mut [i64], group: &mut [i64], start: usize, len: usize, h: usize) {
    let mut stack = vec![SplitTask::Split { start, len }];

    while let Some(task) = stack.pop() {
        match task {
            SplitTask::Split { start, len } if len < 16 => {
                split_small(index, group, start, len, h);
            }
            SplitTask::Split { start, len } => {
                let pivot = key(index, group, start + len / 2, h);

                let mut jj = 0usize;
                let mut kk = 0usize;
                for slot in start..start + len {
                    let k = key(index, group, slot, h);
                    if k < pivot {
                        jj += 1;
                    }
                    if k == pivot {
                        kk += 1;
                    }
                }
                jj += start;
                kk += jj;

                let mut i = start;
                let mut j = 0usize;
                let mut k = 0usize;
                while i < jj {
                    let v = key(index, group, i, h);
                    if v < pivot {
                        i += 1;
                    } else if v == pivot {
                        index.swap(i, jj + j);
                        j += 1;
                    } else {
                        index.swap(i, kk + k);
                        k += 1;
                    }
                }
                while jj + j < kk {
                    if key(index, group, jj + j, h) == pivot {
                        j += 1;
                    } else {
                        index.swap(jj + j, kk + k);
                        k += 1;
                    }
                }

                // LIFO: left partition, then the pivot group, then the right
                if start + len > kk {
                    stack.push(SplitTask::Split {
                        start: kk,
                        len: start + len - kk,
                    });
                }
                stack.push(SplitTask::Finish { jj, kk });
                if jj > start {
                    stack.push(SplitTask::Split {
                        start,
                        len: jj - start,
                    });
                }
            }
            SplitTask::Finish { jj, kk } => {
                for slot in jj..kk {
                    group[index[slot] as usize] = (kk - 1) as i64;
                }
                if jj == kk - 1 {
                    index[jj] = -1;
                }
            }
        }
    }
}

/// Selection sort for short groups
fn split_small(index: &mut [i64], group: &mut [i64], start: usize, len: usize, h: usize) {
    let end = start + len;
    let mut k = start;
    while k < end {
        let mut j = 1usize;
        let mut x = key(index, group, k, h);
        let mut i = 1usize;
        while k + i < end {
            let v = key(index, group, k + i, h);
            if v < x {
                x = v;
                j = 0;
            }
            if key(index, group, k + i, h) == x {
                index.swap(k + j, k + i);
                j += 1;
            }
            i += 1;
        }
        for slot in k..k + j {
            group[index[slot] as usize] = (k + j - 1) as i64;
        }
        if j == 1 {
            index[k] = -1;
        }
        k += j;
    }
}

/// Length of the common prefix of `old[old_off..]` and `new[new_off..]`
#[inline]
pub fn match_len(old: &[u8], old_off: usize, new: &[u8], new_off: usize) -> usize {
    old[old_off..]
        .iter()
        .zip(&new[new_off..])
        .take_while(|(a, b)| a == b)
        .count()
}

/// Compare the suffix of `old` at `old_off` with `new[new_off..]` over
/// their common length only; a proper prefix compares equal.
#[inline]
fn compare_bytes(old: &[u8], old_off: usize, new: &[u8], new_off: usize) -> std::cmp::Ordering {
    for (a, b) in old[old_off..].iter().zip(&new[new_off..]) {
        if a != b {
            return a.cmp(b);
        }
    }
    std::cmp::Ordering::Equal
}

/// Binary search the suffix array for the longest match of `new[new_off..]`.
///
/// Returns `(match_length, position_in_old)`.
pub fn search(sa: &[i64], old: &[u8], new: &[u8], new_off: usize) -> (usize, usize) {
    let mut start = 0usize;
    let mut end = old.len();

    while end - start >= 2 {
        let mid = start + (end - start) / 2;
        if compare_bytes(old, sa[mid] as usize, new, new_off) == std::cmp::Ordering::Less {
            start = mid;
        } else {
            end = mid;
        }
    }

    let start_pos = sa[start] as usize;
    let end_pos = sa[end] as usize;
    let start_len = match_len(old, start_pos, new, new_off);
    let end_len = match_len(old, end_pos, new, new_off);

    if start_len > end_len {
        (start_len, start_pos)
    } else {
        (end_len, end_pos)
    }
}
