//! Key/index pairs and the two CPU sort paths.
//!
//! The radix path walks the key in 8-bit digits from least significant to
//! most significant, the same digit order the GPU compute sort uses.

use bytemuck::{Pod, Zeroable};

const RADIX_BITS: u32 = 8;
const RADIX_BUCKETS: usize = 1 << RADIX_BITS;
const RADIX_PASSES: usize = (u32::BITS / RADIX_BITS) as usize;

/// One sortable instance: encoded key plus original buffer index.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SortEntry {
    /// Order-preserving encoded key.
    pub key: u32,
    /// Instance index in the source buffer.
    pub index: u32,
}

impl SortEntry {
    /// Creates an entry.
    #[inline]
    #[must_use]
    pub const fn new(key: u32, index: u32) -> Self {
        Self { key, index }
    }
}

/// Sorts by key with the standard library's unstable sort.
pub fn comparison_sort(entries: &mut [SortEntry]) {
    entries.sort_unstable_by_key(|entry| entry.key);
}

/// Sorts by key with a least-significant-digit radix sort.
///
/// Passes where every key shares the same digit are skipped.
pub fn radix_sort(entries: &mut [SortEntry]) {
    let len = entries.len();
    if len < 2 {
        return;
    }

    let mut histograms = [[0usize; RADIX_BUCKETS]; RADIX_PASSES];
    for entry in entries.iter() {
        for (pass, histogram) in histograms.iter_mut().enumerate() {
            histogram[digit(entry.key, pass)] += 1;
        }
    }

    let mut scratch = vec![SortEntry::default(); len];
    let mut in_scratch = false;

    for (pass, histogram) in histograms.iter().enumerate() {
        if histogram.iter().any(|&count| count == len) {
            continue;
        }

        let mut offsets = [0usize; RADIX_BUCKETS];
        let mut total = 0;
        for (offset, &count) in offsets.iter_mut().zip(histogram.iter()) {
            *offset = total;
            total += count;
        }

        let (src, dst) = if in_scratch {
            (&scratch[..], &mut entries[..])
        } else {
            (&entries[..], &mut scratch[..])
        };
        for entry in src {
            let bucket = digit(entry.key, pass);
            dst[offsets[bucket]] = *entry;
            offsets[bucket] += 1;
        }
        in_scratch = !in_scratch;
    }

    if in_scratch {
        entries.copy_from_slice(&scratch);
    }
}

#[inline]
fn digit(key: u32, pass: usize) -> usize {
    ((key >> (pass as u32 * RADIX_BITS)) as usize) & (RADIX_BUCKETS - 1)
}
