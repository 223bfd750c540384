//! LSH banding over fingerprints.
//!
//! A 64-bit fingerprint is split into `k` equal bands. Blocks that agree on every bit
//! of at least one band land in a shared bucket and become a candidate pair. Two
//! fingerprints within Hamming distance `d < k` always share a band (pigeonhole), so
//! banding never loses a pair the verifier could accept as long as the configured
//! maximum distance stays below the band count.

use std::collections::{BTreeSet, HashMap};

use crate::fingerprint::FINGERPRINT_BITS;

/// Bucket key: (band index, band value)
pub type BucketKey = (u32, u64);

/// Band counts that split 64 bits evenly.
pub const VALID_BAND_COUNTS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];

/// Candidate buckets for one run.
#[derive(Debug)]
pub struct CandidateBuckets {
    buckets: HashMap<BucketKey, Vec<usize>>,
}

impl CandidateBuckets {
    /// Bucket every fingerprint by each of its bands.
    ///
    /// `num_bands` must divide 64; see [`VALID_BAND_COUNTS`].
    pub fn build(fingerprints: &[u64], num_bands: u32) -> Self {
        debug_assert!(VALID_BAND_COUNTS.contains(&num_bands));
        let bits_per_band = FINGERPRINT_BITS / num_bands;
        let mut buckets: HashMap<BucketKey, Vec<usize>> = HashMap::new();

        for (idx, fingerprint) in fingerprints.iter().enumerate() {
            for band in 0..num_bands {
                buckets
                    .entry((band, band_value(*fingerprint, band, bits_per_band)))
                    .or_default()
                    .push(idx);
            }
        }

        Self { buckets }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// All unordered pairs `(i, j)` with `i < j` that share at least one bucket.
    ///
    /// `same_group` excludes pairs the caller never wants compared (same file).
    /// The result is ordered so downstream output is deterministic.
    pub fn candidate_pairs<F>(&self, same_group: F) -> BTreeSet<(usize, usize)>
    where
        F: Fn(usize, usize) -> bool,
    {
        let mut pairs = BTreeSet::new();

        for members in self.buckets.values() {
            if members.len() < 2 {
                continue;
            }
            for (pos, &a) in members.iter().enumerate() {
                for &b in &members[pos + 1..] {
                    let pair = if a < b { (a, b) } else { (b, a) };
                    if !same_group(pair.0, pair.1) {
                        pairs.insert(pair);
                    }
                }
            }
        }

        pairs
    }
}

/// Extract one band of a fingerprint.
pub fn band_value(fingerprint: u64, band: u32, bits_per_band: u32) -> u64 {
    let shift = band * bits_per_band;
    if bits_per_band >= 64 {
        return fingerprint;
    }
    (fingerprint >> shift) & ((1u64 << bits_per_band) - 1)
}
