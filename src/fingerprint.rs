//! SimHash fingerprints for content blocks.

use ahash::RandomState;

/// Width of a fingerprint in bits.
pub const FINGERPRINT_BITS: u32 = 64;

// Fixed seeds so a block fingerprints the same way in every run
const SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Computes fingerprints for block text.
///
/// Each lower-cased whitespace token is hashed to 64 bits; every bit position keeps
/// a running counter that goes up for a 1 bit and down for a 0 bit. The final
/// fingerprint has bit `i` set when counter `i` is non-negative.
#[derive(Clone)]
pub struct Fingerprinter {
    hasher: RandomState,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter {
    pub fn new() -> Self {
        let (k0, k1, k2, k3) = SEEDS;
        Self {
            hasher: RandomState::with_seeds(k0, k1, k2, k3),
        }
    }

    /// Compute simhash fingerprint for text. An empty token sequence yields 0.
    pub fn fingerprint(&self, text: &str) -> u64 {
        let mut counters = [0i32; FINGERPRINT_BITS as usize];
        let mut seen_token = false;

        for token in text.split_whitespace() {
            seen_token = true;
            let h = self.hash_token(&token.to_lowercase());

            for (i, counter) in counters.iter_mut().enumerate() {
                if (h >> i) & 1 == 1 {
                    *counter += 1;
                } else {
                    *counter -= 1;
                }
            }
        }

        if !seen_token {
            return 0;
        }

        let mut fingerprint: u64 = 0;
        for (i, counter) in counters.iter().enumerate() {
            if *counter >= 0 {
                fingerprint |= 1 << i;
            }
        }

        fingerprint
    }

    fn hash_token(&self, token: &str) -> u64 {
        self.hasher.hash_one(token)
    }
}

/// Count differing bits between two fingerprints (Hamming distance)
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
