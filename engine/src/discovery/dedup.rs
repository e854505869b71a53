//! Seen-cycle rejection
//!
//! Two-layer deduplication keyed on canonical cycle keys: a Bloom filter
//! answers most "never seen" lookups without touching the exact set; on a
//! Bloom hit the exact set confirms, absorbing the filter's false positives.
//! False negatives are impossible, so a key reported new really is new.
//!
//! One `SeenCycles` instance lives per discovery run; it is not shared
//! across jobs.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Keys the filter is sized for
pub const BLOOM_CAPACITY: usize = 1_000_000;

/// Hash functions applied per key
pub const BLOOM_HASHES: usize = 20;

/// Bits per expected key for the chosen hash count (k / ln 2, rounded up)
const BLOOM_BITS_PER_KEY: usize = 29;

/// Fixed-size Bloom filter over canonical cycle keys
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    bit_count: u64,
}

impl BloomFilter {
    pub fn new(capacity: usize) -> Self {
        let bit_count = (capacity * BLOOM_BITS_PER_KEY).next_multiple_of(64).max(64);
        Self {
            bits: vec![0u64; bit_count / 64],
            bit_count: bit_count as u64,
        }
    }

    /// Double hashing over the two halves of a SHA-256 digest: index_i =
    /// h1 + i·h2 (mod m)
    fn bit_indexes(&self, key: &str) -> impl Iterator<Item = u64> + '_ {
        let digest = Sha256::digest(key.as_bytes());
        let h1 = u64::from_le_bytes(digest[0..8].try_into().expect("digest is 32 bytes"));
        let h2 = u64::from_le_bytes(digest[8..16].try_into().expect("digest is 32 bytes"));
        let m = self.bit_count;
        (0..BLOOM_HASHES as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2))) % m)
    }

    pub fn insert(&mut self, key: &str) {
        let indexes: Vec<u64> = self.bit_indexes(key).collect();
        for idx in indexes {
            self.bits[(idx / 64) as usize] |= 1 << (idx % 64);
        }
    }

    /// May report false positives, never false negatives
    pub fn might_contain(&self, key: &str) -> bool {
        self.bit_indexes(key)
            .all(|idx| self.bits[(idx / 64) as usize] & (1 << (idx % 64)) != 0)
    }
}

/// Bloom-fronted exact set of canonical cycle keys
#[derive(Debug, Clone)]
pub struct SeenCycles {
    bloom: BloomFilter,
    exact: HashSet<String>,
}

impl SeenCycles {
    pub fn new() -> Self {
        Self::with_capacity(BLOOM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bloom: BloomFilter::new(capacity),
            exact: HashSet::new(),
        }
    }

    /// Record a key. Returns `true` when the key was not seen before.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.bloom.might_contain(key) && self.exact.contains(key) {
            return false;
        }
        self.bloom.insert(key);
        self.exact.insert(key.to_string());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bloom.might_contain(key) && self.exact.contains(key)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

impl Default for SeenCycles {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_is_new_second_is_not() {
        let mut seen = SeenCycles::with_capacity(1024);
        assert!(seen.insert("a:n1|b:n2"));
        assert!(!seen.insert("a:n1|b:n2"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn distinct_keys_stay_distinct() {
        let mut seen = SeenCycles::with_capacity(1024);
        for j in 0..1000 {
            assert!(seen.insert(&format!("a:n{}|b:m{}", j, j)));
        }
        assert_eq!(seen.len(), 1000);
        for j in 0..1000 {
            assert!(seen.contains(&format!("a:n{}|b:m{}", j, j)));
        }
        assert!(!seen.contains("a:n1000|b:m1000"));
    }

    #[test]
    fn bloom_never_reports_false_negative() {
        let mut bloom = BloomFilter::new(256);
        let keys: Vec<String> = (0..200).map(|j| format!("key-{}", j)).collect();
        for key in &keys {
            bloom.insert(key);
        }
        for key in &keys {
            assert!(bloom.might_contain(key));
        }
    }
}
