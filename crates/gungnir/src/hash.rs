//! Hashing utilities.

use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::Xxh3Default;

/// Default hashing function used to route tuples across tasks.
///
/// The hasher is unseeded, so the result is stable across processes and
/// restarts of the same build.
pub fn default_hash<T: Hash + ?Sized>(x: &T) -> u64 {
    let mut hasher = Xxh3Default::new();
    x.hash(&mut hasher);
    hasher.finish()
}

/// Shift-xor-add bit mixing applied to a 32-bit hash so that keys differing
/// only in a few low bits still spread across buckets.
pub fn avalanche(hash: u32) -> u32 {
    let mut h = hash;
    h = h.wrapping_add(!(h << 9));
    h ^= h >> 14;
    h = h.wrapping_add(h << 4);
    h ^= h >> 10;
    h
}

/// Maps `key` to a bucket in `0..buckets`.
///
/// The same key always maps to the same bucket for a given bucket count.
///
/// # Panics
///
/// Panics if `buckets` is zero.
pub fn hash_index<T: Hash + ?Sized>(key: &T, buckets: usize) -> usize {
    assert!(buckets > 0, "hash_index called with zero buckets");
    let hash = default_hash(key);
    let folded = (hash ^ (hash >> 32)) as u32;
    let mixed = avalanche(folded) as i32;
    mixed.unsigned_abs() as usize % buckets
}

#[cfg(test)]
mod test {
    use super::{avalanche, hash_index};
    use proptest::prelude::*;

    #[test]
    fn avalanche_spreads_adjacent_values() {
        let mixed: Vec<u32> = (0..4).map(avalanche).collect();
        for (i, a) in mixed.iter().enumerate() {
            for b in &mixed[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn single_bucket() {
        assert_eq!(hash_index("anything", 1), 0);
    }

    proptest! {
        #[test]
        fn index_in_range_and_stable(key in any::<Vec<i64>>(), buckets in 1usize..64) {
            let first = hash_index(&key, buckets);
            prop_assert!(first < buckets);
            prop_assert_eq!(first, hash_index(&key.clone(), buckets));
        }
    }
}
