//! Faster (but not DoS-resistant) hashmaps for the aggregators
use farmhash;
use hash_hasher::HashBuildHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher, BuildHasherDefault};

/// Chain farmhash over every write
///
/// farmhash isn't a streaming hash, so each write is hashed with the previous result as the
/// seed. `str` writes its bytes and then a 0xff terminator, so a plain "last write wins" hash
/// would put every label in one bucket.
pub struct FarmChain (u64);

impl Default for FarmChain {
    #[inline]
    fn default() -> FarmChain { FarmChain(0) }
}

impl Hasher for FarmChain {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.0 = farmhash::hash64_with_seed(bytes, self.0);
    }
}

pub type Farm = BuildHasherDefault<FarmChain>;
pub type FarmMap<X, Y> = HashMap<X, Y, Farm>;

pub fn new_farm<X: Hash+Eq, Y>() -> FarmMap<X, Y> {
    Default::default()
}

/// For keys that are already well mixed, like packed pairs of node indices
pub type PlainSet<X> = HashSet<X, HashBuildHasher>;

/// Pack an unordered pair of indices into one key, smaller index first
///
/// Both indices must fit in 32 bits.
#[inline]
pub fn pair_key(a: usize, b: usize) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    debug_assert!(hi as u64 <= u32::max_value() as u64, "node index {} does not fit in a pair key", hi);
    ((lo as u64) << 32) | (hi as u64 & 0xffff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_land_in_different_buckets() {
        let mut a = FarmChain::default();
        "fox".hash(&mut a);
        let mut b = FarmChain::default();
        "wolf".hash(&mut b);
        assert!(a.finish() != b.finish());
    }

    #[test]
    fn pair_key_is_unordered() {
        assert_eq!(pair_key(3, 7), pair_key(7, 3));
        assert!(pair_key(3, 7) != pair_key(3, 8));
    }

    #[test]
    #[cfg(all(debug_assertions, target_pointer_width = "64"))]
    #[should_panic(expected = "does not fit in a pair key")]
    fn pair_key_rejects_wide_indices() {
        pair_key(1, (u32::max_value() as usize).wrapping_add(1));
    }

    #[test]
    fn farm_map_round_trips() {
        let mut m: FarmMap<String, usize> = new_farm();
        m.insert("fox".to_string(), 1);
        m.insert("wolf".to_string(), 2);
        assert_eq!(m.get("fox"), Some(&1));
        assert_eq!(m.get("wolf"), Some(&2));
    }
}
