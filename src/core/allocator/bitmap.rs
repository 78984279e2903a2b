//! Concurrent bitmap allocator for block slots
//!
//! One bit per slot:
//! - 0 = vacant slot
//! - 1 = occupied slot
//!
//! Bits are stored in `AtomicU32` words. Bit `i` always lives in word `i / 32`
//! at position `1 << (i % 32)`, independent of host byte order.
//!
//! Toggling a bit with [`BitMap::set`] is lock-free (CAS loop on the containing
//! word). Claiming a new slot with [`BitMap::find_vacant_and_set`] is serialized
//! by the scan lock, so two callers can never claim the same bit.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

const WORD_BITS: usize = 32;

/// Concurrent bit-vector tracking occupied slots
#[derive(Debug)]
pub struct BitMap {
    /// Bitmap words (each word = 32 slots)
    words: Box<[AtomicU32]>,

    /// Number of addressable bits
    capacity: usize,

    /// Lowest bit index that may be vacant. Lowered by `set(i, false)`,
    /// raised only by a scan. Equals `capacity` once the scan found nothing.
    ///
    /// The mutex doubles as the scan lock for `find_vacant_and_set`.
    hint: Mutex<usize>,
}

impl BitMap {
    /// Create a bitmap with `capacity` vacant bits
    pub fn new(capacity: usize) -> Self {
        let num_words = capacity.div_ceil(WORD_BITS);
        let words = (0..num_words).map(|_| AtomicU32::new(0)).collect();

        BitMap {
            words,
            capacity,
            hint: Mutex::new(0),
        }
    }

    #[inline]
    fn locate(i: usize) -> (usize, u32) {
        (i / WORD_BITS, 1u32 << (i % WORD_BITS))
    }

    /// Read bit `i`
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.capacity, "bit {} out of range", i);
        let (word, mask) = Self::locate(i);
        self.words[word].load(Ordering::Acquire) & mask != 0
    }

    /// Set bit `i` to `value` without taking the scan lock
    ///
    /// Returns `true` if the bit changed. Clearing a bit lowers the scan hint
    /// so the next claim starts no later than `i`.
    pub fn set(&self, i: usize, value: bool) -> bool {
        debug_assert!(i < self.capacity, "bit {} out of range", i);
        let (word, mask) = Self::locate(i);
        let cell = &self.words[word];

        let mut old = cell.load(Ordering::Acquire);
        loop {
            let new = if value { old | mask } else { old & !mask };
            if new == old {
                return false;
            }

            match cell.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(current) => old = current,
            }
        }

        if !value {
            let mut hint = self.hint.lock();
            if i < *hint {
                *hint = i;
            }
        }

        true
    }

    /// Claim the lowest vacant bit at or after the scan hint
    ///
    /// Returns the claimed index, or `None` when no vacant bit exists. The bit
    /// is set before the scan lock is released.
    pub fn find_vacant_and_set(&self) -> Option<usize> {
        let mut hint = self.hint.lock();

        let mut word_idx = *hint / WORD_BITS;
        while word_idx < self.words.len() {
            let cell = &self.words[word_idx];
            let current = cell.load(Ordering::Acquire);
            if current == u32::MAX {
                word_idx += 1;
                continue;
            }

            let bit = (!current).trailing_zeros() as usize;
            let index = word_idx * WORD_BITS + bit;
            if index >= self.capacity {
                // Only padding bits remain in the last word
                break;
            }

            let mask = 1u32 << bit;
            let previous = cell.fetch_or(mask, Ordering::AcqRel);
            if previous & mask != 0 {
                // A lock-free set() took this bit between load and claim
                continue;
            }

            *hint = index;
            return Some(index);
        }

        *hint = self.capacity;
        None
    }

    /// Number of addressable bits
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count occupied bits
    ///
    /// Not a snapshot: concurrent toggles may or may not be counted.
    pub fn count_occupied(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Current scan hint (`capacity` when the last scan found nothing)
    pub fn lowest_vacant_hint(&self) -> usize {
        *self.hint.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_bitmap_creation() {
        let map = BitMap::new(1000);
        assert_eq!(map.capacity(), 1000);
        assert_eq!(map.count_occupied(), 0);
        assert_eq!(map.lowest_vacant_hint(), 0);
    }

    #[test]
    fn test_bitmap_get_set() {
        let map = BitMap::new(511);

        for i in 0..511 {
            assert!(!map.get(i), "bit {} should not be set initially", i);
        }

        // set 0, 2, 4, ..., 254
        for i in 0..128 {
            map.set(i * 2, true);
        }

        for i in 0..511 {
            let expected = i < 256 && i % 2 == 0;
            assert_eq!(map.get(i), expected, "bit {}", i);
        }
    }

    #[test]
    fn test_set_is_idempotent() {
        let map = BitMap::new(64);

        assert!(map.set(33, true));
        assert!(!map.set(33, true));
        assert!(map.get(33));
        assert!(!map.get(32));
        assert!(!map.get(34));

        assert!(map.set(33, false));
        assert!(!map.set(33, false));
        assert!(!map.get(33));
        assert_eq!(map.count_occupied(), 0);
    }

    #[test]
    fn test_find_vacant_scenario() {
        let map = BitMap::new(32);

        for i in [1, 2, 7, 31] {
            map.set(i, true);
        }

        assert_eq!(map.find_vacant_and_set(), Some(0));
        assert!(map.get(0));

        assert_eq!(map.find_vacant_and_set(), Some(3));
        assert!(map.get(3));

        for i in 4..7 {
            map.set(i, true);
        }
        map.set(9, true);

        assert_eq!(map.find_vacant_and_set(), Some(8));
        assert!(map.get(8));

        for i in 10..31 {
            map.set(i, true);
        }

        assert_eq!(map.find_vacant_and_set(), None);
        assert_eq!(map.lowest_vacant_hint(), 32);
    }

    #[test]
    fn test_sequential_claims_then_exhaustion() {
        let map = BitMap::new(100);

        for expected in 0..100 {
            assert_eq!(map.find_vacant_and_set(), Some(expected));
        }
        assert_eq!(map.find_vacant_and_set(), None);
        assert_eq!(map.count_occupied(), 100);
    }

    #[test]
    fn test_padding_bits_never_claimed() {
        // 33 bits -> 2 words, 31 padding bits in the second word
        let map = BitMap::new(33);
        for _ in 0..33 {
            assert!(map.find_vacant_and_set().is_some());
        }
        assert_eq!(map.find_vacant_and_set(), None);
    }

    #[test]
    fn test_clear_lowers_hint() {
        let map = BitMap::new(64);
        for _ in 0..64 {
            map.find_vacant_and_set();
        }
        assert_eq!(map.find_vacant_and_set(), None);
        assert_eq!(map.lowest_vacant_hint(), 64);

        map.set(40, false);
        assert_eq!(map.lowest_vacant_hint(), 40);

        map.set(50, false);
        assert_eq!(map.lowest_vacant_hint(), 40);

        assert_eq!(map.find_vacant_and_set(), Some(40));
        assert_eq!(map.find_vacant_and_set(), Some(50));
        assert_eq!(map.find_vacant_and_set(), None);
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let map = Arc::new(BitMap::new(4096));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = Arc::clone(&map);
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    for _ in 0..512 {
                        claimed.push(map.find_vacant_and_set().unwrap());
                    }
                    claimed
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for index in h.join().unwrap() {
                assert!(seen.insert(index), "bit {} claimed twice", index);
            }
        }

        assert_eq!(seen.len(), 4096);
        assert_eq!(map.find_vacant_and_set(), None);
    }

    #[test]
    fn test_concurrent_set_on_shared_word() {
        let map = Arc::new(BitMap::new(32));

        // Every thread toggles its own bits inside the same word
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let map = Arc::clone(&map);
                std::thread::spawn(move || {
                    for round in 0..1000 {
                        for bit in (t * 8)..(t * 8 + 8) {
                            map.set(bit, round % 2 == 0);
                        }
                    }
                    for bit in (t * 8)..(t * 8 + 8) {
                        map.set(bit, true);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(map.count_occupied(), 32);
    }
}
