//! Edge-deletion bitmap.
//!
//! One bit per edge of a block. Bits are set concurrently by the mutate
//! map's tasks; each bit is written by exactly one task, but neighbouring
//! bits of one word may belong to different sub-blocks, so words are
//! atomic.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct Bitmap {
    words: Box<[AtomicU64]>,
    bits: u64,
}

impl Bitmap {
    pub fn new(bits: u64) -> Self {
        let words = (bits as usize + 63) / 64;
        Bitmap {
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
            bits,
        }
    }

    pub fn len(&self) -> u64 {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn set(&self, i: u64) {
        debug_assert!(i < self.bits);
        self.words[(i / 64) as usize].fetch_or(1 << (i % 64), Ordering::Relaxed);
    }

    pub fn get(&self, i: u64) -> bool {
        debug_assert!(i < self.bits);
        self.words[(i / 64) as usize].load(Ordering::Relaxed) & (1 << (i % 64)) != 0
    }

    pub fn count(&self) -> u64 {
        self.words
            .iter()
            .map(|w| u64::from(w.load(Ordering::Relaxed).count_ones()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_count() {
        let b = Bitmap::new(130);
        assert_eq!(b.len(), 130);
        assert_eq!(b.count(), 0);
        b.set(0);
        b.set(63);
        b.set(64);
        b.set(129);
        assert!(b.get(0) && b.get(63) && b.get(64) && b.get(129));
        assert!(!b.get(1) && !b.get(128));
        assert_eq!(b.count(), 4);
    }

    #[test]
    fn concurrent_sets_in_one_word() {
        let b = std::sync::Arc::new(Bitmap::new(64));
        let mut handles = Vec::new();
        for t in 0..4 {
            let b = b.clone();
            handles.push(std::thread::spawn(move || {
                for i in (t..64).step_by(4) {
                    b.set(i as u64);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.count(), 64);
    }
}
