//! A fixed-size allocation bitmap backed by a byte `Vec`.
//!
//! Each bit tracks one slot: set means allocated, clear means free. Bit `i`
//! lives in byte `i / 8` at position `i % 8`, so the byte image matches the
//! classic kernel layout and can be copied wholesale between owners.
//!
//! The storage is allocated once and never resized. Cloning a bitmap copies
//! the bytes, giving the clone independent storage.

#![no_std]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

/// A fixed-capacity allocation bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
}

impl Bitmap {
    /// Create a bitmap of `bytes` bytes with every bit clear.
    pub fn new(bytes: usize) -> Self {
        assert!(bytes > 0, "Bitmap size must be > 0");
        Self {
            bits: vec![0; bytes],
        }
    }

    /// Create a bitmap from an existing byte image.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(!bytes.is_empty(), "Bitmap size must be > 0");
        Self {
            bits: bytes.to_vec(),
        }
    }

    /// Size of the backing storage in bytes.
    pub fn len_bytes(&self) -> usize {
        self.bits.len()
    }

    /// Number of slots tracked by the bitmap.
    pub fn len_bits(&self) -> usize {
        self.bits.len() * 8
    }

    /// Raw byte image of the bitmap.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Whether bit `index` is set.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len_bits()`.
    pub fn test(&self, index: usize) -> bool {
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    /// Set bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len_bits()`.
    pub fn set(&mut self, index: usize) {
        self.bits[index / 8] |= 1 << (index % 8);
    }

    /// Clear bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len_bits()`.
    pub fn clear(&mut self, index: usize) {
        self.bits[index / 8] &= !(1 << (index % 8));
    }

    /// Clear every bit.
    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    /// Number of set bits.
    pub fn count_set(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Find the first run of `count` consecutive clear bits.
    ///
    /// Returns the index of the first bit in the run, or `None` if no run of
    /// that length exists. A `count` of zero never matches.
    ///
    /// Fully allocated bytes are skipped without inspecting individual bits.
    pub fn scan(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.len_bits() {
            return None;
        }

        let mut run_start = 0;
        let mut run_len = 0;
        let mut index = 0;
        while index < self.len_bits() {
            if run_len == 0 && index % 8 == 0 && self.bits[index / 8] == 0xFF {
                index += 8;
                continue;
            }

            if self.test(index) {
                run_len = 0;
            } else {
                if run_len == 0 {
                    run_start = index;
                }
                run_len += 1;
                if run_len == count {
                    return Some(run_start);
                }
            }
            index += 1;
        }
        None
    }

    /// Iterate over the indices of all set bits, lowest first.
    pub fn iter_set(&self) -> SetBits<'_> {
        SetBits {
            bitmap: self,
            index: 0,
        }
    }
}

/// Iterator over the indices of set bits.
pub struct SetBits<'a> {
    bitmap: &'a Bitmap,
    index: usize,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.index < self.bitmap.len_bits() {
            let index = self.index;
            self.index += 1;
            if self.bitmap.test(index) {
                return Some(index);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bitmap_is_clear() {
        let bm = Bitmap::new(4);
        assert_eq!(bm.len_bytes(), 4);
        assert_eq!(bm.len_bits(), 32);
        assert_eq!(bm.count_set(), 0);
        assert!((0..32).all(|i| !bm.test(i)));
    }

    #[test]
    fn test_set_and_clear() {
        let mut bm = Bitmap::new(2);
        bm.set(0);
        bm.set(9);
        assert!(bm.test(0));
        assert!(bm.test(9));
        assert!(!bm.test(1));
        assert_eq!(bm.as_bytes(), &[0b0000_0001, 0b0000_0010]);

        bm.clear(0);
        assert!(!bm.test(0));
        assert_eq!(bm.count_set(), 1);
    }

    #[test]
    fn test_scan_first_fit() {
        let mut bm = Bitmap::new(2);
        assert_eq!(bm.scan(1), Some(0));

        bm.set(0);
        bm.set(2);
        // Slot 1 is a hole of length one; a run of two starts at 3.
        assert_eq!(bm.scan(1), Some(1));
        assert_eq!(bm.scan(2), Some(3));
    }

    #[test]
    fn test_scan_skips_full_bytes() {
        let mut bm = Bitmap::new(3);
        for i in 0..8 {
            bm.set(i);
        }
        assert_eq!(bm.scan(1), Some(8));
        assert_eq!(bm.scan(16), Some(8));
        assert_eq!(bm.scan(17), None);
    }

    #[test]
    fn test_scan_run_crosses_byte_boundary() {
        let mut bm = Bitmap::new(2);
        for i in 0..6 {
            bm.set(i);
        }
        assert_eq!(bm.scan(4), Some(6));
    }

    #[test]
    fn test_scan_zero_or_oversized() {
        let bm = Bitmap::new(1);
        assert_eq!(bm.scan(0), None);
        assert_eq!(bm.scan(9), None);
        assert_eq!(bm.scan(8), Some(0));
    }

    #[test]
    fn test_clone_has_independent_storage() {
        let mut parent = Bitmap::new(1);
        parent.set(3);
        let mut child = parent.clone();
        assert_eq!(child, parent);

        child.set(4);
        parent.clear(3);
        assert!(child.test(3));
        assert!(!parent.test(4));
    }

    #[test]
    fn test_from_bytes_round_trip() {
        let bm = Bitmap::from_bytes(&[0xF0, 0x01]);
        assert_eq!(bm.count_set(), 5);
        assert!(bm.test(4));
        assert!(bm.test(8));
        assert!(!bm.test(0));
    }

    #[test]
    fn test_iter_set() {
        let mut bm = Bitmap::new(2);
        bm.set(1);
        bm.set(7);
        bm.set(12);
        let set: Vec<usize> = bm.iter_set().collect();
        assert_eq!(set, vec![1, 7, 12]);
    }

    #[test]
    fn test_clear_all() {
        let mut bm = Bitmap::from_bytes(&[0xFF, 0xFF]);
        bm.clear_all();
        assert_eq!(bm.count_set(), 0);
    }

    #[test]
    #[should_panic(expected = "size must be > 0")]
    fn test_zero_size_panics() {
        let _ = Bitmap::new(0);
    }
}
