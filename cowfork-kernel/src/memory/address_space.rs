//! User virtual address window.
//!
//! Each process owns a window of virtual pages starting at a fixed base
//! address. A bitmap records which page slots are in use; slot `i` covers the
//! page at `start + i * PAGE_SIZE`. Whoever reserves or releases slots is
//! responsible for keeping the bitmap in step with the page table.

use cowfork_abi::{PAGE_SIZE, USER_VADDR_BITMAP_BYTES, USER_VADDR_START};
use vaddr_bitmap::Bitmap;
use x86_64::VirtAddr;

use super::page_base;

/// Descriptor of a process's user virtual address window.
///
/// Cloning produces a window with independent bitmap storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserVaddrWindow {
    start: VirtAddr,
    bitmap: Bitmap,
}

impl UserVaddrWindow {
    /// Create a window at `start` tracking `bitmap_bytes * 8` pages.
    pub fn new(start: VirtAddr, bitmap_bytes: usize) -> Self {
        assert!(
            start.is_aligned(PAGE_SIZE as u64),
            "user window start {start:?} is not page aligned"
        );
        Self {
            start,
            bitmap: Bitmap::new(bitmap_bytes),
        }
    }

    /// First address of the window.
    pub fn start(&self) -> VirtAddr {
        self.start
    }

    /// One past the last address of the window.
    pub fn end(&self) -> VirtAddr {
        self.start + (self.bitmap.len_bits() * PAGE_SIZE) as u64
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Whether `vaddr` lies inside the window.
    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        vaddr >= self.start && vaddr < self.end()
    }

    /// Slot index of the page containing `vaddr`.
    pub fn slot_of(&self, vaddr: VirtAddr) -> Option<usize> {
        if !self.contains(vaddr) {
            return None;
        }
        Some(((page_base(vaddr) - self.start) / PAGE_SIZE as u64) as usize)
    }

    /// Start address of slot `slot`.
    pub fn vaddr_of(&self, slot: usize) -> VirtAddr {
        self.start + (slot * PAGE_SIZE) as u64
    }

    /// Whether the page containing `vaddr` is marked in use.
    pub fn is_reserved(&self, vaddr: VirtAddr) -> bool {
        self.slot_of(vaddr).is_some_and(|slot| self.bitmap.test(slot))
    }

    /// Reserve `count` contiguous pages, first fit.
    ///
    /// Returns the address of the first reserved page.
    pub fn reserve(&mut self, count: usize) -> Option<VirtAddr> {
        let first = self.bitmap.scan(count)?;
        for slot in first..first + count {
            self.bitmap.set(slot);
        }
        Some(self.vaddr_of(first))
    }

    /// Mark the page containing `vaddr` as in use.
    ///
    /// Returns `false` if the address is outside the window or already reserved.
    pub fn reserve_at(&mut self, vaddr: VirtAddr) -> bool {
        match self.slot_of(vaddr) {
            Some(slot) if !self.bitmap.test(slot) => {
                self.bitmap.set(slot);
                true
            }
            _ => false,
        }
    }

    /// Release the page containing `vaddr`. Returns `false` if it was not reserved.
    pub fn release(&mut self, vaddr: VirtAddr) -> bool {
        match self.slot_of(vaddr) {
            Some(slot) if self.bitmap.test(slot) => {
                self.bitmap.clear(slot);
                true
            }
            _ => false,
        }
    }

    /// Release every page.
    pub fn release_all(&mut self) {
        self.bitmap.clear_all();
    }

    /// Iterate over the start addresses of all reserved pages.
    pub fn reserved(&self) -> impl Iterator<Item = VirtAddr> + '_ {
        self.bitmap.iter_set().map(|slot| self.vaddr_of(slot))
    }
}

impl Default for UserVaddrWindow {
    fn default() -> Self {
        Self::new(VirtAddr::new(USER_VADDR_START), USER_VADDR_BITMAP_BYTES)
    }
}
