//! Per-process virtual to physical page mapping.
//!
//! The page table is a plain container: it knows nothing about reference
//! counts or copy-on-write. Looking up an unmapped address yields `None`
//! rather than an error so that callers can tell "unmapped" apart from
//! "mapped but needs a fault".

use std::collections::BTreeMap;

use cowfork_abi::PAGE_SIZE;
use x86_64::VirtAddr;

use super::FrameId;

/// One virtual page's mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    /// Frame backing this page.
    pub frame: FrameId,
    /// Set while the frame may be shared with another page table. Writes
    /// through a read-only entry must go through copy-on-write.
    pub read_only: bool,
}

impl PageTableEntry {
    /// A private, writable mapping.
    pub fn writable(frame: FrameId) -> Self {
        Self {
            frame,
            read_only: false,
        }
    }

    /// A shared, read-only mapping.
    pub fn shared(frame: FrameId) -> Self {
        Self {
            frame,
            read_only: true,
        }
    }
}

/// Mapping from page-aligned virtual address to [`PageTableEntry`].
#[derive(Debug, Default)]
pub struct PageTable {
    entries: BTreeMap<VirtAddr, PageTableEntry>,
}

impl PageTable {
    /// Create an empty page table.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert or replace the mapping for `vaddr`, returning the old entry.
    pub fn insert(&mut self, vaddr: VirtAddr, entry: PageTableEntry) -> Option<PageTableEntry> {
        debug_assert!(
            vaddr.is_aligned(PAGE_SIZE as u64),
            "page table key {vaddr:?} is not page aligned"
        );
        self.entries.insert(vaddr, entry)
    }

    pub fn lookup(&self, vaddr: VirtAddr) -> Option<&PageTableEntry> {
        self.entries.get(&vaddr)
    }

    pub fn lookup_mut(&mut self, vaddr: VirtAddr) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(&vaddr)
    }

    pub fn remove(&mut self, vaddr: VirtAddr) -> Option<PageTableEntry> {
        self.entries.remove(&vaddr)
    }

    /// Iterate over all mappings in address order.
    pub fn iter(&self) -> impl Iterator<Item = (VirtAddr, &PageTableEntry)> {
        self.entries.iter().map(|(vaddr, entry)| (*vaddr, entry))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (VirtAddr, &mut PageTableEntry)> {
        self.entries.iter_mut().map(|(vaddr, entry)| (*vaddr, entry))
    }

    /// Remove every mapping, yielding them in address order.
    pub fn drain(&mut self) -> impl Iterator<Item = (VirtAddr, PageTableEntry)> {
        core::mem::take(&mut self.entries).into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
