//! Memory management.
//!
//! This module handles the simulated physical and virtual memory:
//! - Reference-counted frame allocation
//! - Per-process page tables and user address windows
//! - The read/write access path, including copy-on-write faults

use core::fmt;

pub mod access;
mod address_space;
mod frame;
mod page_table;
mod phys;

pub use access::WriteOutcome;
pub use address_space::UserVaddrWindow;
pub use frame::FrameId;
pub use page_table::{PageTable, PageTableEntry};
pub use phys::FramePool;

use cowfork_abi::PAGE_SIZE;
use x86_64::VirtAddr;

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The virtual address has no page table entry.
    InvalidAccess,
    /// The frame identifier does not name a live frame.
    InvalidFrame,
    /// The frame pool has no frames left.
    OutOfMemory,
    /// The access extends past the end of the page.
    OutOfBounds,
    /// The user address window has no free run of the requested size.
    AddressSpaceExhausted,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MemoryError::InvalidAccess => "invalid access: address is not mapped",
            MemoryError::InvalidFrame => "invalid frame reference",
            MemoryError::OutOfMemory => "out of physical memory",
            MemoryError::OutOfBounds => "access crosses the page boundary",
            MemoryError::AddressSpaceExhausted => "user address window exhausted",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for MemoryError {}

/// Round a virtual address down to the start of its page.
pub fn page_base(addr: VirtAddr) -> VirtAddr {
    addr.align_down(PAGE_SIZE as u64)
}

/// Offset of a virtual address within its page.
pub fn page_offset(addr: VirtAddr) -> usize {
    (addr.as_u64() & cowfork_abi::PAGE_OFFSET_MASK) as usize
}
