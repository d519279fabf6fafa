use core::fmt;

use cowfork_abi::PAGE_SIZE;
use x86_64::PhysAddr;

/// Identifier of a physical frame within a [`FramePool`](super::FramePool).
///
/// Frames are numbered from zero; the simulated physical address of frame
/// `n` is `n * PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(u32);

impl FrameId {
    pub(crate) fn from_index(index: usize) -> Self {
        FrameId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the simulated physical start address of this frame.
    pub fn start_address(self) -> PhysAddr {
        PhysAddr::new(self.0 as u64 * PAGE_SIZE as u64)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{} ({:#x})", self.0, self.start_address().as_u64())
    }
}

/// A physical page: one frame's worth of bytes plus its share count.
pub(crate) struct PhysicalPage {
    pub(crate) data: Box<[u8; PAGE_SIZE]>,
    /// Number of page table entries pointing at this frame. Always >= 1 while
    /// the page is live.
    pub(crate) ref_count: u32,
}

impl PhysicalPage {
    /// Create a zero-filled page with a single reference.
    pub(crate) fn new() -> Self {
        Self {
            data: Box::new([0; PAGE_SIZE]),
            ref_count: 1,
        }
    }
}
