//! Reference-counted physical page pool.
//!
//! The pool is the single source of truth for which frames are live and how
//! many page table entries share each of them. It provides the mechanism
//! (allocate, copy, count) but no policy: it will happily write into a shared
//! frame. Deciding when a write must copy first is the access path's job.
//!
//! All pool state sits behind one spinlock, so reference-count updates from
//! different processes are serialized and the pool can be shared by
//! reference across threads.

use cowfork_abi::PAGE_SIZE;
use log::debug;
use spinning_top::Spinlock;

use super::MemoryError;
use super::frame::{FrameId, PhysicalPage};

/// A pool of fixed-size physical frames.
pub struct FramePool {
    inner: Spinlock<PoolInner>,
}

struct PoolInner {
    /// Frame slots indexed by `FrameId`. `None` marks a freed slot.
    slots: Vec<Option<PhysicalPage>>,
    /// Freed slots available for reuse.
    free: Vec<FrameId>,
    /// Maximum number of slots, or `None` for an unbounded pool.
    capacity: Option<usize>,
}

impl PoolInner {
    fn page(&self, frame: FrameId) -> Result<&PhysicalPage, MemoryError> {
        self.slots
            .get(frame.index())
            .and_then(Option::as_ref)
            .ok_or(MemoryError::InvalidFrame)
    }

    fn page_mut(&mut self, frame: FrameId) -> Result<&mut PhysicalPage, MemoryError> {
        self.slots
            .get_mut(frame.index())
            .and_then(Option::as_mut)
            .ok_or(MemoryError::InvalidFrame)
    }

    fn allocate(&mut self) -> Result<FrameId, MemoryError> {
        if let Some(frame) = self.free.pop() {
            self.slots[frame.index()] = Some(PhysicalPage::new());
            return Ok(frame);
        }

        if self.capacity.is_some_and(|cap| self.slots.len() >= cap) {
            return Err(MemoryError::OutOfMemory);
        }

        let frame = FrameId::from_index(self.slots.len());
        self.slots.push(Some(PhysicalPage::new()));
        Ok(frame)
    }

    fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

impl FramePool {
    /// Create a pool with no upper bound on the number of frames.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a pool that holds at most `capacity` live frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(Some(capacity))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            inner: Spinlock::new(PoolInner {
                slots: Vec::new(),
                free: Vec::new(),
                capacity,
            }),
        }
    }

    /// The configured frame limit, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.inner.lock().capacity
    }

    /// Number of frames currently live.
    pub fn frames_in_use(&self) -> usize {
        self.inner.lock().in_use()
    }

    /// Reserve a fresh zero-filled frame with a reference count of one.
    pub fn allocate(&self) -> Result<FrameId, MemoryError> {
        let frame = self.inner.lock().allocate()?;
        debug!("allocated {}", frame);
        Ok(frame)
    }

    /// Copy the full content of a frame.
    pub fn read(&self, frame: FrameId) -> Result<Vec<u8>, MemoryError> {
        let inner = self.inner.lock();
        Ok(inner.page(frame)?.data.to_vec())
    }

    /// Overwrite the start of a frame with `data`.
    pub fn write(&self, frame: FrameId, data: &[u8]) -> Result<(), MemoryError> {
        self.write_at(frame, 0, data)
    }

    /// Overwrite `data.len()` bytes of a frame starting at `offset`.
    ///
    /// The caller must already have established that the frame is not shared.
    pub fn write_at(&self, frame: FrameId, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= PAGE_SIZE)
            .ok_or(MemoryError::OutOfBounds)?;

        let mut inner = self.inner.lock();
        inner.page_mut(frame)?.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Current reference count of a frame, or `None` if it is not live.
    pub fn ref_count(&self, frame: FrameId) -> Option<u32> {
        self.inner.lock().page(frame).ok().map(|page| page.ref_count)
    }

    /// Record one more page table entry pointing at `frame`.
    pub fn increment_ref(&self, frame: FrameId) -> Result<(), MemoryError> {
        let mut inner = self.inner.lock();
        let page = inner.page_mut(frame)?;
        page.ref_count += 1;
        debug!("{} ref_count -> {}", frame, page.ref_count);
        Ok(())
    }

    /// Drop one reference to `frame`, freeing it when the count reaches zero.
    ///
    /// Returns `true` if the frame was freed.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is not live: its count is already zero, so some
    /// page table has lost track of what it maps.
    pub fn decrement_ref(&self, frame: FrameId) -> bool {
        let mut inner = self.inner.lock();
        let Ok(page) = inner.page_mut(frame) else {
            panic!("decrement_ref on {frame}: reference count already zero");
        };

        page.ref_count -= 1;
        if page.ref_count > 0 {
            debug!("{} ref_count -> {}", frame, page.ref_count);
            return false;
        }

        inner.slots[frame.index()] = None;
        inner.free.push(frame);
        debug!("freed {}", frame);
        true
    }

    /// Allocate a new frame holding a copy of `frame`'s content.
    ///
    /// The allocation and the copy happen under a single lock hold, so the
    /// source cannot be freed or rewritten in between. The source's reference
    /// count is left unchanged.
    pub fn duplicate(&self, frame: FrameId) -> Result<FrameId, MemoryError> {
        let mut inner = self.inner.lock();
        let data = inner.page(frame)?.data.clone();
        let copy = inner.allocate()?;
        inner.page_mut(copy)?.data = data;
        debug!("duplicated {} into {}", frame, copy);
        Ok(copy)
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}
