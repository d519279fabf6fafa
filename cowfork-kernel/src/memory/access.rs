//! User memory access path.
//!
//! Reads go straight through the page table to the frame pool. Writes are
//! where copy-on-write happens: a write through a read-only entry first
//! gives the writer a private frame, so no other page table ever observes
//! the new bytes.

use cowfork_abi::PAGE_SIZE;
use log::debug;
use x86_64::VirtAddr;

use super::{FrameId, FramePool, MemoryError, page_base, page_offset};
use crate::process::Process;

/// How a successful write reached its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry was already private and writable.
    InPlace,
    /// The frame was shared: the writer now has a private copy.
    Copied { old: FrameId, new: FrameId },
    /// The entry was read-only but every other sharer had already copied
    /// away, so the writer took the frame back without copying.
    Reclaimed,
}

/// End offset of an access of `len` bytes at `offset`, if it fits in a page.
fn in_page_end(offset: usize, len: usize) -> Result<usize, MemoryError> {
    offset
        .checked_add(len)
        .filter(|&end| end <= PAGE_SIZE)
        .ok_or(MemoryError::OutOfBounds)
}

/// Read the full page containing `vaddr`.
pub fn read(process: &Process, frames: &FramePool, vaddr: VirtAddr) -> Result<Vec<u8>, MemoryError> {
    let entry = process
        .page_table()
        .lookup(page_base(vaddr))
        .ok_or(MemoryError::InvalidAccess)?;
    frames.read(entry.frame)
}

/// Read `len` bytes starting at `vaddr`. The range must stay within one page.
pub fn read_at(
    process: &Process,
    frames: &FramePool,
    vaddr: VirtAddr,
    len: usize,
) -> Result<Vec<u8>, MemoryError> {
    let offset = page_offset(vaddr);
    let end = in_page_end(offset, len)?;
    let mut page = read(process, frames, vaddr)?;
    page.truncate(end);
    Ok(page.split_off(offset))
}

/// Write `data` at `vaddr`, taking a copy-on-write fault first if the page
/// is shared.
///
/// Unmapped addresses and writes that would run past the end of the page
/// fail before any frame is touched.
///
/// # Panics
///
/// Panics if a writable entry points at a frame with more than one
/// reference: sharing has already been corrupted.
pub fn write(
    process: &mut Process,
    frames: &FramePool,
    vaddr: VirtAddr,
    data: &[u8],
) -> Result<WriteOutcome, MemoryError> {
    let page = page_base(vaddr);
    let offset = page_offset(vaddr);
    let pid = process.id();

    let entry = process
        .page_table_mut()
        .lookup_mut(page)
        .ok_or(MemoryError::InvalidAccess)?;
    in_page_end(offset, data.len())?;

    let refs = frames.ref_count(entry.frame).ok_or(MemoryError::InvalidFrame)?;
    let outcome = if entry.read_only {
        if refs > 1 {
            let old = entry.frame;
            let new = frames.duplicate(old)?;
            entry.frame = new;
            entry.read_only = false;
            frames.decrement_ref(old);
            debug!(
                "PID {pid}: COW fault at {:#x}, {old} -> {new}",
                page.as_u64()
            );
            WriteOutcome::Copied { old, new }
        } else {
            entry.read_only = false;
            debug!(
                "PID {pid}: reclaimed sole reference to {} at {:#x}",
                entry.frame,
                page.as_u64()
            );
            WriteOutcome::Reclaimed
        }
    } else {
        if refs > 1 {
            panic!(
                "PID {pid}: writable entry at {:#x} maps {} shared by {refs} page tables",
                page.as_u64(),
                entry.frame
            );
        }
        WriteOutcome::InPlace
    };

    frames.write_at(entry.frame, offset, data)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PageTableEntry;

    fn mapped_process(frames: &FramePool, pages: usize) -> (Process, VirtAddr) {
        let mut process = Process::new("p");
        let start = process.map_user_pages(frames, pages).unwrap();
        (process, start)
    }

    #[test]
    fn test_write_then_read_in_place() {
        let frames = FramePool::new();
        let (mut process, start) = mapped_process(&frames, 1);

        let outcome = write(&mut process, &frames, start + 8u64, &[1, 2, 3]).unwrap();
        assert_eq!(outcome, WriteOutcome::InPlace);
        assert_eq!(read_at(&process, &frames, start + 8u64, 3).unwrap(), vec![1, 2, 3]);

        let page = read(&process, &frames, start + 100u64).unwrap();
        assert_eq!(&page[7..12], &[0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_unmapped_access_is_invalid() {
        let frames = FramePool::new();
        let (mut process, start) = mapped_process(&frames, 1);
        let unmapped = start + PAGE_SIZE as u64;

        assert_eq!(read(&process, &frames, unmapped), Err(MemoryError::InvalidAccess));
        assert_eq!(
            write(&mut process, &frames, unmapped, &[1]),
            Err(MemoryError::InvalidAccess)
        );
        assert_eq!(frames.frames_in_use(), 1);
    }

    #[test]
    fn test_read_past_page_end_is_out_of_bounds() {
        let frames = FramePool::new();
        let (process, start) = mapped_process(&frames, 2);
        let near_end = start + (PAGE_SIZE - 2) as u64;

        assert_eq!(read_at(&process, &frames, near_end, 2).unwrap(), vec![0, 0]);
        assert_eq!(
            read_at(&process, &frames, near_end, 4),
            Err(MemoryError::OutOfBounds)
        );
        assert_eq!(
            read_at(&process, &frames, start + 8u64, usize::MAX),
            Err(MemoryError::OutOfBounds)
        );
    }

    #[test]
    fn test_write_with_overflowing_length_is_out_of_bounds() {
        let frames = FramePool::new();
        let (mut process, start) = mapped_process(&frames, 1);
        let data = [0u8; 4];
        assert_eq!(in_page_end(8, usize::MAX), Err(MemoryError::OutOfBounds));
        assert_eq!(in_page_end(PAGE_SIZE - 4, data.len()), Ok(PAGE_SIZE));
        assert_eq!(
            write(&mut process, &frames, start + (PAGE_SIZE - 3) as u64, &data),
            Err(MemoryError::OutOfBounds)
        );
        let frame = process.page_table().lookup(start).unwrap().frame;
        assert_eq!(frames.read(frame).unwrap(), vec![0; PAGE_SIZE]);
    }

    #[test]
    fn test_write_across_page_end_is_rejected_before_copy() {
        let frames = FramePool::new();
        let (mut process, start) = mapped_process(&frames, 1);
        let frame = process.page_table().lookup(start).unwrap().frame;
        frames.increment_ref(frame).unwrap();
        process.page_table_mut().lookup_mut(start).unwrap().read_only = true;

        let last = start + (PAGE_SIZE - 1) as u64;
        assert_eq!(
            write(&mut process, &frames, last, &[1, 2]),
            Err(MemoryError::OutOfBounds)
        );
        assert_eq!(frames.frames_in_use(), 1);
        assert_eq!(frames.ref_count(frame), Some(2));
        assert!(process.page_table().lookup(start).unwrap().read_only);
    }

    #[test]
    fn test_shared_write_copies() {
        let frames = FramePool::new();
        let (mut process, start) = mapped_process(&frames, 1);
        let frame = process.page_table().lookup(start).unwrap().frame;
        frames.write(frame, &[7; 16]).unwrap();
        frames.increment_ref(frame).unwrap();
        process.page_table_mut().lookup_mut(start).unwrap().read_only = true;

        let outcome = write(&mut process, &frames, start, &[1]).unwrap();
        let WriteOutcome::Copied { old, new } = outcome else {
            panic!("expected a copy, got {outcome:?}");
        };
        assert_eq!(old, frame);
        assert_eq!(frames.ref_count(old), Some(1));
        assert_eq!(frames.ref_count(new), Some(1));
        assert_eq!(
            *process.page_table().lookup(start).unwrap(),
            PageTableEntry::writable(new)
        );

        let copied = frames.read(new).unwrap();
        assert_eq!(copied[0], 1);
        assert_eq!(&copied[1..16], &[7; 15]);
        assert_eq!(frames.read(old).unwrap()[0], 7);
    }

    #[test]
    fn test_sole_owner_read_only_write_reclaims() {
        let frames = FramePool::new();
        let (mut process, start) = mapped_process(&frames, 1);
        let frame = process.page_table().lookup(start).unwrap().frame;
        process.page_table_mut().lookup_mut(start).unwrap().read_only = true;

        assert_eq!(
            write(&mut process, &frames, start, &[5]),
            Ok(WriteOutcome::Reclaimed)
        );
        assert_eq!(
            *process.page_table().lookup(start).unwrap(),
            PageTableEntry::writable(frame)
        );
        assert_eq!(frames.frames_in_use(), 1);
    }

    #[test]
    #[should_panic(expected = "shared by 2 page tables")]
    fn test_writable_shared_entry_panics() {
        let frames = FramePool::new();
        let (mut process, start) = mapped_process(&frames, 1);
        let frame = process.page_table().lookup(start).unwrap().frame;
        frames.increment_ref(frame).unwrap();
        let _ = write(&mut process, &frames, start, &[1]);
    }
}
