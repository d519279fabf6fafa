//! Process duplication with copy-on-write address spaces.
//!
//! The child gets its own page table whose entries point at the parent's
//! frames. Both sides lose write access: every entry, in parent and child,
//! is read-only until a write fault hands the writer a private copy.
//!
//! All frame reference counting happens in one pass, and the parent is only
//! modified once that pass has fully succeeded. Anything that fails earlier
//! leaves the parent, the pool, and the scheduler exactly as they were.

use core::fmt;

use cowfork_abi::FORK_NAME_SUFFIX;
use log::{info, warn};

use crate::memory::{FramePool, MemoryError, PageTable, PageTableEntry};
use crate::process::{PidAllocator, Process, ProcessId, ResumeContext};
use crate::scheduler::Scheduler;

/// Errors that abort a fork. The parent is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkError {
    /// The parent PID is not registered with the scheduler.
    ParentNotFound,
    /// No PID could be assigned to the child.
    PidExhausted,
    /// Sharing the parent's frames failed.
    Memory(MemoryError),
}

impl fmt::Display for ForkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkError::ParentNotFound => f.write_str("fork failed: no such parent process"),
            ForkError::PidExhausted => f.write_str("fork failed: process identifiers exhausted"),
            ForkError::Memory(err) => write!(f, "fork failed: {err}"),
        }
    }
}

impl core::error::Error for ForkError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            ForkError::Memory(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemoryError> for ForkError {
    fn from(err: MemoryError) -> Self {
        ForkError::Memory(err)
    }
}

/// Duplicate `parent` into a new ready process and return the child's PID.
pub fn fork(
    scheduler: &mut Scheduler,
    frames: &FramePool,
    pids: &PidAllocator,
    parent: ProcessId,
) -> Result<ProcessId, ForkError> {
    let parent_process = scheduler.get(parent).ok_or(ForkError::ParentNotFound)?;

    let mut child = Process::new("");
    child.copy_from(parent_process);

    let mut shared = share_frames(parent_process.page_table(), frames).inspect_err(|err| {
        warn!("PID {parent}: fork aborted while sharing frames: {err}");
    })?;
    let Some(pid) = pids.next_pid() else {
        release_frames(&mut shared, frames);
        warn!("PID {parent}: fork aborted, no PID available");
        return Err(ForkError::PidExhausted);
    };

    child.set_id(pid);
    child.reset_for_ready();
    child.set_name(format!("{}{FORK_NAME_SUFFIX}", parent_process.name()));
    *child.page_table_mut() = shared;

    let Some(parent_process) = scheduler.get_mut(parent) else {
        panic!("No process exists with PID {parent:?}");
    };
    for (_, entry) in parent_process.page_table_mut().iter_mut() {
        entry.read_only = true;
    }

    child.set_context(ResumeContext::forked_child());

    for fd in child.open_files() {
        fd.inode.increment_open_count();
    }

    let pages = child.page_table().len();
    scheduler.add_ready(child);
    info!("PID {parent}: forked child PID {pid} sharing {pages} pages");
    Ok(pid)
}

/// Build a page table mapping every page of `parent` read-only onto the same
/// frame, taking one extra reference per frame.
///
/// On failure every reference already taken is dropped again.
fn share_frames(parent: &PageTable, frames: &FramePool) -> Result<PageTable, MemoryError> {
    let mut child = PageTable::new();
    for (vaddr, entry) in parent.iter() {
        if let Err(err) = frames.increment_ref(entry.frame) {
            release_frames(&mut child, frames);
            return Err(err);
        }
        child.insert(vaddr, PageTableEntry::shared(entry.frame));
    }
    Ok(child)
}

/// Drop the reference every entry of `table` holds, leaving it empty.
fn release_frames(table: &mut PageTable, frames: &FramePool) {
    for (_, entry) in table.drain() {
        frames.decrement_ref(entry.frame);
    }
}
