//! Open files and inode open counts.
//!
//! A process holds a list of file descriptors. Descriptors are per-process
//! values (each keeps its own position), but the inode they refer to is
//! shared: forking copies the descriptor list and bumps the open count of
//! every inode once per inherited descriptor.

use std::sync::Arc;

use core::sync::atomic::{AtomicU32, Ordering};

/// Index into a process's open-file list.
pub type FileHandle = usize;

/// Shared file object with an open count.
#[derive(Debug)]
pub struct Inode {
    number: u32,
    open_count: AtomicU32,
}

impl Inode {
    /// Create an inode with no openers.
    pub fn new(number: u32) -> Arc<Self> {
        Arc::new(Self {
            number,
            open_count: AtomicU32::new(0),
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Number of descriptors, across all processes, that have this inode open.
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::Acquire)
    }

    pub fn increment_open_count(&self) {
        self.open_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one opener. Returns the remaining count.
    ///
    /// # Panics
    ///
    /// Panics if the inode has no openers.
    pub fn decrement_open_count(&self) -> u32 {
        let prev = self
            .open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or_else(|_| panic!("inode {} closed more times than opened", self.number));
        prev - 1
    }
}

/// A process's reference to an open inode.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub inode: Arc<Inode>,
    /// Current read/write position.
    pub position: u64,
    /// Open mode flags.
    pub flags: u32,
}

impl FileDescriptor {
    pub fn new(inode: Arc<Inode>, flags: u32) -> Self {
        Self {
            inode,
            position: 0,
            flags,
        }
    }
}
