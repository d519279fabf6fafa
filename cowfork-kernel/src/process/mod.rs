//! Process management.
//!
//! This module contains the process control record and its collaborators:
//! - Process struct, identity and scheduling fields
//! - Lineage copy used by fork
//! - User page mapping that keeps the address bitmap and page table in step
//! - PID allocation and saved resume state

pub mod context;
pub mod info;
pub mod pid;

pub use context::{ResumeContext, ResumePoint};
pub use info::ProcessInfo;
pub use pid::PidAllocator;

use core::fmt;
use std::sync::Arc;

use cowfork_abi::{DEFAULT_PRIORITY, PAGE_SIZE};
use log::debug;
use x86_64::VirtAddr;

use crate::file::{FileDescriptor, FileHandle, Inode};
use crate::memory::{self, FramePool, MemoryError, PageTable, PageTableEntry, UserVaddrWindow};

/// Unique process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Placeholder carried by records that have not been assigned a PID yet.
    pub const UNASSIGNED: ProcessId = ProcessId(0);

    pub fn from_raw(raw: u64) -> Self {
        ProcessId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    Died,
}

/// Errors that can occur during process operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// Process not found.
    NotFound,
    /// No PIDs left to assign.
    PidExhausted,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::NotFound => f.write_str("no such process"),
            ProcessError::PidExhausted => f.write_str("process identifiers exhausted"),
        }
    }
}

impl core::error::Error for ProcessError {}

/// A simulated user process.
pub struct Process {
    id: ProcessId,
    parent_id: Option<ProcessId>,
    name: String,
    state: ProcessState,
    priority: u8,
    /// Remaining ticks in the current time slice.
    ticks: u32,
    /// Ticks consumed since the process was created.
    elapsed_ticks: u64,
    page_table: PageTable,
    vaddr: UserVaddrWindow,
    open_files: Vec<FileDescriptor>,
    /// Where the process continues when next switched to. `None` until the
    /// scheduler has something to resume.
    context: Option<ResumeContext>,
    /// External process info visible to handle holders.
    /// Survives process exit until all handles are dropped.
    info: Arc<ProcessInfo>,
}

impl Process {
    /// Create an empty record with default scheduling parameters and no
    /// memory, files or PID.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_window(name, UserVaddrWindow::default())
    }

    /// Create an empty record whose user pages live in `vaddr` instead of the
    /// default window.
    pub fn with_window(name: impl Into<String>, vaddr: UserVaddrWindow) -> Self {
        Self {
            id: ProcessId::UNASSIGNED,
            parent_id: None,
            name: name.into(),
            state: ProcessState::Ready,
            priority: DEFAULT_PRIORITY,
            ticks: DEFAULT_PRIORITY as u32,
            elapsed_ticks: 0,
            page_table: PageTable::new(),
            vaddr,
            open_files: Vec::new(),
            context: None,
            info: Arc::new(ProcessInfo::new(ProcessId::UNASSIGNED, None)),
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Assign the process its PID. Also starts a fresh [`ProcessInfo`], since
    /// handles are tied to a specific PID.
    pub fn set_id(&mut self, id: ProcessId) {
        self.id = id;
        self.info = Arc::new(ProcessInfo::new(id, self.parent_id));
    }

    pub fn parent_id(&self) -> Option<ProcessId> {
        self.parent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority;
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    /// Charge one timer tick to the process.
    pub fn tick(&mut self) {
        self.elapsed_ticks += 1;
        self.ticks = self.ticks.saturating_sub(1);
    }

    /// Mark the process ready with a fresh time slice and no accumulated time.
    pub fn reset_for_ready(&mut self) {
        self.elapsed_ticks = 0;
        self.state = ProcessState::Ready;
        self.ticks = self.priority as u32;
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// Direct access to the page table. Callers that add or remove entries
    /// must keep the address window bitmap in step.
    pub fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }

    pub fn vaddr(&self) -> &UserVaddrWindow {
        &self.vaddr
    }

    pub fn vaddr_mut(&mut self) -> &mut UserVaddrWindow {
        &mut self.vaddr
    }

    pub fn open_files(&self) -> &[FileDescriptor] {
        &self.open_files
    }

    pub fn context(&self) -> Option<&ResumeContext> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: ResumeContext) {
        self.context = Some(context);
    }

    /// Take and clear the saved context.
    pub fn take_context(&mut self) -> Option<ResumeContext> {
        self.context.take()
    }

    /// Get the process info (for creating handles).
    pub fn info(&self) -> &Arc<ProcessInfo> {
        &self.info
    }

    /// Copy identity, scheduling, address-window and open-file state from
    /// `parent`.
    ///
    /// The PID is copied too and must be replaced before the record is
    /// registered anywhere. The window gets its own bitmap storage; the file
    /// list is a new container whose descriptors share the parent's inodes
    /// (open counts are not touched here). The page table is left as is.
    pub fn copy_from(&mut self, parent: &Process) {
        self.id = parent.id;
        self.elapsed_ticks = parent.elapsed_ticks;
        self.state = parent.state;
        self.ticks = parent.ticks;
        self.priority = parent.priority;
        self.parent_id = Some(parent.id);
        self.name = parent.name.clone();
        self.vaddr = parent.vaddr.clone();
        self.open_files = parent.open_files.clone();
    }

    /// Open `inode` in this process, returning the new handle.
    pub fn open_file(&mut self, inode: Arc<Inode>, flags: u32) -> FileHandle {
        inode.increment_open_count();
        self.open_files.push(FileDescriptor::new(inode, flags));
        self.open_files.len() - 1
    }

    /// Close every open file, dropping one open count per descriptor.
    pub fn close_all_files(&mut self) {
        for fd in self.open_files.drain(..) {
            fd.inode.decrement_open_count();
        }
    }

    /// Map `count` fresh, zero-filled, writable pages at the first free run
    /// of the address window.
    ///
    /// Returns the address of the first page. On failure nothing stays
    /// reserved or allocated.
    pub fn map_user_pages(
        &mut self,
        frames: &FramePool,
        count: usize,
    ) -> Result<VirtAddr, MemoryError> {
        let start = self
            .vaddr
            .reserve(count)
            .ok_or(MemoryError::AddressSpaceExhausted)?;

        for i in 0..count {
            let vaddr = start + (i * PAGE_SIZE) as u64;
            let frame = match frames.allocate() {
                Ok(frame) => frame,
                Err(err) => {
                    self.unwind_mapping(frames, start, i, count);
                    return Err(err);
                }
            };
            self.page_table.insert(vaddr, PageTableEntry::writable(frame));
        }

        debug!(
            "PID {}: mapped {} pages at {:#x}",
            self.id,
            count,
            start.as_u64()
        );
        Ok(start)
    }

    /// Undo a partially completed `map_user_pages`: `mapped` pages have
    /// frames, `reserved` slots have bits.
    fn unwind_mapping(&mut self, frames: &FramePool, start: VirtAddr, mapped: usize, reserved: usize) {
        for i in 0..reserved {
            let vaddr = start + (i * PAGE_SIZE) as u64;
            if i < mapped {
                if let Some(entry) = self.page_table.remove(vaddr) {
                    frames.decrement_ref(entry.frame);
                }
            }
            self.vaddr.release(vaddr);
        }
    }

    /// Remove the mapping for the page containing `vaddr` and drop its frame
    /// reference.
    pub fn unmap_user_page(&mut self, frames: &FramePool, vaddr: VirtAddr) -> Result<(), MemoryError> {
        let page = memory::page_base(vaddr);
        let entry = self
            .page_table
            .remove(page)
            .ok_or(MemoryError::InvalidAccess)?;
        self.vaddr.release(page);
        frames.decrement_ref(entry.frame);
        Ok(())
    }

    /// Drop every mapping and its frame reference. Frames no other process
    /// maps are returned to the pool.
    ///
    /// Returns the number of frames actually freed.
    pub fn release_memory(&mut self, frames: &FramePool) -> usize {
        let mut freed = 0;
        for (_, entry) in self.page_table.drain() {
            if frames.decrement_ref(entry.frame) {
                freed += 1;
            }
        }
        self.vaddr.release_all();
        freed
    }
}
