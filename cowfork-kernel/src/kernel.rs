//! Kernel context.
//!
//! [`Kernel`] owns the frame pool, the scheduler and the PID allocator, and
//! exposes the process-level operations on top of them. Separate `Kernel`
//! values share nothing, so tests can each build their own.

use std::sync::Arc;

use cowfork_abi::FORK_FAILED;
use log::{info, warn};
use x86_64::VirtAddr;

use crate::fork::{self, ForkError};
use crate::memory::{self, FrameId, FramePool, MemoryError, WriteOutcome};
use crate::process::{PidAllocator, Process, ProcessError, ProcessId, ProcessInfo, ProcessState};
use crate::scheduler::Scheduler;

/// Runtime configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelConfig {
    /// Maximum number of live frames. `None` leaves the pool unbounded.
    pub frame_capacity: Option<usize>,
}

/// Errors from kernel-level process operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Process(ProcessError),
    Memory(MemoryError),
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::Process(err) => write!(f, "{err}"),
            KernelError::Memory(err) => write!(f, "{err}"),
        }
    }
}

impl core::error::Error for KernelError {}

impl From<ProcessError> for KernelError {
    fn from(err: ProcessError) -> Self {
        KernelError::Process(err)
    }
}

impl From<MemoryError> for KernelError {
    fn from(err: MemoryError) -> Self {
        KernelError::Memory(err)
    }
}

pub struct Kernel {
    frames: FramePool,
    scheduler: Scheduler,
    pids: PidAllocator,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        let frames = match config.frame_capacity {
            Some(capacity) => FramePool::with_capacity(capacity),
            None => FramePool::new(),
        };
        Self {
            frames,
            scheduler: Scheduler::new(),
            pids: PidAllocator::new(),
        }
    }

    pub fn frames(&self) -> &FramePool {
        &self.frames
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Register an empty process and queue it as ready.
    pub fn spawn(&mut self, name: &str) -> Result<ProcessId, ProcessError> {
        let pid = self.pids.next_pid().ok_or(ProcessError::PidExhausted)?;
        let mut process = Process::new(name);
        process.set_id(pid);
        self.scheduler.add_ready(process);
        info!("spawned PID {pid} ({name})");
        Ok(pid)
    }

    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.scheduler.get(pid)
    }

    pub fn process_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.scheduler.get_mut(pid)
    }

    /// Shared info for a live `pid`. The returned `Arc` outlives the process,
    /// so holders can still read the exit code after `exit`.
    pub fn process_info(&self, pid: ProcessId) -> Option<Arc<ProcessInfo>> {
        self.scheduler.get(pid).map(|p| p.info().clone())
    }

    /// Map `count` fresh pages into `pid`'s user window.
    pub fn map_user_pages(&mut self, pid: ProcessId, count: usize) -> Result<VirtAddr, KernelError> {
        let process = self.scheduler.get_mut(pid).ok_or(ProcessError::NotFound)?;
        Ok(process.map_user_pages(&self.frames, count)?)
    }

    pub fn unmap_user_page(&mut self, pid: ProcessId, vaddr: VirtAddr) -> Result<(), KernelError> {
        let process = self.scheduler.get_mut(pid).ok_or(ProcessError::NotFound)?;
        Ok(process.unmap_user_page(&self.frames, vaddr)?)
    }

    pub fn switch_to(&mut self, pid: ProcessId) -> Result<Option<isize>, ProcessError> {
        self.scheduler.switch_to(pid)
    }

    /// Fork `parent`.
    pub fn fork(&mut self, parent: ProcessId) -> Result<ProcessId, ForkError> {
        fork::fork(&mut self.scheduler, &self.frames, &self.pids, parent)
    }

    /// Fork the running process, returning the value the parent observes:
    /// the child's PID, or `FORK_FAILED`.
    pub fn sys_fork(&mut self) -> i64 {
        let Some(parent) = self.scheduler.current() else {
            warn!("sys_fork with no running process");
            return FORK_FAILED;
        };
        match self.fork(parent) {
            Ok(child) => child.as_u64() as i64,
            Err(err) => {
                warn!("PID {parent}: {err}");
                FORK_FAILED
            }
        }
    }

    pub fn read(&self, pid: ProcessId, vaddr: VirtAddr) -> Result<Vec<u8>, KernelError> {
        let process = self.scheduler.get(pid).ok_or(ProcessError::NotFound)?;
        Ok(memory::access::read(process, &self.frames, vaddr)?)
    }

    pub fn read_at(&self, pid: ProcessId, vaddr: VirtAddr, len: usize) -> Result<Vec<u8>, KernelError> {
        let process = self.scheduler.get(pid).ok_or(ProcessError::NotFound)?;
        Ok(memory::access::read_at(process, &self.frames, vaddr, len)?)
    }

    pub fn write(
        &mut self,
        pid: ProcessId,
        vaddr: VirtAddr,
        data: &[u8],
    ) -> Result<WriteOutcome, KernelError> {
        let process = self.scheduler.get_mut(pid).ok_or(ProcessError::NotFound)?;
        Ok(memory::access::write(process, &self.frames, vaddr, data)?)
    }

    /// Terminate `pid`: drop every frame reference and open file it holds and
    /// publish its exit code.
    pub fn exit(&mut self, pid: ProcessId, code: i32) -> Result<(), ProcessError> {
        let mut process = self.scheduler.remove(pid).ok_or(ProcessError::NotFound)?;
        process.set_state(ProcessState::Died);
        let freed = process.release_memory(&self.frames);
        process.close_all_files();
        process.info().set_exit_code(code);
        info!("PID {pid} exited with code {code}, freed {freed} frames");
        Ok(())
    }

    /// Number of page table entries, across all live processes, that point
    /// at `frame`.
    pub fn count_frame_references(&self, frame: FrameId) -> u32 {
        self.scheduler
            .processes()
            .flat_map(|p| p.page_table().iter())
            .filter(|(_, entry)| entry.frame == frame)
            .count() as u32
    }

    /// Check that every live frame's reference count matches the number of
    /// entries that map it, and that no entry maps a dead frame.
    pub fn reference_counts_consistent(&self) -> bool {
        let mut frames: Vec<FrameId> = self
            .scheduler
            .processes()
            .flat_map(|p| p.page_table().iter().map(|(_, entry)| entry.frame))
            .collect();
        frames.sort_unstable();
        frames.dedup();

        let all_match = frames
            .iter()
            .all(|&frame| self.frames.ref_count(frame) == Some(self.count_frame_references(frame)));
        all_match && frames.len() == self.frames.frames_in_use()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}
