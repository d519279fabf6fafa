//! Process set and ready queue.
//!
//! The scheduler owns every live [`Process`] record. Queue membership is
//! tracked by PID in the scheduler's own containers; process records carry
//! no link fields. Context switching is modelled: switching to a process
//! consumes its saved [`ResumeContext`](crate::process::ResumeContext) and
//! reports the value the process observes on resumption.

use std::collections::{BTreeMap, VecDeque};

use log::{debug, trace};

use crate::process::{Process, ProcessError, ProcessId, ProcessState};

#[derive(Default)]
pub struct Scheduler {
    processes: BTreeMap<ProcessId, Process>,
    ready: VecDeque<ProcessId>,
    current: Option<ProcessId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process to the global process set. It is not queued; see
    /// [`Scheduler::enqueue_ready`].
    ///
    /// # Panics
    ///
    /// Panics if a process with the same PID is already registered.
    pub fn add(&mut self, process: Process) {
        let pid = process.id();
        if self.processes.insert(pid, process).is_some() {
            panic!("Process with PID {pid:?} already registered");
        }
        debug!("scheduler: added PID {pid}");
    }

    /// Add a process to the set and append it to the ready queue.
    pub fn add_ready(&mut self, mut process: Process) -> ProcessId {
        let pid = process.id();
        process.set_state(ProcessState::Ready);
        self.add(process);
        self.ready.push_back(pid);
        pid
    }

    /// Mark a registered process ready and append it to the ready queue.
    pub fn enqueue_ready(&mut self, pid: ProcessId) -> Result<(), ProcessError> {
        let process = self.processes.get_mut(&pid).ok_or(ProcessError::NotFound)?;
        process.set_state(ProcessState::Ready);
        if !self.ready.contains(&pid) {
            self.ready.push_back(pid);
        }
        trace!("scheduler: PID {pid} ready");
        Ok(())
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    /// The process currently marked running, if any.
    pub fn current(&self) -> Option<ProcessId> {
        self.current
    }

    /// Make `pid` the running process.
    ///
    /// The previously running process, if any and different, goes back to the
    /// ready queue.
    pub fn set_current(&mut self, pid: ProcessId) -> Result<(), ProcessError> {
        if !self.processes.contains_key(&pid) {
            return Err(ProcessError::NotFound);
        }

        if let Some(previous) = self.current.filter(|&prev| prev != pid) {
            if self.processes.contains_key(&previous) {
                self.enqueue_ready(previous)?;
            }
        }

        self.ready.retain(|&queued| queued != pid);
        let Some(process) = self.processes.get_mut(&pid) else {
            panic!("No process exists with PID {pid:?}");
        };
        process.set_state(ProcessState::Running);
        self.current = Some(pid);
        Ok(())
    }

    /// Switch to `pid` and resume its saved context.
    ///
    /// Returns the value the process observes in its return register, or
    /// `None` if it had no saved context (it was already running, or was
    /// never suspended).
    pub fn switch_to(&mut self, pid: ProcessId) -> Result<Option<isize>, ProcessError> {
        self.set_current(pid)?;
        let Some(process) = self.processes.get_mut(&pid) else {
            panic!("No process exists with PID {pid:?}");
        };
        let context = process.take_context();
        debug!("scheduler: switched to PID {pid} ({context:?})");
        Ok(context.map(|ctx| ctx.return_value))
    }

    /// Take the process at the head of the ready queue.
    pub fn pick_next(&mut self) -> Option<ProcessId> {
        self.ready.pop_front()
    }

    /// Remove a process from the set and from every queue, returning it.
    pub fn remove(&mut self, pid: ProcessId) -> Option<Process> {
        self.ready.retain(|&queued| queued != pid);
        if self.current == Some(pid) {
            self.current = None;
        }
        self.processes.remove(&pid)
    }

    /// PIDs waiting to run, head first.
    pub fn ready_queue(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.ready.iter().copied()
    }

    /// All registered processes in PID order.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}
