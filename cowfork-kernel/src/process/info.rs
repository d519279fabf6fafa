//! Process information visible to handle holders.
//!
//! ProcessInfo contains the external state of a process that persists after
//! the process exits, allowing a parent to retrieve the exit code once the
//! process record itself has been torn down.

use spinning_top::RwSpinlock;

use crate::process::ProcessId;

/// External process information accessible via handles.
///
/// Shared between the Process (which owns it) and any holder of an
/// `Arc<ProcessInfo>`. The info outlives the process record.
pub struct ProcessInfo {
    pid: ProcessId,
    parent: Option<ProcessId>,
    /// Exit code, set when process terminates. None while running.
    exit_code: RwSpinlock<Option<i32>>,
}

impl ProcessInfo {
    pub fn new(pid: ProcessId, parent: Option<ProcessId>) -> Self {
        Self {
            pid,
            parent,
            exit_code: RwSpinlock::new(None),
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn parent(&self) -> Option<ProcessId> {
        self.parent
    }

    /// Check if the process has exited.
    pub fn has_exited(&self) -> bool {
        self.exit_code.read().is_some()
    }

    /// Get the exit code if the process has exited.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.read()
    }

    /// Set the exit code when process terminates.
    pub fn set_exit_code(&self, code: i32) {
        *self.exit_code.write() = Some(code);
    }
}
