//! Saved execution point handed to the scheduler.

use cowfork_abi::FORK_CHILD_RETURN;

/// Where a process continues when it is next switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Return from the interrupt that entered the kernel, straight back into
    /// user code. A forked child starts here, so it appears to return from
    /// the same fork call as its parent.
    InterruptExit,
}

/// Register state needed to resume a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeContext {
    /// Value the process observes in its return register.
    pub return_value: isize,
    /// Where execution continues.
    pub resume_point: ResumePoint,
}

impl ResumeContext {
    /// Context for a freshly forked child: fork returns 0 and execution falls
    /// through to user mode.
    pub fn forked_child() -> Self {
        Self {
            return_value: FORK_CHILD_RETURN,
            resume_point: ResumePoint::InterruptExit,
        }
    }
}
