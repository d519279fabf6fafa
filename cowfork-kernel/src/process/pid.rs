//! Process identifier allocation.
//!
//! PIDs come from a monotonically increasing atomic counter. A value is never
//! handed out twice, so no collision check or retry loop is needed, and
//! concurrent callers each get a distinct PID from a single atomic update.
//! When the range is used up the allocator reports exhaustion instead of
//! wrapping around onto PIDs that may still be live.

use core::sync::atomic::{AtomicU64, Ordering};

use cowfork_abi::{FIRST_PID, LAST_PID};

use super::ProcessId;

/// Allocator for unique process identifiers.
pub struct PidAllocator {
    next: AtomicU64,
    last: u64,
}

impl PidAllocator {
    /// Create an allocator over the default PID range.
    pub fn new() -> Self {
        Self::with_range(FIRST_PID, LAST_PID)
    }

    /// Create an allocator handing out `first..=last`.
    pub fn with_range(first: u64, last: u64) -> Self {
        assert!(first > 0, "PID 0 is reserved for unassigned records");
        assert!(first <= last, "empty PID range {first}..={last}");
        Self {
            next: AtomicU64::new(first),
            last,
        }
    }

    /// Claim the next PID, or `None` if the range is exhausted.
    pub fn next_pid(&self) -> Option<ProcessId> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| {
                (next <= self.last).then_some(next + 1)
            })
            .ok()
            .map(ProcessId::from_raw)
    }

    /// Number of PIDs still available.
    pub fn remaining(&self) -> u64 {
        (self.last + 1).saturating_sub(self.next.load(Ordering::Relaxed))
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
