//! Shared constants between the kernel core and its collaborators.
//!
//! This crate holds the build-time configuration that every part of the
//! simulation must agree on: page geometry, the layout of the user virtual
//! address window, process defaults and the fork return convention.

#![no_std]

// =============================================================================
// Page geometry
// =============================================================================

/// Size of a physical frame and of a virtual page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE as u64 - 1;

// =============================================================================
// User virtual address window
// =============================================================================

/// First virtual address handed out to user programs.
pub const USER_VADDR_START: u64 = 0x0804_8000;

/// Size of the per-process virtual address bitmap, in bytes.
/// Each bit tracks one page, so the window spans `8 * USER_VADDR_BITMAP_BYTES` pages.
pub const USER_VADDR_BITMAP_BYTES: usize = 1024;

/// Number of page slots in the user virtual address window.
pub const USER_VADDR_PAGES: usize = USER_VADDR_BITMAP_BYTES * 8;

// =============================================================================
// Processes
// =============================================================================

/// Priority given to freshly created processes. A process's tick budget is
/// reset to its priority whenever it becomes ready.
pub const DEFAULT_PRIORITY: u8 = 10;

/// Lowest PID handed out by the allocator. Values below are reserved.
pub const FIRST_PID: u64 = 100;

/// Highest PID the allocator will hand out before reporting exhaustion.
pub const LAST_PID: u64 = 65535;

/// Suffix appended to a parent's name to form its forked child's name.
pub const FORK_NAME_SUFFIX: &str = "_fork";

// =============================================================================
// Fork return convention
// =============================================================================

/// Value a forked child observes as the result of its fork call.
pub const FORK_CHILD_RETURN: isize = 0;

/// Value returned to the caller when fork fails.
pub const FORK_FAILED: i64 = -1;
