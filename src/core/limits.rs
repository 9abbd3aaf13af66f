/*!
 * System Limits and Constants
 *
 * Centralized location for all tunables of the scheduling core.
 * Values include rationale comments explaining why they exist.
 */

use super::types::{Priority, Timestamp};

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

// =============================================================================
// PRIORITIES
// =============================================================================

/// Number of priority buckets per core.
/// Fixed at compile time; out-of-range priorities are a programmer error.
pub const PRIORITY_LEVELS: usize = 4;

pub const PRIORITY_MIN: Priority = 0;

/// Default bucket. Preempted threads are demoted back to this level so a
/// boosted thread cannot keep its boost across slices.
pub const PRIORITY_NORMAL: Priority = 1;

pub const PRIORITY_MAX: Priority = (PRIORITY_LEVELS - 1) as Priority;

// =============================================================================
// TIME
// =============================================================================

/// Maximum time a thread may run before involuntary preemption
pub const TIME_SLICE: Timestamp = NANOS_PER_SEC / 2;

/// Periodic scheduler interrupt interval (1024 Hz)
pub const TICK_PERIOD: Timestamp = NANOS_PER_SEC / 1024;

/// Interval between cross-core balancing passes
pub const BALANCE_PERIOD: Timestamp = NANOS_PER_SEC / 10;

/// Upper bound on threads moved per balancing pass.
/// Bounds the time all core locks are held and avoids thrashing.
pub const BALANCE_ITERATIONS: usize = 8;

/// Sentinel deadline for blockers without a timeout
pub const DEADLINE_INFINITE: Timestamp = Timestamp::MAX;

// =============================================================================
// STACKS
// =============================================================================

pub const PAGE_SIZE: usize = 4096;

/// Private kernel-mode stack owned by each thread (and each core's idle path)
pub const KERNEL_STACK_SIZE: usize = PAGE_SIZE;

/// Fixed top of the user stack region in every address space
pub const USER_STACK_TOP: u64 = 0x0000_8000_0000_0000 - PAGE_SIZE as u64;

// =============================================================================
// RESOURCE EXHAUSTION
// =============================================================================

/// Live processes the kernel will track before spawn starts failing
pub const MAX_PROCESSES: usize = 1024;

/// Live threads across all processes before spawn starts failing
pub const MAX_THREADS: usize = 4096;
