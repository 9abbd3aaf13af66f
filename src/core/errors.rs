/*!
 * Error Types
 * Recoverable failures of the scheduling core
 *
 * Contract violations (out-of-range priority, interrupt-mask underflow,
 * unknown trap vectors) are not represented here; they panic with the
 * offending state attached, because continuing with corrupted scheduler
 * invariants risks silent corruption on every core.
 */

use super::types::Pid;
use thiserror::Error;

/// Result of operations that can fail for runtime reasons
pub type SchedResult<T> = Result<T, SpawnError>;

/// Resource-exhaustion failures reported to the caller that requested
/// creation. The scheduler itself never retries allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error("process limit reached: {current} of {limit}")]
    ProcessLimit { current: usize, limit: usize },

    #[error("thread limit reached: {current} of {limit}")]
    ThreadLimit { current: usize, limit: usize },

    #[error("process {0} not found")]
    ProcessNotFound(Pid),
}
