/*!
 * Tasks
 * Execution contexts, process records, and the schedulable thread unit
 */

pub mod context;
pub mod process;
pub mod thread;

pub use context::{CpuFlags, ExecutionContext, Segment, TrapFrame};
pub use process::{Process, ResourceTable};
pub use thread::{Thread, ThreadState};
