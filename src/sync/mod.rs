/*!
 * Synchronization Primitives
 * Ticket lock, interrupt-mask nesting, and the block/wake primitive
 */

pub mod blocker;
pub mod irq;
pub mod ticket;

pub use blocker::{BlockOutcome, BlockStatus, Blocker};
pub use irq::{IrqGuard, IrqMask};
pub use ticket::{TicketGuard, TicketLock};
