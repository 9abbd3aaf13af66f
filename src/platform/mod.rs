/*!
 * Platform Collaborators
 *
 * The scheduling core never programs hardware itself; it consumes these
 * three interfaces from the interrupt-controller, address-space, and time
 * layers. Implementations are injected at kernel construction as trait
 * objects, so the core is identical whether it drives real hardware glue
 * or the simulated platform used by the demo binary and the test suite.
 */

mod sim;

pub use sim::{ManualClock, SimAddressSpaces, SimInterruptController};

use crate::core::types::{AddressSpaceId, CoreId, Timestamp};

/// Destination of an inter-processor interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiTarget {
    One(CoreId),
    AllExcept(CoreId),
    All,
}

/// Monotonic time source. Deadlines are absolute values of this clock, so a
/// wake check after an arbitrarily long delay is still interpreted correctly.
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Interrupt-controller operations consumed from the tick and cross-core
/// signaling paths. Routing and vector setup belong to the controller layer.
pub trait InterruptController: Send + Sync {
    /// Arm the periodic scheduler timer on one core
    fn arm_periodic(&self, core: CoreId, period: Timestamp);

    /// Send an inter-processor interrupt
    fn send_ipi(&self, target: IpiTarget);

    /// Acknowledge the interrupt currently being serviced on `core`
    fn end_of_interrupt(&self, core: CoreId);
}

/// Address-space operations, invoked exactly at context-switch and
/// process-teardown points.
pub trait AddressSpaces: Send + Sync {
    /// The address space every core idles in
    fn kernel_space(&self) -> AddressSpaceId;

    /// Create an empty address space
    fn create(&self) -> AddressSpaceId;

    /// Destroy an address space and everything mapped into it
    fn destroy(&self, space: AddressSpaceId);

    /// Make `space` the active address space on `core`
    fn switch(&self, core: CoreId, space: AddressSpaceId);
}
