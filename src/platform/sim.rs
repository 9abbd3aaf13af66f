/*!
 * Simulated Platform
 *
 * Host-side stand-ins for the hardware collaborators. The clock is advanced
 * manually so scheduling tests are deterministic; the interrupt controller
 * and address-space manager record every call so tests can assert on them.
 */

use super::{AddressSpaces, InterruptController, IpiTarget, MonotonicClock};
use crate::core::types::{AddressSpaceId, CoreId, Timestamp};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Manually advanced monotonic clock
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Timestamp) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Recording interrupt controller
#[derive(Default)]
pub struct SimInterruptController {
    armed: Mutex<Vec<(CoreId, Timestamp)>>,
    ipis: Mutex<Vec<IpiTarget>>,
    eois: AtomicU64,
}

impl SimInterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers armed so far, in call order
    pub fn armed(&self) -> Vec<(CoreId, Timestamp)> {
        self.armed.lock().clone()
    }

    /// Drain the recorded IPIs
    pub fn take_ipis(&self) -> Vec<IpiTarget> {
        std::mem::take(&mut *self.ipis.lock())
    }

    pub fn eoi_count(&self) -> u64 {
        self.eois.load(Ordering::Relaxed)
    }
}

impl InterruptController for SimInterruptController {
    fn arm_periodic(&self, core: CoreId, period: Timestamp) {
        self.armed.lock().push((core, period));
    }

    fn send_ipi(&self, target: IpiTarget) {
        self.ipis.lock().push(target);
    }

    fn end_of_interrupt(&self, _core: CoreId) {
        self.eois.fetch_add(1, Ordering::Relaxed);
    }
}

/// Address-space manager that tracks live spaces and per-core active spaces.
/// Space id 0 is the kernel address space and is never destroyed.
pub struct SimAddressSpaces {
    next: AtomicU64,
    live: Mutex<HashSet<AddressSpaceId>>,
    active: Mutex<Vec<AddressSpaceId>>,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl SimAddressSpaces {
    pub fn new(cores: usize) -> Self {
        Self {
            next: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            active: Mutex::new(vec![0; cores]),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
        }
    }

    /// Address space currently active on `core`
    pub fn active_on(&self, core: CoreId) -> AddressSpaceId {
        self.active.lock()[core]
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Spaces created but not yet destroyed
    pub fn outstanding(&self) -> u64 {
        self.created() - self.destroyed()
    }
}

impl AddressSpaces for SimAddressSpaces {
    fn kernel_space(&self) -> AddressSpaceId {
        0
    }

    fn create(&self) -> AddressSpaceId {
        let space = self.next.fetch_add(1, Ordering::SeqCst);
        self.live.lock().insert(space);
        self.created.fetch_add(1, Ordering::SeqCst);
        space
    }

    fn destroy(&self, space: AddressSpaceId) {
        assert_ne!(space, 0, "attempted to destroy the kernel address space");
        let removed = self.live.lock().remove(&space);
        assert!(removed, "double destroy of address space {space}");
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn switch(&self, core: CoreId, space: AddressSpaceId) {
        self.active.lock()[core] = space;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0);
        clock.advance(250);
        clock.advance(250);
        assert_eq!(clock.now(), 500);
    }

    #[test]
    fn test_spaces_counting() {
        let spaces = SimAddressSpaces::new(2);
        let a = spaces.create();
        let b = spaces.create();
        assert_eq!(spaces.outstanding(), 2);

        spaces.switch(1, b);
        assert_eq!(spaces.active_on(1), b);
        assert_eq!(spaces.active_on(0), 0);

        spaces.destroy(a);
        spaces.destroy(b);
        assert_eq!(spaces.outstanding(), 0);
    }

    #[test]
    #[should_panic(expected = "double destroy")]
    fn test_spaces_double_destroy_panics() {
        let spaces = SimAddressSpaces::new(1);
        let a = spaces.create();
        spaces.destroy(a);
        spaces.destroy(a);
    }
}
