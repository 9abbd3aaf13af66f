/*!
 * Per-Core State
 *
 * One `Core` per physical processor, created once at multi-core bring-up
 * and never destroyed. Each owns its interrupt mask, the ticket lock
 * protecting its run queue, a lock-free IPI mailbox, a trap-depth counter,
 * and the kernel stack its idle path runs on.
 */

use super::local::RunQueue;
use crate::core::limits::KERNEL_STACK_SIZE;
use crate::core::types::{AddressSpaceId, CoreId, Timestamp};
use crate::sync::{IrqMask, TicketLock};
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicU32, Ordering};

/// Inter-processor requests delivered through a core's mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipi {
    /// Re-run the local scheduling decision: a thread was pushed or woken
    /// on this core from another core
    Reschedule,
}

/// The idle loop every core falls back to when it has nothing runnable.
/// Only its address matters to the scheduler; the frame built for an idle
/// core points here.
pub extern "C" fn idle_loop() -> ! {
    loop {
        std::hint::spin_loop();
    }
}

pub struct Core {
    id: CoreId,
    irq: IrqMask,
    run: TicketLock<RunQueue>,
    mailbox: SegQueue<Ipi>,
    trap_depth: AtomicU32,
    // Backs the idle frame's stack pointer; owned for the kernel's lifetime
    #[allow(dead_code)]
    kernel_stack: Box<[u8]>,
}

impl Core {
    pub(crate) fn new(id: CoreId, time_slice: Timestamp, kernel_space: AddressSpaceId) -> Self {
        let kernel_stack = vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice();
        let stack_top = kernel_stack.as_ptr() as u64 + KERNEL_STACK_SIZE as u64;
        let run = RunQueue::new(id, time_slice, idle_loop as usize as u64, stack_top, kernel_space);

        Self {
            id,
            irq: IrqMask::new(),
            run: TicketLock::new(run),
            mailbox: SegQueue::new(),
            trap_depth: AtomicU32::new(0),
            kernel_stack,
        }
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn irq(&self) -> &IrqMask {
        &self.irq
    }

    pub(crate) fn run(&self) -> &TicketLock<RunQueue> {
        &self.run
    }

    pub(crate) fn post(&self, ipi: Ipi) {
        self.mailbox.push(ipi);
    }

    pub(crate) fn take_ipi(&self) -> Option<Ipi> {
        self.mailbox.pop()
    }

    pub(crate) fn enter_trap(&self) {
        self.trap_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn leave_trap(&self) {
        let prev = self.trap_depth.fetch_sub(1, Ordering::SeqCst);
        if prev == 0 {
            panic!("trap depth underflow on core {}", self.id);
        }
    }

    pub fn trap_depth(&self) -> u32 {
        self.trap_depth.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_order() {
        let core = Core::new(0, 1000, 0);
        core.post(Ipi::Reschedule);
        core.post(Ipi::Reschedule);
        assert_eq!(core.take_ipi(), Some(Ipi::Reschedule));
        assert_eq!(core.take_ipi(), Some(Ipi::Reschedule));
        assert_eq!(core.take_ipi(), None);
    }

    #[test]
    fn test_trap_depth_tracking() {
        let core = Core::new(0, 1000, 0);
        core.enter_trap();
        core.enter_trap();
        assert_eq!(core.trap_depth(), 2);
        core.leave_trap();
        core.leave_trap();
        assert_eq!(core.trap_depth(), 0);
    }

    #[test]
    #[should_panic(expected = "trap depth underflow")]
    fn test_trap_depth_underflow_panics() {
        let core = Core::new(0, 1000, 0);
        core.leave_trap();
    }
}
