/*!
 * Trap Dispatch
 *
 * Entry point for every interrupt and software trap. The trap entry stub
 * (platform glue, outside this crate) saves the live frame and calls
 * `Kernel::trap` with the owning core's id; this module classifies the
 * vector and drives the local scheduling decision. Every path through here
 * either completes or panics; no partially-switched state survives a
 * trap, and nothing unwinds across the trap boundary.
 */

use crate::core::types::CoreId;
use crate::sched::{Ipi, Kernel};
use crate::task::context::TrapFrame;
use log::trace;

/// Vectors below this are CPU exceptions
pub const VECTOR_EXCEPTION_LIMIT: u8 = 32;

/// Periodic scheduler timer
pub const VECTOR_TIMER: u8 = 32;

/// Inter-processor interrupt; the payload is in the core's mailbox
pub const VECTOR_IPI: u8 = 33;

/// Software trap requesting an immediate reschedule (voluntary yield)
pub const VECTOR_YIELD: u8 = 34;

impl Kernel {
    /// Dispatch one trap on `core`. The frame's vector selects the path;
    /// scheduling-relevant vectors run the local tick or schedule routine,
    /// which may rewrite the frame to resume a different thread.
    pub fn trap(&self, core: CoreId, frame: &mut TrapFrame) {
        let cpu = &self.cores[core];
        let _masked = cpu.irq().guard();
        cpu.enter_trap();

        match frame.vector {
            vector if vector < VECTOR_EXCEPTION_LIMIT => self.exception(core, frame),
            VECTOR_TIMER => {
                self.intctl.end_of_interrupt(core);
                let now = self.clock.now();
                self.maybe_balance(now);

                let mut rq = cpu.run().acquire(cpu.irq());
                rq.tick(frame, now, self.spaces.as_ref(), &self.stats);
            }
            VECTOR_IPI => {
                while let Some(ipi) = cpu.take_ipi() {
                    match ipi {
                        Ipi::Reschedule => trace!("core {core}: reschedule ipi"),
                    }
                }
                self.intctl.end_of_interrupt(core);

                let now = self.clock.now();
                let mut rq = cpu.run().acquire(cpu.irq());
                rq.tick(frame, now, self.spaces.as_ref(), &self.stats);
            }
            VECTOR_YIELD => {
                let now = self.clock.now();
                let mut rq = cpu.run().acquire(cpu.irq());
                rq.schedule(frame, now, self.spaces.as_ref(), &self.stats);
            }
            vector => panic!("unknown vector {vector} on core {core}: {frame:?}"),
        }

        cpu.leave_trap();
    }

    fn exception(&self, core: CoreId, frame: &mut TrapFrame) -> ! {
        if frame.stack_segment.is_kernel() {
            panic!("exception {} on core {core}: {frame:?}", frame.vector);
        } else {
            panic!(
                "unhandled user exception {} on core {core}: {frame:?}",
                frame.vector
            );
        }
    }

    /// Voluntarily give up the rest of the current slice
    pub fn yield_now(&self, core: CoreId, frame: &mut TrapFrame) {
        frame.vector = VECTOR_YIELD;
        self.trap(core, frame);
    }

    /// Deliver one periodic timer interrupt to `core`
    pub fn timer_interrupt(&self, core: CoreId, frame: &mut TrapFrame) {
        frame.vector = VECTOR_TIMER;
        self.trap(core, frame);
    }

    /// Deliver a pending inter-processor interrupt to `core`
    pub fn ipi_interrupt(&self, core: CoreId, frame: &mut TrapFrame) {
        frame.vector = VECTOR_IPI;
        self.trap(core, frame);
    }

    /// The cancellation safe point, called on the way back to user mode.
    /// A running thread whose process has been killed exits here: it is
    /// detached from the running slot, a successor is chosen, and the
    /// thread is reaped. Threads are never torn down mid-preemption.
    pub fn syscall_return(&self, core: CoreId, frame: &mut TrapFrame) {
        let cpu = &self.cores[core];
        let _masked = cpu.irq().guard();

        let mut rq = cpu.run().acquire(cpu.irq());
        if !rq.running_process_killed() {
            return;
        }

        let now = self.clock.now();
        let thread = rq.exit_running(frame, now, self.spaces.as_ref(), &self.stats);
        drop(rq);
        self.reap(thread);
    }

    /// Terminate the thread running on `core` (the exit syscall)
    pub fn exit(&self, core: CoreId, frame: &mut TrapFrame) {
        let cpu = &self.cores[core];
        let _masked = cpu.irq().guard();

        let now = self.clock.now();
        let mut rq = cpu.run().acquire(cpu.irq());
        let thread = rq.exit_running(frame, now, self.spaces.as_ref(), &self.stats);
        drop(rq);
        self.reap(thread);
    }
}
