/*!
 * Execution Context
 *
 * The flat register/segment/address-space snapshot of one suspended unit of
 * execution. A context switch is two byte-for-byte copies: save the old
 * thread's snapshot out of the live trap frame, restore the new thread's
 * snapshot into it. Copies, never aliases: two live frames never share
 * memory, and no intermediate state is observable off-core because the
 * whole exchange happens inside the trap handler with interrupts masked.
 */

use crate::core::types::AddressSpaceId;
use bitflags::bitflags;

bitflags! {
    /// CPU flags word. Fresh frames get RESERVED | INTERRUPT_ENABLE (0x202)
    /// so a resumed thread always runs with interrupts deliverable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuFlags: u64 {
        const RESERVED = 1 << 1;
        const INTERRUPT_ENABLE = 1 << 9;
    }
}

impl CpuFlags {
    pub const fn fresh() -> Self {
        Self::RESERVED.union(Self::INTERRUPT_ENABLE)
    }
}

/// Segment selectors with their privilege level encoded in the low bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Segment {
    KernelCode = 0x08,
    KernelData = 0x10,
    UserCode = 0x1b,
    UserData = 0x23,
}

impl Segment {
    /// Whether this selector runs at kernel privilege
    pub const fn is_kernel(self) -> bool {
        matches!(self, Segment::KernelCode | Segment::KernelData)
    }
}

/// The live register snapshot pushed by the trap entry stub and consumed by
/// the trap return path. The scheduler rewrites it to switch threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    pub vector: u8,
    pub instruction_pointer: u64,
    pub stack_pointer: u64,
    pub code_segment: Segment,
    pub stack_segment: Segment,
    pub flags: CpuFlags,
    pub address_space: AddressSpaceId,
}

impl TrapFrame {
    /// A fresh user-mode frame entering at `entry`
    pub fn user(entry: u64, stack_top: u64, space: AddressSpaceId) -> Self {
        Self {
            vector: 0,
            instruction_pointer: entry,
            stack_pointer: stack_top,
            code_segment: Segment::UserCode,
            stack_segment: Segment::UserData,
            flags: CpuFlags::fresh(),
            address_space: space,
        }
    }

    /// A kernel-mode frame, used for the idle loop
    pub fn kernel(entry: u64, stack_top: u64, space: AddressSpaceId) -> Self {
        Self {
            vector: 0,
            instruction_pointer: entry,
            stack_pointer: stack_top,
            code_segment: Segment::KernelCode,
            stack_segment: Segment::KernelData,
            flags: CpuFlags::fresh(),
            address_space: space,
        }
    }
}

/// A thread's owned snapshot, exchanged with the live frame at every switch
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    frame: TrapFrame,
}

impl ExecutionContext {
    pub fn new(frame: TrapFrame) -> Self {
        Self { frame }
    }

    /// Copy the live frame into this context
    pub fn save(&mut self, live: &TrapFrame) {
        self.frame = *live;
    }

    /// Copy this context into the live frame
    pub fn restore(&self, live: &mut TrapFrame) {
        *live = self.frame;
    }

    pub fn address_space(&self) -> AddressSpaceId {
        self.frame.address_space
    }

    pub fn frame(&self) -> &TrapFrame {
        &self.frame
    }
}
