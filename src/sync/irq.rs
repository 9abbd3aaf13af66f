/*!
 * Interrupt Masking
 *
 * Per-core interrupt-disable state with nesting. Only the outermost `push`
 * records the pre-existing enable flag, and only the matching `pop` restores
 * it, so nested critical sections compose. Underflow is a programmer error
 * and panics.
 */

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Per-core interrupt-enable state. One instance per core; only code
/// executing on that core manipulates it, which is what makes the
/// save-on-outermost discipline sound.
#[derive(Debug)]
pub struct IrqMask {
    enabled: AtomicBool,
    depth: AtomicU32,
    saved: AtomicBool,
}

impl Default for IrqMask {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqMask {
    /// Cores come up with interrupts enabled
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            depth: AtomicU32::new(0),
            saved: AtomicBool::new(false),
        }
    }

    /// Mask interrupts, incrementing the nesting depth
    pub fn push(&self) {
        let was_enabled = self.enabled.swap(false, Ordering::SeqCst);
        if self.depth.fetch_add(1, Ordering::SeqCst) == 0 {
            self.saved.store(was_enabled, Ordering::SeqCst);
        }
    }

    /// Decrement the nesting depth, restoring the saved enable flag at zero
    pub fn pop(&self) {
        let depth = self.depth.load(Ordering::SeqCst);
        if depth == 0 {
            panic!("interrupt mask underflow");
        }

        self.depth.store(depth - 1, Ordering::SeqCst);
        if depth == 1 && self.saved.load(Ordering::SeqCst) {
            self.enabled.store(true, Ordering::SeqCst);
        }
    }

    /// Whether interrupts are currently deliverable on this core
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::SeqCst)
    }

    /// Scope-bound mask: pops on every exit path
    pub fn guard(&self) -> IrqGuard<'_> {
        self.push();
        IrqGuard { mask: self }
    }
}

/// RAII interrupt mask, the scoped form of `push`/`pop`
#[must_use = "dropping the guard immediately unmasks interrupts"]
pub struct IrqGuard<'a> {
    mask: &'a IrqMask,
}

impl Drop for IrqGuard<'_> {
    fn drop(&mut self) {
        self.mask.pop();
    }
}
