/*!
 * Ticket Lock
 *
 * FIFO-fair spinlock owning its data. Two monotonically increasing counters:
 * each acquirer takes the next ticket and spins until `now_serving` reaches
 * it; release increments `now_serving`. Acquisition order is exactly ticket
 * order, so no waiter starves. Acquisition masks interrupts on the local
 * core for the duration of the critical section, so the holder cannot be
 * preempted on its own core while other cores keep spinning toward their
 * ticket.
 *
 * Counter wraparound is harmless: it reorders only requests separated by
 * the full 32-bit range.
 */

use super::irq::IrqMask;
use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

pub struct TicketLock<T> {
    next_ticket: AtomicU32,
    now_serving: AtomicU32,
    data: UnsafeCell<T>,
}

// The guard hands out &mut T only while the ticket is held.
unsafe impl<T: Send> Send for TicketLock<T> {}
unsafe impl<T: Send> Sync for TicketLock<T> {}

impl<T> TicketLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Take a ticket and spin until served. `irq` must be the mask of the
    /// core this call executes on; it stays masked until the guard drops.
    pub fn acquire<'a>(&'a self, irq: &'a IrqMask) -> TicketGuard<'a, T> {
        irq.push();

        // Overflow does not matter
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != ticket {
            hint::spin_loop();
        }

        TicketGuard { lock: self, irq }
    }

    /// Tickets handed out but not yet released. Approximate under contention.
    pub fn waiters(&self) -> u32 {
        self.next_ticket
            .load(Ordering::Relaxed)
            .wrapping_sub(self.now_serving.load(Ordering::Relaxed))
    }
}

/// Scoped acquisition: releases the ticket and unmasks interrupts on every
/// exit path, including early return.
#[must_use = "dropping the guard immediately releases the lock"]
pub struct TicketGuard<'a, T> {
    lock: &'a TicketLock<T>,
    irq: &'a IrqMask,
}

impl<T> Deref for TicketGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for TicketGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for TicketGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.now_serving.fetch_add(1, Ordering::Release);
        self.irq.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_masks_interrupts() {
        let irq = IrqMask::new();
        let lock = TicketLock::new(0u64);

        {
            let mut guard = lock.acquire(&irq);
            *guard += 1;
            assert!(!irq.enabled());
        }
        assert!(irq.enabled());
        assert_eq!(*lock.acquire(&irq), 1);
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        let irq = IrqMask::new();
        let lock = TicketLock::new(());

        let attempt = |fail: bool| -> Result<(), ()> {
            let _guard = lock.acquire(&irq);
            if fail {
                return Err(());
            }
            Ok(())
        };

        assert!(attempt(true).is_err());
        assert_eq!(lock.waiters(), 0);
        assert!(irq.enabled());
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = Arc::new(TicketLock::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    // Each spinning context models a separate core
                    let irq = IrqMask::new();
                    for _ in 0..1000 {
                        let mut guard = lock.acquire(&irq);
                        *guard += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let irq = IrqMask::new();
        assert_eq!(*lock.acquire(&irq), 4000);
    }
}
