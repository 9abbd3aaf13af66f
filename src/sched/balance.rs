/*!
 * Global Load Balancer
 *
 * Periodic cross-core redistribution of normal-priority threads toward the
 * average. Every core's lock is acquired in core-index order before any
 * queue is touched, and at most one thread moves per iteration, so the
 * cost of a pass is bounded and no two balancing paths can deadlock.
 *
 * Only the normal bucket participates: boosted and lowered threads are
 * transient (demotion returns them to normal within one slice), so
 * rebalancing them would move threads that are about to move themselves.
 */

use super::Kernel;
use crate::core::types::{CoreId, Timestamp};
use crate::task::thread::Thread;
use log::debug;
use std::sync::atomic::Ordering;

impl Kernel {
    /// Claim and run a balancing pass if the period has elapsed. Called
    /// from every core's timer tick; the compare-exchange ensures exactly
    /// one core runs the pass per period.
    pub(crate) fn maybe_balance(&self, now: Timestamp) {
        let deadline = self.next_balance.load(Ordering::SeqCst);
        if deadline > now {
            return;
        }

        let next = now + self.config.balance_period;
        if self
            .next_balance
            .compare_exchange(deadline, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.balance();
    }

    /// One full balancing pass over all cores.
    ///
    /// Computes the average normal-priority load (queued plus running),
    /// then repeatedly moves a single thread from an over-average core to
    /// an under-average one, stopping after the fixed iteration bound or
    /// as soon as no such pair exists. Thread count is conserved: a pop
    /// always lands in exactly one push.
    pub fn balance(&self) {
        let mut guards: Vec<_> = self
            .cores
            .iter()
            .map(|core| core.run().acquire(core.irq()))
            .collect();

        let total: usize = guards.iter().map(|rq| rq.normal_load()).sum();
        let average = total / guards.len();

        let mut moved = 0usize;
        for _ in 0..self.config.balance_iterations {
            let origin = guards
                .iter()
                .position(|rq| rq.normal_queue_len() > 0 && rq.normal_load() > average);
            let Some(origin) = origin else {
                break;
            };

            let target = guards
                .iter()
                .enumerate()
                .position(|(index, rq)| index != origin && rq.normal_load() < average);
            let Some(target) = target else {
                break;
            };

            let Some(thread) = guards[origin].pop_normal() else {
                break;
            };
            guards[target].push(thread);
            self.stats.inc_migrations();
            moved += 1;
        }

        self.stats.inc_balance_passes();
        if moved > 0 {
            debug!("balancer moved {moved} threads toward average {average}");
        }
    }

    /// Admit a thread on the least-loaded core. Load counts every priority
    /// bucket plus the running slot, so initial placement leaves the
    /// periodic balancer with less to do. All core locks are held for the
    /// scan-and-push, in the same fixed order as a balancing pass.
    pub fn push(&self, thread: Box<Thread>) -> CoreId {
        let mut guards: Vec<_> = self
            .cores
            .iter()
            .map(|core| core.run().acquire(core.irq()))
            .collect();

        let mut shortest = usize::MAX;
        let mut target: CoreId = 0;
        for (index, rq) in guards.iter().enumerate() {
            let load = rq.load();
            if load < shortest {
                shortest = load;
                target = index;
            }
        }

        debug!("thread {} placed on core {target}", thread.tid());
        guards[target].push(thread);
        drop(guards);

        self.kick(target);
        target
    }
}
