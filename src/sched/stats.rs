/*!
 * Scheduler Statistics
 * Lock-free atomic counters for the hot scheduling paths
 */

use crate::core::types::{CoreId, Pid, Priority, Tid};
use crate::sync::blocker::BlockStatus;
use crate::task::thread::ThreadState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated from the scheduling hot paths. Relaxed ordering
/// throughout; a snapshot is accurate per counter, not across counters.
#[derive(Debug, Default)]
pub struct SchedStats {
    context_switches: AtomicU64,
    preemptions: AtomicU64,
    wakes: AtomicU64,
    timeouts: AtomicU64,
    migrations: AtomicU64,
    balance_passes: AtomicU64,
}

impl SchedStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub(crate) fn inc_switches(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_preemptions(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_wakes(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_migrations(&self) {
        self.migrations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn inc_balance_passes(&self) {
        self.balance_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            context_switches: self.context_switches.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
            balance_passes: self.balance_passes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub context_switches: u64,
    pub preemptions: u64,
    pub wakes: u64,
    pub timeouts: u64,
    pub migrations: u64,
    pub balance_passes: u64,
}

/// Where one thread currently lives, as reported by `Kernel::thread_stats`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStat {
    pub tid: Tid,
    pub pid: Pid,
    pub core: CoreId,
    pub priority: Priority,
    pub state: ThreadState,
    pub block_status: Option<BlockStatus>,
}
