/*!
 * Multi-Core Scheduler
 *
 * The kernel facade over the per-core schedulers: one `Core` per physical
 * processor in a fixed array indexed by core id, the process registry, the
 * global balancer, and the block/wake operations every other kernel
 * subsystem builds on. Cross-core access always goes through the target
 * core's own ticket lock; no raw handle to another core's queues exists.
 */

pub mod balance;
pub mod cpu;
pub mod local;
pub mod stats;

pub use cpu::{idle_loop, Core, Ipi};
pub use stats::{SchedStats, StatsSnapshot, ThreadStat};

use crate::core::errors::{SchedResult, SpawnError};
use crate::core::limits::{
    BALANCE_ITERATIONS, BALANCE_PERIOD, MAX_PROCESSES, MAX_THREADS, TICK_PERIOD, TIME_SLICE,
};
use crate::core::types::{ChannelId, CoreId, Pid, Priority, Tid, Timestamp};
use crate::platform::{AddressSpaces, InterruptController, IpiTarget, MonotonicClock};
use crate::sync::blocker::{BlockOutcome, BlockStatus, Blocker};
use crate::task::context::TrapFrame;
use crate::task::process::Process;
use crate::task::thread::Thread;
use ahash::RandomState;
use dashmap::DashMap;
use log::info;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Scheduler tunables, defaulted from `core::limits`
#[derive(Debug, Clone)]
pub struct SchedConfig {
    pub cores: usize,
    pub time_slice: Timestamp,
    pub tick_period: Timestamp,
    pub balance_period: Timestamp,
    pub balance_iterations: usize,
    pub max_processes: usize,
    pub max_threads: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            cores: 1,
            time_slice: TIME_SLICE,
            tick_period: TICK_PERIOD,
            balance_period: BALANCE_PERIOD,
            balance_iterations: BALANCE_ITERATIONS,
            max_processes: MAX_PROCESSES,
            max_threads: MAX_THREADS,
        }
    }
}

impl SchedConfig {
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }

    pub fn with_time_slice(mut self, time_slice: Timestamp) -> Self {
        self.time_slice = time_slice;
        self
    }

    pub fn with_balance_period(mut self, balance_period: Timestamp) -> Self {
        self.balance_period = balance_period;
        self
    }
}

pub struct Kernel {
    pub(crate) cores: Box<[Core]>,
    pub(crate) config: SchedConfig,
    pub(crate) stats: SchedStats,
    pub(crate) next_balance: AtomicU64,
    processes: DashMap<Pid, Arc<Process>, RandomState>,
    next_pid: AtomicU32,
    next_tid: Arc<AtomicU64>,
    next_channel: AtomicU64,
    live_processes: AtomicUsize,
    live_threads: AtomicUsize,
    pub(crate) clock: Arc<dyn MonotonicClock>,
    pub(crate) intctl: Arc<dyn InterruptController>,
    pub(crate) spaces: Arc<dyn AddressSpaces>,
}

impl Kernel {
    /// Bring up one scheduler instance per core and arm each core's
    /// periodic timer through the interrupt controller.
    pub fn new(
        config: SchedConfig,
        clock: Arc<dyn MonotonicClock>,
        intctl: Arc<dyn InterruptController>,
        spaces: Arc<dyn AddressSpaces>,
    ) -> Self {
        assert!(config.cores >= 1, "kernel needs at least one core");

        let kernel_space = spaces.kernel_space();
        let cores: Box<[Core]> = (0..config.cores)
            .map(|id| Core::new(id, config.time_slice, kernel_space))
            .collect();

        for core in cores.iter() {
            intctl.arm_periodic(core.id(), config.tick_period);
        }

        info!(
            "scheduler online: {} cores, {}ns slice, balancing every {}ns",
            config.cores, config.time_slice, config.balance_period
        );

        Self {
            cores,
            config,
            stats: SchedStats::new(),
            next_balance: AtomicU64::new(0),
            processes: DashMap::with_hasher(RandomState::new()),
            next_pid: AtomicU32::new(1),
            next_tid: Arc::new(AtomicU64::new(1)),
            next_channel: AtomicU64::new(1),
            live_processes: AtomicUsize::new(0),
            live_threads: AtomicUsize::new(0),
            clock,
            intctl,
            spaces,
        }
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a process with zero threads
    pub fn process_new(&self) -> SchedResult<Arc<Process>> {
        let limit = self.config.max_processes;
        self.live_processes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < limit).then_some(count + 1)
            })
            .map_err(|count| SpawnError::ProcessLimit { current: count, limit })?;

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = Process::new(pid, Arc::clone(&self.next_tid), Arc::clone(&self.spaces));
        self.processes.insert(pid, Arc::clone(&process));
        info!("process {pid} spawned");
        Ok(process)
    }

    /// Create a thread entering user mode at `entry`. The thread is not
    /// runnable until admitted with `push` or `push_local`. Panics on an
    /// out-of-range priority; reports exhaustion as an error.
    pub fn thread_new(
        &self,
        process: &Arc<Process>,
        entry: u64,
        priority: Priority,
    ) -> SchedResult<Box<Thread>> {
        let limit = self.config.max_threads;
        self.live_threads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < limit).then_some(count + 1)
            })
            .map_err(|count| SpawnError::ThreadLimit { current: count, limit })?;

        Ok(Thread::new(process, entry, priority))
    }

    /// Release a thread that was never admitted (or has been detached)
    pub fn thread_free(&self, thread: Box<Thread>) {
        self.reap(thread);
    }

    pub(crate) fn reap(&self, thread: Box<Thread>) {
        let pid = thread.process().pid();
        if thread.process().detach_thread() {
            self.processes.remove(&pid);
            self.live_processes.fetch_sub(1, Ordering::SeqCst);
            info!("process {pid} exited");
        }
        self.live_threads.fetch_sub(1, Ordering::SeqCst);
        drop(thread);
    }

    pub fn process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.get(&pid).map(|entry| Arc::clone(entry.value()))
    }

    /// Flag every thread of `pid` to exit at its next safe point, and prod
    /// every core so threads of the process reach one soon
    pub fn kill_process(&self, pid: Pid) -> bool {
        match self.processes.get(&pid) {
            Some(process) => {
                process.kill();
                for core in self.cores.iter() {
                    core.post(Ipi::Reschedule);
                }
                self.intctl.send_ipi(IpiTarget::All);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit a thread on one specific core, bypassing placement
    pub fn push_local(&self, core: CoreId, thread: Box<Thread>) {
        let cpu = &self.cores[core];
        let mut rq = cpu.run().acquire(cpu.irq());
        rq.push(thread);
    }

    /// Prod `core` to re-run its scheduling decision
    pub(crate) fn kick(&self, core: CoreId) {
        self.cores[core].post(Ipi::Reschedule);
        self.intctl.send_ipi(IpiTarget::One(core));
    }

    // ------------------------------------------------------------------
    // Blocking
    // ------------------------------------------------------------------

    /// Allocate a wake channel for a queue of waiters
    pub fn new_channel(&self) -> ChannelId {
        self.next_channel.fetch_add(1, Ordering::SeqCst)
    }

    /// Block the thread running on `core` until the blocker's predicate
    /// holds, its channel is notified, or its deadline passes.
    ///
    /// `held` is the caller's lock guard protecting the predicate's state;
    /// it is released only after the blocker is recorded under the core
    /// lock, so a producer firing in between is seen by the next sweep
    /// rather than lost. If the predicate is already true the thread never
    /// suspends and the caller proceeds with status Normal.
    pub fn block_running<G>(
        &self,
        core: CoreId,
        frame: &mut TrapFrame,
        mut blocker: Blocker,
        held: G,
    ) -> BlockOutcome {
        if blocker.is_satisfied() {
            drop(held);
            return BlockOutcome::Satisfied;
        }

        let cpu = &self.cores[core];
        let now = self.clock.now();
        let mut rq = cpu.run().acquire(cpu.irq());
        rq.park_running(frame, blocker, now);
        drop(held);
        rq.schedule(frame, now, self.spaces.as_ref(), &self.stats);
        BlockOutcome::Parked
    }

    /// Move one specific blocked thread back to its priority's ready
    /// queue. Safe to call from interrupt context on any core.
    pub fn unblock(&self, tid: Tid) -> bool {
        for cpu in self.cores.iter() {
            let mut rq = cpu.run().acquire(cpu.irq());
            if rq.unblock(tid, &self.stats) {
                drop(rq);
                self.kick(cpu.id());
                return true;
            }
        }
        false
    }

    /// Wake every thread blocked on `channel`. Wake is a hint: resumed
    /// threads must re-validate their own predicate.
    pub fn notify(&self, channel: ChannelId) -> usize {
        let mut woken = 0;
        for cpu in self.cores.iter() {
            let mut rq = cpu.run().acquire(cpu.irq());
            let count = rq.notify(channel, &self.stats);
            drop(rq);
            if count > 0 {
                self.kick(cpu.id());
                woken += count;
            }
        }
        woken
    }

    // ------------------------------------------------------------------
    // Priority
    // ------------------------------------------------------------------

    /// Change a thread's priority wherever it currently lives. Panics on
    /// an out-of-range priority; returns false for an unknown tid.
    pub fn set_priority(&self, tid: Tid, priority: Priority) -> bool {
        for cpu in self.cores.iter() {
            let mut rq = cpu.run().acquire(cpu.irq());
            if rq.set_priority(tid, priority) {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn running(&self, core: CoreId) -> Option<Tid> {
        let cpu = &self.cores[core];
        let rq = cpu.run().acquire(cpu.irq());
        rq.running_tid()
    }

    /// Queued plus running threads on one core
    pub fn load(&self, core: CoreId) -> usize {
        let cpu = &self.cores[core];
        let rq = cpu.run().acquire(cpu.irq());
        rq.load()
    }

    /// Normal-bucket load on one core, the balancer's metric
    pub fn normal_load(&self, core: CoreId) -> usize {
        let cpu = &self.cores[core];
        let rq = cpu.run().acquire(cpu.irq());
        rq.normal_load()
    }

    /// Location and state of every thread currently owned by a scheduler
    pub fn thread_stats(&self) -> Vec<ThreadStat> {
        let mut out = Vec::new();
        for cpu in self.cores.iter() {
            let rq = cpu.run().acquire(cpu.irq());
            rq.snapshot_threads(&mut out);
        }
        out
    }

    /// Outcome of a thread's most recent block, if it is still scheduled
    pub fn block_status(&self, tid: Tid) -> Option<BlockStatus> {
        self.thread_stats()
            .into_iter()
            .find(|stat| stat.tid == tid)
            .and_then(|stat| stat.block_status)
    }

    pub fn total_threads(&self) -> usize {
        self.live_threads.load(Ordering::SeqCst)
    }

    pub fn process_count(&self) -> usize {
        self.live_processes.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
