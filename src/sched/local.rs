/*!
 * Local Scheduling Decision
 *
 * One `RunQueue` per core, guarded by that core's ticket lock: FIFO buckets
 * per priority level, the parked list for blocked threads, the running
 * slot, and the preemption deadline. All state transitions of a thread
 * happen while the owning core's lock is held, and threads are moved by
 * value between containers, so a thread is in at most one bucket or the
 * running slot at any time.
 */

use super::stats::{SchedStats, ThreadStat};
use crate::core::limits::{PRIORITY_LEVELS, PRIORITY_NORMAL};
use crate::core::types::{AddressSpaceId, ChannelId, CoreId, Tid, Timestamp};
use crate::platform::AddressSpaces;
use crate::sync::blocker::{BlockStatus, Blocker};
use crate::task::context::TrapFrame;
use crate::task::thread::{Thread, ThreadState};
use log::trace;
use std::collections::VecDeque;

pub struct RunQueue {
    core: CoreId,
    queues: [VecDeque<Box<Thread>>; PRIORITY_LEVELS],
    parked: Vec<Box<Thread>>,
    running: Option<Box<Thread>>,
    next_preemption: Timestamp,
    time_slice: Timestamp,
    idle_entry: u64,
    idle_stack_top: u64,
    kernel_space: AddressSpaceId,
}

impl RunQueue {
    pub(crate) fn new(
        core: CoreId,
        time_slice: Timestamp,
        idle_entry: u64,
        idle_stack_top: u64,
        kernel_space: AddressSpaceId,
    ) -> Self {
        Self {
            core,
            queues: std::array::from_fn(|_| VecDeque::new()),
            parked: Vec::new(),
            running: None,
            next_preemption: 0,
            time_slice,
            idle_entry,
            idle_stack_top,
            kernel_space,
        }
    }

    /// Enqueue a runnable thread into the bucket matching its priority
    pub(crate) fn push(&mut self, mut thread: Box<Thread>) {
        thread.set_state(ThreadState::Ready);
        let bucket = thread.priority() as usize;
        self.queues[bucket].push_back(thread);
    }

    fn pop_highest(&mut self) -> Option<Box<Thread>> {
        for bucket in (0..PRIORITY_LEVELS).rev() {
            if let Some(thread) = self.queues[bucket].pop_front() {
                return Some(thread);
            }
        }
        None
    }

    /// Runnable threads queued across all buckets
    pub(crate) fn queued(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Queued plus running; the placement metric
    pub(crate) fn load(&self) -> usize {
        self.queued() + usize::from(self.running.is_some())
    }

    pub(crate) fn normal_queue_len(&self) -> usize {
        self.queues[PRIORITY_NORMAL as usize].len()
    }

    /// Normal-bucket queue plus running; the balancing metric
    pub(crate) fn normal_load(&self) -> usize {
        self.normal_queue_len() + usize::from(self.running.is_some())
    }

    pub(crate) fn pop_normal(&mut self) -> Option<Box<Thread>> {
        self.queues[PRIORITY_NORMAL as usize].pop_front()
    }

    pub(crate) fn running_tid(&self) -> Option<Tid> {
        self.running.as_ref().map(|thread| thread.tid())
    }

    pub(crate) fn running_process_killed(&self) -> bool {
        self.running
            .as_ref()
            .map(|thread| thread.process().is_killed())
            .unwrap_or(false)
    }

    /// Pick the next thread and swap execution contexts.
    ///
    /// A demoted thread drops back to the normal bucket with its priority
    /// reset, so a boost never outlives the slice it was granted for. With
    /// nothing runnable and nothing running, the live frame is pointed at
    /// the idle loop in the kernel address space.
    pub(crate) fn schedule(
        &mut self,
        frame: &mut TrapFrame,
        now: Timestamp,
        spaces: &dyn AddressSpaces,
        stats: &SchedStats,
    ) {
        if let Some(mut next) = self.pop_highest() {
            if let Some(mut old) = self.running.take() {
                old.context_mut().save(frame);
                old.set_state(ThreadState::Ready);
                old.set_priority(PRIORITY_NORMAL);
                self.queues[PRIORITY_NORMAL as usize].push_back(old);
                stats.inc_preemptions();
            }

            trace!("core {}: switching to thread {}", self.core, next.tid());
            let old_space = frame.address_space;
            next.set_state(ThreadState::Running);
            next.begin_slice(now, now + self.time_slice);
            next.context().restore(frame);
            if frame.address_space != old_space {
                spaces.switch(self.core, frame.address_space);
            }

            self.next_preemption = now + self.time_slice;
            self.running = Some(next);
            stats.inc_switches();
        } else if self.running.is_none() {
            trace!("core {}: idle", self.core);
            let old_space = frame.address_space;
            *frame = TrapFrame::kernel(self.idle_entry, self.idle_stack_top, self.kernel_space);
            if old_space != self.kernel_space {
                spaces.switch(self.core, self.kernel_space);
            }
            // Any arrival reschedules at the next tick
            self.next_preemption = 0;
        } else {
            // Sole runnable thread keeps the core for another slice
            if let Some(running) = self.running.as_mut() {
                running.begin_slice(now, now + self.time_slice);
            }
            self.next_preemption = now + self.time_slice;
        }
    }

    /// Periodic-timer entry: admit due wakes, then apply the preemption
    /// rules: reschedule when the slice deadline has passed, or early when
    /// a bucket above the running thread's priority is non-empty.
    pub(crate) fn tick(
        &mut self,
        frame: &mut TrapFrame,
        now: Timestamp,
        spaces: &dyn AddressSpaces,
        stats: &SchedStats,
    ) {
        self.sweep(now, stats);

        if self.next_preemption <= now {
            self.schedule(frame, now, spaces, stats);
        } else if let Some(running) = &self.running {
            let above = running.priority() as usize + 1;
            if (above..PRIORITY_LEVELS).any(|bucket| !self.queues[bucket].is_empty()) {
                self.schedule(frame, now, spaces, stats);
            }
        }
    }

    /// Re-admit parked threads whose predicate holds, whose deadline has
    /// passed, or whose process was killed (so they can reach their exit
    /// safe point). Predicate wins over a simultaneous deadline.
    fn sweep(&mut self, now: Timestamp, stats: &SchedStats) {
        let mut index = 0;
        while index < self.parked.len() {
            let thread = &mut self.parked[index];
            let status = if thread.process().is_killed() {
                Some(BlockStatus::Normal)
            } else {
                match thread.blocker_mut() {
                    Some(blocker) => {
                        if blocker.is_satisfied() {
                            Some(BlockStatus::Normal)
                        } else if blocker.deadline() <= now {
                            Some(BlockStatus::Timeout)
                        } else {
                            None
                        }
                    }
                    None => panic!("parked thread {} has no blocker", thread.tid()),
                }
            };

            match status {
                Some(status) => {
                    let mut thread = self.parked.swap_remove(index);
                    trace!("core {}: thread {} wakes {:?}", self.core, thread.tid(), status);
                    thread.wake(status);
                    match status {
                        BlockStatus::Normal => stats.inc_wakes(),
                        BlockStatus::Timeout => stats.inc_timeouts(),
                    }
                    let bucket = thread.priority() as usize;
                    self.queues[bucket].push_back(thread);
                }
                None => index += 1,
            }
        }
    }

    /// Record the blocker and park the running thread. The caller holds
    /// this core's lock and still holds its own lock, so no wake can slip
    /// between the predicate check and the park.
    pub(crate) fn park_running(&mut self, frame: &mut TrapFrame, mut blocker: Blocker, now: Timestamp) {
        let Some(mut thread) = self.running.take() else {
            panic!("block with no running thread on core {}", self.core);
        };

        thread.context_mut().save(frame);
        blocker.arm(now);
        trace!("core {}: thread {} parks", self.core, thread.tid());
        thread.park(blocker);
        self.parked.push(thread);
    }

    /// Detach the running thread terminally and pick a successor
    pub(crate) fn exit_running(
        &mut self,
        frame: &mut TrapFrame,
        now: Timestamp,
        spaces: &dyn AddressSpaces,
        stats: &SchedStats,
    ) -> Box<Thread> {
        let Some(mut thread) = self.running.take() else {
            panic!("exit with no running thread on core {}", self.core);
        };

        thread.set_state(ThreadState::Killed);
        self.schedule(frame, now, spaces, stats);
        thread
    }

    /// Wake one specific parked thread
    pub(crate) fn unblock(&mut self, tid: Tid, stats: &SchedStats) -> bool {
        let Some(position) = self.parked.iter().position(|thread| thread.tid() == tid) else {
            return false;
        };

        let mut thread = self.parked.swap_remove(position);
        thread.wake(BlockStatus::Normal);
        stats.inc_wakes();
        let bucket = thread.priority() as usize;
        self.queues[bucket].push_back(thread);
        true
    }

    /// Wake every parked thread blocked on `channel`
    pub(crate) fn notify(&mut self, channel: ChannelId, stats: &SchedStats) -> usize {
        let mut woken = 0;
        let mut index = 0;
        while index < self.parked.len() {
            let on_channel = self.parked[index]
                .blocker_mut()
                .map(|blocker| blocker.channel() == Some(channel))
                .unwrap_or(false);

            if on_channel {
                let mut thread = self.parked.swap_remove(index);
                thread.wake(BlockStatus::Normal);
                stats.inc_wakes();
                let bucket = thread.priority() as usize;
                self.queues[bucket].push_back(thread);
                woken += 1;
            } else {
                index += 1;
            }
        }
        woken
    }

    /// Re-bucket or relabel one thread's priority wherever it currently is
    pub(crate) fn set_priority(&mut self, tid: Tid, priority: u8) -> bool {
        if let Some(running) = self.running.as_mut() {
            if running.tid() == tid {
                running.set_priority(priority);
                return true;
            }
        }

        for bucket in 0..PRIORITY_LEVELS {
            if let Some(position) = self.queues[bucket].iter().position(|t| t.tid() == tid) {
                if let Some(mut thread) = self.queues[bucket].remove(position) {
                    thread.set_priority(priority);
                    self.queues[priority as usize].push_back(thread);
                    return true;
                }
            }
        }

        for thread in self.parked.iter_mut() {
            if thread.tid() == tid {
                thread.set_priority(priority);
                return true;
            }
        }

        false
    }

    pub(crate) fn snapshot_threads(&self, out: &mut Vec<ThreadStat>) {
        let stat = |thread: &Thread| ThreadStat {
            tid: thread.tid(),
            pid: thread.process().pid(),
            core: self.core,
            priority: thread.priority(),
            state: thread.state(),
            block_status: thread.block_status(),
        };

        if let Some(running) = &self.running {
            out.push(stat(running));
        }
        for queue in &self.queues {
            out.extend(queue.iter().map(|thread| stat(thread)));
        }
        out.extend(self.parked.iter().map(|thread| stat(thread)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::{PRIORITY_MAX, PRIORITY_MIN, TIME_SLICE};
    use crate::platform::{AddressSpaces, SimAddressSpaces};
    use crate::task::process::Process;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    struct Fixture {
        rq: RunQueue,
        spaces: Arc<SimAddressSpaces>,
        stats: SchedStats,
        process: Arc<Process>,
        frame: TrapFrame,
    }

    fn fixture() -> Fixture {
        let spaces = Arc::new(SimAddressSpaces::new(1));
        let dyn_spaces: Arc<dyn AddressSpaces> = Arc::clone(&spaces) as _;
        let process = Process::new(1, Arc::new(AtomicU64::new(1)), dyn_spaces);
        Fixture {
            rq: RunQueue::new(0, TIME_SLICE, 0xffff_8000_0000_0000, 0xffff_8000_0000_1000, 0),
            spaces,
            stats: SchedStats::new(),
            process,
            frame: TrapFrame::kernel(0, 0, 0),
        }
    }

    fn spawn(fix: &mut Fixture, priority: u8) -> Tid {
        let thread = Thread::new(&fix.process, 0x40_0000, priority);
        let tid = thread.tid();
        fix.rq.push(thread);
        tid
    }

    #[test]
    fn test_fifo_within_bucket() {
        let mut fix = fixture();
        let first = spawn(&mut fix, PRIORITY_NORMAL);
        let second = spawn(&mut fix, PRIORITY_NORMAL);

        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);
        assert_eq!(fix.rq.running_tid(), Some(first));

        fix.rq
            .schedule(&mut fix.frame, 1, fix.spaces.as_ref(), &fix.stats);
        assert_eq!(fix.rq.running_tid(), Some(second));
    }

    #[test]
    fn test_higher_bucket_scheduled_first() {
        let mut fix = fixture();
        let _low = spawn(&mut fix, PRIORITY_MIN);
        let high = spawn(&mut fix, PRIORITY_MAX);

        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);
        assert_eq!(fix.rq.running_tid(), Some(high));
    }

    #[test]
    fn test_demotion_resets_priority() {
        let mut fix = fixture();
        let boosted = spawn(&mut fix, PRIORITY_MAX);
        let _other = spawn(&mut fix, PRIORITY_NORMAL);

        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);
        assert_eq!(fix.rq.running_tid(), Some(boosted));

        // Slice expires; boosted thread is demoted to the normal bucket
        fix.rq
            .tick(&mut fix.frame, TIME_SLICE + 1, fix.spaces.as_ref(), &fix.stats);
        let mut stats = Vec::new();
        fix.rq.snapshot_threads(&mut stats);
        let demoted = stats.iter().find(|s| s.tid == boosted).unwrap();
        assert_eq!(demoted.priority, PRIORITY_NORMAL);
        assert_eq!(demoted.state, ThreadState::Ready);
    }

    #[test]
    fn test_idle_frame_when_nothing_runnable() {
        let mut fix = fixture();
        fix.frame.address_space = 5;
        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);

        assert_eq!(fix.frame.instruction_pointer, 0xffff_8000_0000_0000);
        assert_eq!(fix.frame.address_space, 0);
        assert!(fix.frame.code_segment.is_kernel());
        assert_eq!(fix.spaces.active_on(0), 0);
    }

    #[test]
    fn test_timeout_sweep_readmits_once() {
        let mut fix = fixture();
        let tid = spawn(&mut fix, PRIORITY_NORMAL);
        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);
        assert_eq!(fix.rq.running_tid(), Some(tid));

        fix.rq
            .park_running(&mut fix.frame, Blocker::sleep(1_000), 0);
        assert_eq!(fix.rq.load(), 0);
        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);

        // Before the deadline nothing wakes
        fix.rq.tick(&mut fix.frame, 999, fix.spaces.as_ref(), &fix.stats);
        assert_eq!(fix.rq.queued(), 0);

        fix.rq
            .tick(&mut fix.frame, 1_000, fix.spaces.as_ref(), &fix.stats);
        assert_eq!(fix.rq.running_tid(), Some(tid));
        let mut stats = Vec::new();
        fix.rq.snapshot_threads(&mut stats);
        assert_eq!(stats.iter().filter(|s| s.tid == tid).count(), 1);
        assert_eq!(stats[0].block_status, Some(BlockStatus::Timeout));
    }

    #[test]
    fn test_unblock_beats_deadline() {
        let mut fix = fixture();
        let tid = spawn(&mut fix, PRIORITY_NORMAL);
        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);
        fix.rq
            .park_running(&mut fix.frame, Blocker::sleep(1_000), 0);
        fix.rq
            .schedule(&mut fix.frame, 0, fix.spaces.as_ref(), &fix.stats);

        assert!(fix.rq.unblock(tid, &fix.stats));
        // A later deadline sweep must not wake it a second time
        fix.rq
            .tick(&mut fix.frame, 2_000, fix.spaces.as_ref(), &fix.stats);

        let mut stats = Vec::new();
        fix.rq.snapshot_threads(&mut stats);
        assert_eq!(stats.iter().filter(|s| s.tid == tid).count(), 1);
        assert_eq!(stats[0].block_status, Some(BlockStatus::Normal));
    }

    #[test]
    #[should_panic(expected = "block with no running thread")]
    fn test_park_without_running_panics() {
        let mut fix = fixture();
        fix.rq
            .park_running(&mut fix.frame, Blocker::sleep(1), 0);
    }
}
