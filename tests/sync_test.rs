/*!
 * Synchronization Tests
 * Ticket-lock fairness and block/wake semantics under races
 */

use pretty_assertions::assert_eq;
use schedcore::core::limits::{PRIORITY_NORMAL, TICK_PERIOD};
use schedcore::{
    BlockOutcome, BlockStatus, Blocker, IrqMask, Kernel, ManualClock, SchedConfig,
    SimAddressSpaces, SimInterruptController, ThreadState, TicketLock, TrapFrame,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn boot(config: SchedConfig) -> (Arc<Kernel>, Arc<ManualClock>, Vec<TrapFrame>) {
    let clock = Arc::new(ManualClock::new());
    let intctl = Arc::new(SimInterruptController::new());
    let spaces = Arc::new(SimAddressSpaces::new(config.cores));
    let kernel = Arc::new(Kernel::new(
        config,
        Arc::clone(&clock) as _,
        intctl as _,
        spaces as _,
    ));
    let frames = (0..kernel.core_count())
        .map(|_| TrapFrame::kernel(0, 0, 0))
        .collect();
    (kernel, clock, frames)
}

/// Admit one running thread on core 0 and return its tid
fn run_one(kernel: &Kernel, clock: &ManualClock, frame: &mut TrapFrame) -> u64 {
    let process = kernel.process_new().unwrap();
    let thread = kernel.thread_new(&process, 0x1000, PRIORITY_NORMAL).unwrap();
    let tid = thread.tid();
    kernel.push_local(0, thread);
    clock.advance(TICK_PERIOD);
    kernel.timer_interrupt(0, frame);
    assert_eq!(kernel.running(0), Some(tid));
    tid
}

#[test]
fn test_ticket_lock_entry_order_is_ticket_order() {
    let lock = Arc::new(TicketLock::new(Vec::new()));
    let gate = IrqMask::new();

    // Hold the lock so every contender queues behind us
    let guard = lock.acquire(&gate);

    let mut handles = Vec::new();
    for id in 0..4usize {
        let lock_c = Arc::clone(&lock);
        handles.push(thread::spawn(move || {
            let irq = IrqMask::new();
            let mut order = lock_c.acquire(&irq);
            order.push(id);
        }));

        // Wait until this contender has drawn its ticket, so issue order
        // is exactly spawn order
        while lock.waiters() < id as u32 + 2 {
            thread::yield_now();
        }
    }

    drop(guard);
    for handle in handles {
        handle.join().unwrap();
    }

    let order = lock.acquire(&gate);
    assert_eq!(*order, vec![0, 1, 2, 3], "critical sections entered in ticket order");
}

#[test]
fn test_block_satisfied_predicate_never_suspends() {
    let (kernel, clock, mut frames) = boot(SchedConfig::default());
    let tid = run_one(&kernel, &clock, &mut frames[0]);

    let outcome = kernel.block_running(0, &mut frames[0], Blocker::on(|| true), ());
    assert_eq!(outcome, BlockOutcome::Satisfied);
    assert_eq!(kernel.running(0), Some(tid), "thread kept the core");
}

#[test]
fn test_block_timeout_fires_no_earlier_than_deadline() {
    let (kernel, clock, mut frames) = boot(SchedConfig::default());
    let tid = run_one(&kernel, &clock, &mut frames[0]);

    let outcome = kernel.block_running(
        0,
        &mut frames[0],
        Blocker::on(|| false).with_timeout(10 * TICK_PERIOD),
        (),
    );
    assert_eq!(outcome, BlockOutcome::Parked);
    assert_eq!(kernel.running(0), None, "core went idle");

    // One tick short of the deadline: still blocked
    for _ in 0..9 {
        clock.advance(TICK_PERIOD);
        kernel.timer_interrupt(0, &mut frames[0]);
    }
    let stat = kernel
        .thread_stats()
        .into_iter()
        .find(|stat| stat.tid == tid)
        .unwrap();
    assert_eq!(stat.state, ThreadState::Blocked);

    // Deadline reached: woken with Timeout, scheduled again
    clock.advance(TICK_PERIOD);
    kernel.timer_interrupt(0, &mut frames[0]);
    assert_eq!(kernel.running(0), Some(tid));
    assert_eq!(kernel.block_status(tid), Some(BlockStatus::Timeout));
    assert_eq!(kernel.stats().timeouts, 1);
}

#[test]
fn test_racing_wake_and_timeout_readmit_exactly_once() {
    let (kernel, clock, mut frames) = boot(SchedConfig::default());
    let tid = run_one(&kernel, &clock, &mut frames[0]);

    kernel.block_running(
        0,
        &mut frames[0],
        Blocker::on(|| false).with_timeout(TICK_PERIOD),
        (),
    );

    // Let the deadline pass without sweeping, then race an explicit wake
    // against the timeout sweep
    clock.advance(10 * TICK_PERIOD);

    let waker = {
        let kernel = Arc::clone(&kernel);
        thread::spawn(move || kernel.unblock(tid))
    };
    kernel.timer_interrupt(0, &mut frames[0]);
    waker.join().unwrap();

    // Exactly one re-admission, whichever side won
    let stats = kernel.thread_stats();
    assert_eq!(stats.iter().filter(|stat| stat.tid == tid).count(), 1);
    let counters = kernel.stats();
    assert_eq!(counters.wakes + counters.timeouts, 1);
}

#[test]
fn test_notify_wakes_the_whole_channel() {
    let (kernel, clock, mut frames) = boot(SchedConfig::default());
    let channel = kernel.new_channel();

    let process = kernel.process_new().unwrap();
    let mut tids = Vec::new();
    for entry in [0x1000u64, 0x2000] {
        let thread = kernel.thread_new(&process, entry, PRIORITY_NORMAL).unwrap();
        tids.push(thread.tid());
        kernel.push_local(0, thread);
    }

    // Run each thread and park it on the channel
    for _ in 0..2 {
        clock.advance(TICK_PERIOD);
        kernel.timer_interrupt(0, &mut frames[0]);
        kernel.block_running(0, &mut frames[0], Blocker::on_channel(channel), ());
    }
    assert_eq!(kernel.running(0), None);

    assert_eq!(kernel.notify(channel), 2);
    let stats = kernel.thread_stats();
    for tid in &tids {
        let stat = stats.iter().find(|stat| stat.tid == *tid).unwrap();
        assert_eq!(stat.state, ThreadState::Ready);
        assert_eq!(stat.block_status, Some(BlockStatus::Normal));
    }
}

#[test]
fn test_consumer_rechecks_predicate_after_wake() {
    let (kernel, clock, mut frames) = boot(SchedConfig::default());
    let channel = kernel.new_channel();
    let data_ready = Arc::new(AtomicBool::new(false));

    let tid = run_one(&kernel, &clock, &mut frames[0]);
    let seen = Arc::clone(&data_ready);
    kernel.block_running(
        0,
        &mut frames[0],
        Blocker::on(move || seen.load(Ordering::SeqCst)).with_channel(channel),
        (),
    );

    // Producer publishes, then wakes the channel
    data_ready.store(true, Ordering::SeqCst);
    assert_eq!(kernel.notify(channel), 1);

    clock.advance(TICK_PERIOD);
    kernel.timer_interrupt(0, &mut frames[0]);
    assert_eq!(kernel.running(0), Some(tid));
    assert_eq!(kernel.block_status(tid), Some(BlockStatus::Normal));
    // The woken consumer re-validates its own predicate
    assert!(data_ready.load(Ordering::SeqCst));
}

#[test]
fn test_blocked_thread_keeps_its_priority_on_wake() {
    let (kernel, clock, mut frames) = boot(SchedConfig::default());
    let process = kernel.process_new().unwrap();

    let boosted = kernel
        .thread_new(&process, 0x1000, PRIORITY_NORMAL + 1)
        .unwrap();
    let tid = boosted.tid();
    kernel.push_local(0, boosted);
    clock.advance(TICK_PERIOD);
    kernel.timer_interrupt(0, &mut frames[0]);

    kernel.block_running(0, &mut frames[0], Blocker::sleep(TICK_PERIOD), ());
    clock.advance(2 * TICK_PERIOD);
    kernel.timer_interrupt(0, &mut frames[0]);

    // Blocking is not a demotion: the thread re-enters its own bucket
    let stat = kernel
        .thread_stats()
        .into_iter()
        .find(|stat| stat.tid == tid)
        .unwrap();
    assert_eq!(stat.priority, PRIORITY_NORMAL + 1);
}
