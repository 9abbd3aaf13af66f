/*!
 * schedsim
 *
 * Boots the scheduling core on the simulated platform: four cores, a
 * handful of processes, manually advanced time. Prints the placement and
 * the counters after a second of simulated ticks.
 */

use schedcore::core::limits::{PRIORITY_MAX, PRIORITY_NORMAL, TICK_PERIOD};
use schedcore::{
    AddressSpaces, Kernel, ManualClock, SchedConfig, SimAddressSpaces, SimInterruptController,
    TrapFrame,
};
use std::sync::Arc;

fn main() {
    env_logger::init();

    let config = SchedConfig::default().with_cores(4);
    let clock = Arc::new(ManualClock::new());
    let intctl = Arc::new(SimInterruptController::new());
    let spaces = Arc::new(SimAddressSpaces::new(config.cores));

    let kernel = Kernel::new(
        config.clone(),
        Arc::clone(&clock) as _,
        Arc::clone(&intctl) as _,
        Arc::clone(&spaces) as _,
    );

    // Three processes: a pair of workers each, plus one boosted thread
    for index in 0..3 {
        let process = kernel.process_new().expect("spawn process");
        process.resources().open("dev/console");
        for entry in [0x40_0000u64, 0x40_2000] {
            let thread = kernel
                .thread_new(&process, entry, PRIORITY_NORMAL)
                .expect("spawn thread");
            kernel.push(thread);
        }
        if index == 0 {
            let boosted = kernel
                .thread_new(&process, 0x40_4000, PRIORITY_MAX)
                .expect("spawn thread");
            kernel.push(boosted);
        }
    }

    // One boot frame per core, starting in the kernel address space
    let mut frames: Vec<TrapFrame> = (0..kernel.core_count())
        .map(|_| TrapFrame::kernel(0, 0, spaces.kernel_space()))
        .collect();

    // A second of simulated time
    let ticks = 1_000_000_000 / TICK_PERIOD;
    for _ in 0..ticks {
        clock.advance(TICK_PERIOD);
        for (core, frame) in frames.iter_mut().enumerate() {
            kernel.timer_interrupt(core, frame);
        }
    }

    for core in 0..kernel.core_count() {
        println!(
            "core {core}: running={:?} load={}",
            kernel.running(core),
            kernel.load(core)
        );
    }
    println!("{:#?}", kernel.stats());
}
