//! S6, concurrent slot claim under contention.

use std::sync::{Arc, Barrier};
use std::thread;

use debra_reclaim::config::Config;
use debra_reclaim::handle::Handle;
use debra_reclaim::manager::Manager;

#[test]
fn s6_concurrent_claim_under_contention() {
    let manager = Manager::new(Config::with_max_threads(4));
    // 4 workers plus this thread: the second wait lets the main thread observe every slot
    // claimed before any worker releases its handle.
    let start = Arc::new(Barrier::new(5));
    let claimed = Arc::new(Barrier::new(5));
    let checked = Arc::new(Barrier::new(5));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let start = Arc::clone(&start);
            let claimed = Arc::clone(&claimed);
            let checked = Arc::clone(&checked);
            thread::spawn(move || {
                start.wait();
                let handle = Handle::register(&manager).unwrap();
                claimed.wait();
                checked.wait();
                drop(handle);
            })
        })
        .collect();

    start.wait();
    claimed.wait();
    let active = manager.slot_snapshot();
    let distinct_slots = active.iter().filter(|s| s.thread_id != 0).count();
    assert_eq!(distinct_slots, 4);
    checked.wait();

    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(
        manager
            .slot_snapshot()
            .iter()
            .filter(|s| s.thread_id != 0)
            .count(),
        0
    );
}
