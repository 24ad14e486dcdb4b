//! S4, neutralization cycle. Exercises the real `libc::pthread_kill`/`sigaction` path, so
//! it only runs on unix; the polled-fallback backend has no directed-signal delivery
//! to wait on and is covered instead by the unit tests in `src/signal.rs`/`src/neutralize.rs`.

#![cfg(unix)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use debra_reclaim::config::Config;
use debra_reclaim::guard::UnpinResult;
use debra_reclaim::handle::Handle;
use debra_reclaim::install_signal_handler;
use debra_reclaim::manager::Manager;

#[test]
fn s4_neutralization_cycle() {
    install_signal_handler(libc::SIGUSR1);

    let manager = Manager::new(Config::with_max_threads(4));
    let manager_target = Arc::clone(&manager);

    let (report_pinned, wait_pinned) = mpsc::channel::<()>();
    let (tell_check_unpin, wait_check_unpin) = mpsc::channel::<()>();
    let result = Arc::new(AtomicBool::new(false));
    let result_reader = Arc::clone(&result);

    let target = thread::spawn(move || {
        let handle = Handle::register(&manager_target).unwrap();
        let pinned = handle.unpinned().pin();
        report_pinned.send(()).unwrap();

        wait_check_unpin.recv().unwrap();
        match pinned.unpin() {
            UnpinResult::Unpinned(_) => {
                result_reader.store(false, Ordering::Release);
            }
            UnpinResult::Neutralized(neutralized) => {
                result_reader.store(true, Ordering::Release);
                let acknowledged = neutralized.acknowledge();
                drop(acknowledged);
            }
        }
    });

    wait_pinned.recv().unwrap();

    // Advance E_g far enough that the target (still observing epoch 1) is well past the
    // staleness threshold.
    for _ in 0..9 {
        manager.advance_epoch();
    }
    assert_eq!(manager.current_epoch(), 10);

    let signaled = manager.neutralize_stalled(2);
    assert_eq!(signaled, 1);

    // Give the signal time to land and the handler to run before the target checks unpin.
    thread::sleep(Duration::from_millis(50));

    tell_check_unpin.send(()).unwrap();
    target.join().unwrap();

    assert!(result.load(Ordering::Acquire), "expected Neutralized on unpin");
}
