//! The neutralizer: force-unpins threads that have stayed pinned too long.

use std::sync::atomic::Ordering;

use crate::manager::Manager;
use crate::signal;
use crate::slot::INVALID_THREAD_ID;

/// Scan `manager`'s slots and signal every thread pinned at an epoch more than
/// `epochs_before_neutralize` behind the current global epoch. Never signals the calling
/// thread, an unregistered slot, or a thread within the staleness threshold. Returns the
/// number of signals delivered.
pub(crate) fn neutralize_stalled(manager: &Manager, epochs_before_neutralize: u64) -> usize {
    let current = manager.current_epoch();
    let cutoff = current.saturating_sub(epochs_before_neutralize);
    let caller_thread_id = signal::current_os_thread_id();
    let signum = manager.config().neutralization_signal;

    let mut signaled = 0;
    for slot in manager.slots() {
        if !slot.pinned.load(Ordering::Acquire) {
            continue;
        }
        let observed = slot.observed_epoch.load(Ordering::Acquire);
        if observed >= cutoff {
            continue;
        }
        let thread_id = slot.thread_id.load(Ordering::Acquire);
        if thread_id == INVALID_THREAD_ID || thread_id == caller_thread_id {
            continue;
        }
        unsafe {
            signal::send_neutralize_signal(slot, thread_id, signum);
        }
        signaled += 1;
    }
    signaled
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::handle::Handle;

    #[test]
    fn test_never_signals_self_or_unpinned() {
        let manager = Manager::new(Config::with_max_threads(4));
        let handle = Handle::register(&manager).unwrap();
        let _pinned = handle.unpinned().pin();
        manager.advance_epoch();
        manager.advance_epoch();
        manager.advance_epoch();

        // The calling thread (this test thread) is the very thread that just pinned, so even
        // though it is stale, it must never signal itself.
        let signaled = neutralize_stalled(manager.as_ref(), 2);
        assert_eq!(signaled, 0);
    }

    #[test]
    fn test_skips_threads_within_threshold() {
        let manager = Manager::new(Config::with_max_threads(4));
        let handle = Handle::register(&manager).unwrap();
        let _pinned = handle.unpinned().pin();
        // No epoch advance: observed_epoch == current_epoch, well within threshold.
        let signaled = neutralize_stalled(manager.as_ref(), 2);
        assert_eq!(signaled, 0);
    }
}
