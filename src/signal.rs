//! The neutralization signal handler.
//!
//! Installed process-wide, exactly once, idempotently. The handler touches only the two
//! atomic booleans of the calling thread's own slot (no allocation, no I/O, no cross-thread
//! writes), so it is safe to run at an arbitrary point in the target thread's execution.

use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::Once;

use crate::slot::Slot;

thread_local! {
    /// Raw pointer to the slot this thread claimed at registration, read by the signal
    /// handler. Set by `Handle::register`, cleared by `Handle`'s `Drop`/`deregister`. Valid
    /// for as long as the owning `Handle` (and the `Arc<Manager>` it holds) is alive.
    static CURRENT_SLOT: Cell<*const Slot> = Cell::new(std::ptr::null());
}

pub(crate) fn set_current_slot(slot: *const Slot) {
    CURRENT_SLOT.with(|cell| cell.set(slot));
}

pub(crate) fn clear_current_slot() {
    CURRENT_SLOT.with(|cell| cell.set(std::ptr::null()));
}

static INSTALL_ONCE: Once = Once::new();

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Install the neutralization signal handler for `signum`. Idempotent: a second
        /// call (even with a different `signum`, which would be a caller bug) is a no-op;
        /// installing twice is indistinguishable from installing once.
        pub fn install_signal_handler(signum: i32) {
            INSTALL_ONCE.call_once(|| unsafe {
                let mut sa: libc::sigaction = std::mem::zeroed();
                sa.sa_sigaction = handle_neutralize_signal as usize;
                libc::sigemptyset(&mut sa.sa_mask);
                sa.sa_flags = libc::SA_RESTART;
                libc::sigaction(signum, &sa, std::ptr::null_mut());
            });
        }

        /// Direct the neutralization signal at `thread_id` (a raw `pthread_t`). `slot` is
        /// unused on this backend: delivery is asynchronous and the target thread force-
        /// unpins itself from within `handle_neutralize_signal`.
        ///
        /// # Safety
        /// `thread_id` must be a live `pthread_t` for a thread that registered with this
        /// crate (so that its `CURRENT_SLOT` thread-local is meaningful when the handler
        /// runs).
        pub(crate) unsafe fn send_neutralize_signal(_slot: &Slot, thread_id: u64, signum: i32) {
            libc::pthread_kill(thread_id as libc::pthread_t, signum);
        }

        /// The calling thread's OS-level identifier, used both to publish in a `Slot` and to
        /// make sure the neutralizer never signals itself.
        pub(crate) fn current_os_thread_id() -> u64 {
            unsafe { libc::pthread_self() as u64 }
        }

        /// Signal-handler entry point. Must remain async-signal-safe: no allocation, no
        /// non-reentrant libc calls, no writes outside the current thread's own slot.
        extern "C" fn handle_neutralize_signal(_signum: libc::c_int) {
            let slot = CURRENT_SLOT.with(|cell| cell.get());
            if slot.is_null() {
                return;
            }
            let slot = unsafe { &*slot };
            if slot.pinned.load(Ordering::Acquire) {
                slot.pinned.store(false, Ordering::Release);
                slot.neutralized.store(true, Ordering::Release);
            }
        }
    } else {
        /// No thread-directed async signal on this platform: installing is a no-op and
        /// neutralization instead relies on the polled fallback (`Slot::neutralized` is set
        /// directly by the neutralizer rather than by a handler).
        pub fn install_signal_handler(_signum: i32) {
            INSTALL_ONCE.call_once(|| {});
        }

        pub(crate) unsafe fn send_neutralize_signal(slot: &Slot, _thread_id: u64, _signum: i32) {
            // Polled fallback: force-unpin directly instead of delivering a signal. This
            // weakens the "stalled-in-syscall" guarantee, but is otherwise equivalent from
            // the target thread's point of view at its next unpin.
            if slot.pinned.load(Ordering::Acquire) {
                slot.pinned.store(false, Ordering::Release);
                slot.neutralized.store(true, Ordering::Release);
            }
        }

        pub(crate) fn current_os_thread_id() -> u64 {
            use std::sync::atomic::{AtomicU64, Ordering as Ord};
            static NEXT: AtomicU64 = AtomicU64::new(1);
            thread_local! {
                static ID: u64 = NEXT.fetch_add(1, Ord::Relaxed);
            }
            ID.with(|id| *id)
        }
    }
}
