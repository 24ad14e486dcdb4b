//! The pin/unpin/retire typestate chain.
//!
//! Every state is a distinct, move-only type; each transition function consumes its input by
//! value. Misuse (pinning twice, retiring while unpinned, pinning a neutralized handle) is
//! a compile error rather than a runtime check.

use std::sync::atomic::Ordering;

use crate::handle::Handle;
use crate::limbo::DestructorFn;

/// A thread outside any critical section. The initial and resting state of a [`Handle`].
pub struct UnpinnedGuard<'h> {
    handle: &'h Handle,
}

/// A thread inside a critical section, having published `observed_epoch`.
pub struct PinnedGuard<'h> {
    handle: &'h Handle,
}

/// A thread that was force-unpinned by the neutralization signal while pinned. Must be
/// acknowledged before pinning again.
pub struct NeutralizedGuard<'h> {
    handle: &'h Handle,
}

/// Permission to retire at least zero more objects before unpinning. Obtained from
/// [`PinnedGuard::retire_ready`] or [`Retired::retire_ready_of`].
pub struct RetireReady<'h> {
    handle: &'h Handle,
}

/// The state after at least one [`RetireReady::retire`] call within the current critical
/// section.
pub struct Retired<'h> {
    handle: &'h Handle,
}

/// Outcome of [`PinnedGuard::unpin`] (or any retiring state's `unpin`).
pub enum UnpinResult<'h> {
    /// The critical section ended normally.
    Unpinned(UnpinnedGuard<'h>),
    /// The protocol force-unpinned this thread while it was pinned; acknowledge before
    /// pinning again.
    Neutralized(NeutralizedGuard<'h>),
}

impl<'h> UnpinnedGuard<'h> {
    pub(crate) fn new(handle: &'h Handle) -> Self {
        UnpinnedGuard { handle }
    }

    /// Enter a critical section: publish the currently observed global epoch.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use debra_reclaim::config::Config;
    /// use debra_reclaim::manager::Manager;
    /// use debra_reclaim::handle::Handle;
    ///
    /// let manager = Manager::new(Config::with_max_threads(4));
    /// let handle = Handle::register(&manager).unwrap();
    /// let pinned = handle.unpinned().pin();
    /// let _ = pinned.unpin();
    /// ```
    pub fn pin(self) -> PinnedGuard<'h> {
        let slot = self.handle.manager.slot(self.handle.slot_index);
        let epoch = self.handle.manager.current_epoch();
        slot.neutralized.store(false, Ordering::Release);
        slot.observed_epoch.store(epoch, Ordering::Release);
        // Must be the last write: any observer seeing `pinned = true` also sees the
        // matching `observed_epoch`.
        slot.pinned.store(true, Ordering::Release);
        PinnedGuard {
            handle: self.handle,
        }
    }
}

impl<'h> PinnedGuard<'h> {
    /// Exit the critical section.
    pub fn unpin(self) -> UnpinResult<'h> {
        let slot = self.handle.manager.slot(self.handle.slot_index);
        slot.pinned.store(false, Ordering::Release);
        if slot.neutralized.load(Ordering::Acquire) {
            UnpinResult::Neutralized(NeutralizedGuard {
                handle: self.handle,
            })
        } else {
            UnpinResult::Unpinned(UnpinnedGuard {
                handle: self.handle,
            })
        }
    }

    /// Begin retiring objects in this critical section.
    pub fn retire_ready(self) -> RetireReady<'h> {
        RetireReady {
            handle: self.handle,
        }
    }
}

impl<'h> RetireReady<'h> {
    /// Hand `ptr` to the reclaimer together with its `destructor`. `ptr == null` paired with
    /// `destructor == None` is a permitted no-op placeholder (useful in tests).
    pub fn retire(self, ptr: *mut (), destructor: Option<DestructorFn>) -> Retired<'h> {
        let slot = self.handle.manager.slot(self.handle.slot_index);
        // Only the owning thread ever writes `observed_epoch`, so a relaxed load of our own
        // write is sound here.
        let observed_epoch = slot.observed_epoch.load(Ordering::Relaxed);
        let capacity = self.handle.manager.config().limbo_bag_capacity;
        unsafe {
            slot.retire(observed_epoch, capacity, ptr, destructor);
        }
        Retired {
            handle: self.handle,
        }
    }

    /// End the critical section without retiring anything after all.
    pub fn unpin(self) -> UnpinResult<'h> {
        PinnedGuard {
            handle: self.handle,
        }
        .unpin()
    }
}

impl<'h> Retired<'h> {
    /// Chain another retirement within the same critical section.
    pub fn retire_ready_of(self) -> RetireReady<'h> {
        RetireReady {
            handle: self.handle,
        }
    }

    /// End the critical section.
    pub fn unpin(self) -> UnpinResult<'h> {
        PinnedGuard {
            handle: self.handle,
        }
        .unpin()
    }
}

impl<'h> NeutralizedGuard<'h> {
    /// Clear the neutralized flag and return to `Unpinned`.
    pub fn acknowledge(self) -> UnpinnedGuard<'h> {
        let slot = self.handle.manager.slot(self.handle.slot_index);
        slot.neutralized.store(false, Ordering::Release);
        UnpinnedGuard {
            handle: self.handle,
        }
    }
}
