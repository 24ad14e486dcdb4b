//! The reclaimer: `Start -> EpochsLoaded -> (Ready | Blocked)`.

use std::sync::atomic::Ordering;

use crate::manager::Manager;

/// The start of a reclamation attempt. Obtained from [`Manager::reclaim_start`].
pub struct ReclaimStart<'m> {
    manager: &'m Manager,
}

/// The safe epoch has been computed; branch with [`EpochsLoaded::check_safe`].
pub struct EpochsLoaded<'m> {
    manager: &'m Manager,
    safe_epoch: u64,
}

/// Outcome of [`EpochsLoaded::check_safe`].
pub enum ReclaimState<'m> {
    /// Reclamation may proceed; `threshold` bounds which bags are safe to free.
    Ready(ReclaimReady<'m>),
    /// Nothing can be safely reclaimed right now (the safe epoch is `<= 1`).
    Blocked,
}

/// Reclamation is safe to run. Obtained from [`ReclaimState::Ready`].
pub struct ReclaimReady<'m> {
    manager: &'m Manager,
    threshold: u64,
}

impl<'m> ReclaimStart<'m> {
    pub(crate) fn new(manager: &'m Manager) -> Self {
        ReclaimStart { manager }
    }

    /// Compute the safe epoch: the current global epoch, lowered to the minimum
    /// `observed_epoch` of any currently pinned thread.
    pub fn load_epochs(self) -> EpochsLoaded<'m> {
        let mut safe = self.manager.current_epoch();
        for slot in self.manager.slots() {
            if slot.pinned.load(Ordering::Acquire) {
                let observed = slot.observed_epoch.load(Ordering::Acquire);
                if observed < safe {
                    safe = observed;
                }
            }
        }
        EpochsLoaded {
            manager: self.manager,
            safe_epoch: safe,
        }
    }
}

impl<'m> EpochsLoaded<'m> {
    /// The computed safe epoch, exposed for observability.
    pub fn safe_epoch(&self) -> u64 {
        self.safe_epoch
    }

    /// Branch on whether anything is safe to reclaim.
    pub fn check_safe(self) -> ReclaimState<'m> {
        if self.safe_epoch <= 1 {
            ReclaimState::Blocked
        } else {
            ReclaimState::Ready(ReclaimReady {
                manager: self.manager,
                threshold: self.safe_epoch - 1,
            })
        }
    }
}

impl<'m> ReclaimReady<'m> {
    /// Bags whose epoch is strictly below this value are safe to free.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Walk every registered slot's bag list and reclaim everything below `threshold`.
    /// Returns the total count of objects reclaimed.
    pub fn try_reclaim(self) -> usize {
        let mut total = 0;
        for slot in self.manager.slots() {
            total += unsafe { slot.reclaim_below(self.threshold) };
        }
        total
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::handle::Handle;

    #[test]
    fn test_blocked_when_nothing_ever_pinned() {
        let manager = Manager::new(Config::with_max_threads(4));
        match manager.reclaim_start().load_epochs().check_safe() {
            ReclaimState::Blocked => {}
            ReclaimState::Ready(_) => panic!("expected Blocked"),
        }
    }

    #[test]
    fn test_single_thread_lifecycle_s1() {
        let manager = Manager::new(Config::with_max_threads(4));
        let handle = Handle::register(&manager).unwrap();

        static mut COUNTER: i32 = 0;
        unsafe fn bump(_p: *mut ()) {
            COUNTER += 1;
        }

        let pinned = handle.unpinned().pin();
        assert_eq!(manager.current_epoch(), 1);
        let retired = pinned
            .retire_ready()
            .retire(std::ptr::null_mut(), Some(bump));
        let _ = retired.unpin();

        manager.advance_epoch();
        manager.advance_epoch();
        assert_eq!(manager.current_epoch(), 3);

        let loaded = manager.reclaim_start().load_epochs();
        match loaded.check_safe() {
            ReclaimState::Ready(ready) => {
                assert_eq!(ready.threshold(), 2);
                let n = ready.try_reclaim();
                assert_eq!(n, 1);
            }
            ReclaimState::Blocked => panic!("expected Ready"),
        }
        unsafe {
            assert_eq!(COUNTER, 1);
        }
    }
}
