//! The manager / lifecycle component: owns the slot table, global epoch, and active mask.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::neutralize;
use crate::reclaim::ReclaimStart;
use crate::slot::{ActiveMask, Slot};
use crate::util::Aligned64;

static PROCESS_MANAGER: OnceLock<Arc<Manager>> = OnceLock::new();

/// Publish `manager` as the process-wide manager consulted by tooling that doesn't carry its
/// own `Arc<Manager>` handle. The signal handler itself doesn't need this (it reaches its
/// slot directly through a thread-local pointer, see [`crate::signal`]), but the pointer is
/// kept for API fidelity and for diagnostics that want "the" manager of a single-manager
/// process. Idempotent: a second call is ignored.
pub fn set_process_manager(manager: Arc<Manager>) {
    let _ = PROCESS_MANAGER.set(manager);
}

/// The manager published via [`set_process_manager`], if any.
pub fn process_manager() -> Option<Arc<Manager>> {
    PROCESS_MANAGER.get().cloned()
}

/// A snapshot of one slot's state, returned by [`Manager::slot_snapshot`] for inspection and
/// testing.
#[derive(Debug, Clone, Copy)]
pub struct SlotSnapshot {
    pub observed_epoch: u64,
    pub pinned: bool,
    pub neutralized: bool,
    pub thread_id: u64,
}

/// Owns the thread slot table, the global epoch, and the active mask; the root object of
/// this crate.
pub struct Manager {
    config: Config,
    global_epoch: Aligned64<AtomicU64>,
    active_mask: ActiveMask,
    slots: Box<[Slot]>,
}

impl Manager {
    /// Construct a manager with `config`. Sets `E_g := 1` and clears the active mask.
    ///
    /// # Examples
    ///
    /// ```
    /// use debra_reclaim::config::Config;
    /// use debra_reclaim::manager::Manager;
    ///
    /// let manager = Manager::new(Config::with_max_threads(8));
    /// assert_eq!(manager.current_epoch(), 1);
    /// ```
    pub fn new(config: Config) -> Arc<Manager> {
        let slots: Vec<Slot> = (0..config.max_threads).map(|_| Slot::default()).collect();
        let active_mask = ActiveMask::new(config.max_threads);
        Arc::new(Manager {
            global_epoch: Aligned64(AtomicU64::new(1)),
            active_mask,
            slots: slots.into_boxed_slice(),
            config,
        })
    }

    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub(crate) fn active_mask(&self) -> &ActiveMask {
        &self.active_mask
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// The current value of the global epoch.
    pub fn current_epoch(&self) -> u64 {
        self.global_epoch.load(Ordering::Acquire)
    }

    /// Advance the global epoch by one, unconditionally safe even if no thread is pinned:
    /// it simply shifts the reclamation window. Returns the new value.
    pub fn advance_epoch(&self) -> u64 {
        self.global_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Begin a reclamation pass. See [`crate::reclaim`] for the full state chain.
    pub fn reclaim_start(&self) -> ReclaimStart<'_> {
        ReclaimStart::new(self)
    }

    /// Scan registered threads and signal those pinned at an epoch older than
    /// `epochs_before_neutralize` behind the current global epoch. Returns the number of
    /// signals delivered. Never signals the caller's own thread.
    pub fn neutralize_stalled(&self, epochs_before_neutralize: u64) -> usize {
        neutralize::neutralize_stalled(self, epochs_before_neutralize)
    }

    /// Per-slot `(observed_epoch, pinned, neutralized, thread_id)` tuples, for inspection and
    /// testing.
    pub fn slot_snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .map(|slot| SlotSnapshot {
                observed_epoch: slot.observed_epoch.load(Ordering::Acquire),
                pinned: slot.pinned.load(Ordering::Acquire),
                neutralized: slot.neutralized.load(Ordering::Acquire),
                thread_id: slot.thread_id.load(Ordering::Acquire),
            })
            .collect()
    }

    /// Total number of limbo-bag entries across every slot, still awaiting reclamation.
    pub fn total_limbo_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.limbo_count()).sum()
    }

    /// Drain every slot's remaining bags, swallowing destructor panics. Also run from
    /// `Drop`, so a `Manager` dropped without an explicit call still reclaims deterministically.
    pub fn shutdown(&self) {
        for slot in self.slots.iter() {
            unsafe {
                slot.drain_all();
            }
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_sets_initial_epoch() {
        let manager = Manager::new(Config::with_max_threads(4));
        assert_eq!(manager.current_epoch(), 1);
        assert_eq!(manager.active_mask().popcount(), 0);
    }

    #[test]
    fn test_shutdown_noop_lifetime_is_clean() {
        let manager = Manager::new(Config::with_max_threads(4));
        manager.shutdown();
        assert_eq!(manager.total_limbo_count(), 0);
    }

    #[test]
    fn test_process_manager_roundtrip() {
        let manager = Manager::new(Config::with_max_threads(1));
        set_process_manager(Arc::clone(&manager));
        assert!(process_manager().is_some());
    }
}
