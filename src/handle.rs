//! Per-thread registration token.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::RegistrationFull;
use crate::guard::UnpinnedGuard;
use crate::manager::Manager;
use crate::signal;
use crate::slot::{claim_slot, release_slot};

/// A thread's registration with a [`Manager`].
///
/// `Handle` is deliberately `!Send`/`!Sync` (via the `PhantomData<*const ()>` marker): the
/// slot it owns is single-writer, so a `Handle` must never be used from any thread other
/// than the one that registered it. Register once per thread and keep the `Handle` around
/// for the lifetime of that thread's participation; every subsequent critical section starts
/// from [`Handle::unpinned`].
pub struct Handle {
    pub(crate) manager: Arc<Manager>,
    pub(crate) slot_index: usize,
    _not_send: PhantomData<*const ()>,
}

impl Handle {
    /// Claim a free slot in `manager`'s thread table. Fails with [`RegistrationFull`] if
    /// every slot is already claimed; no slot is consumed on failure.
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
    /// drop(handle);
    /// ```
    pub fn register(manager: &Arc<Manager>) -> Result<Handle, RegistrationFull> {
        let thread_id = signal::current_os_thread_id();
        let slot_index = claim_slot(manager.slots(), manager.active_mask(), thread_id)
            .ok_or(RegistrationFull)?;
        let handle = Handle {
            manager: Arc::clone(manager),
            slot_index,
            _not_send: PhantomData,
        };
        signal::set_current_slot(manager.slot(slot_index) as *const _);
        Ok(handle)
    }

    /// Start a new critical-section cycle. Borrows `self`, so the same `Handle` can start
    /// many pin/unpin cycles over its lifetime.
    pub fn unpinned(&self) -> UnpinnedGuard<'_> {
        UnpinnedGuard::new(self)
    }

    /// Drain this slot's remaining bags and release it back to the manager's free pool, so a
    /// later thread may claim the same index.
    pub fn deregister(self) {
        // Drop does the work; this method exists so callers have a named, self-documenting
        // way to end participation explicitly rather than relying on scope exit.
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            self.manager.slot(self.slot_index).drain_all();
        }
        release_slot(
            self.manager.slots(),
            self.manager.active_mask(),
            self.slot_index,
        );
        signal::clear_current_slot();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_register_and_drop_releases_slot() {
        let manager = Manager::new(Config::with_max_threads(2));
        {
            let _h1 = Handle::register(&manager).unwrap();
            let _h2 = Handle::register(&manager).unwrap();
            assert!(Handle::register(&manager).is_err());
        }
        // both handles dropped: slots released, a fresh registration succeeds again.
        let _h3 = Handle::register(&manager).unwrap();
    }
}
