//! The limbo bag: a fixed-capacity batch of retirements sharing one epoch.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A destructor that releases the object at `ptr`. Receives the type-erased pointer exactly
/// as it was passed to [`crate::guard::RetireReady::retire`].
pub type DestructorFn = unsafe fn(*mut ());

pub(crate) struct Retirement {
    pub ptr: *mut (),
    pub destructor: Option<DestructorFn>,
}

/// A node in the singly-linked list of bags owned by one thread. Bags are prepended at the
/// newest end (`Slot::head`) and the objects a bag holds are only ever appended by the
/// owning thread; `next` is atomic because the reclaimer may splice a bag's tail off the
/// list from another thread.
pub(crate) struct Bag {
    objects: Vec<Retirement>,
    pub epoch: u64,
    pub next: AtomicPtr<Bag>,
}

// Bag is only ever handed from one owning thread to the thread that reclaims it; both ends
// treat the transfer as a single ownership move guarded by the slot's atomics.
unsafe impl Send for Bag {}

impl Bag {
    pub fn new(epoch: u64, capacity: usize) -> Box<Bag> {
        Box::new(Bag {
            objects: Vec::with_capacity(capacity),
            epoch,
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.objects.len() == self.objects.capacity()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn push(&mut self, ptr: *mut (), destructor: Option<DestructorFn>) {
        debug_assert!(!self.is_full());
        self.objects.push(Retirement { ptr, destructor });
    }

    #[inline]
    pub fn next(&self) -> *mut Bag {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_next(&self, next: *mut Bag) {
        self.next.store(next, Ordering::Release);
    }
}

/// Runs every entry's destructor (skipping `None` ones), then drops the bag's own storage.
/// Returns the number of objects reclaimed, including entries with no destructor.
///
/// Destructor panics are **not** caught here: they propagate to the reclaimer's caller. Use
/// [`reclaim_bag_swallowing`] during shutdown, where there is no meaningful caller left to
/// propagate to.
pub(crate) unsafe fn reclaim_bag(mut bag: Box<Bag>) -> usize {
    let count = bag.objects.len();
    for r in bag.objects.drain(..) {
        if let Some(destructor) = r.destructor {
            destructor(r.ptr);
        }
    }
    count
}

/// Shutdown variant of [`reclaim_bag`]: catches and swallows a panicking destructor instead
/// of propagating it, so that draining the remaining bags of every slot cannot be aborted
/// partway through by one bad destructor.
pub(crate) fn reclaim_bag_swallowing(mut bag: Box<Bag>) -> usize {
    let mut count = 0;
    for r in bag.objects.drain(..) {
        if let Some(destructor) = r.destructor {
            let ptr = r.ptr;
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
                    destructor(ptr)
                }));
            if result.is_err() {
                log::warn!("destructor panicked during shutdown; swallowed");
            }
        }
        count += 1;
    }
    count
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bag_capacity() {
        let mut bag = Bag::new(3, 2);
        assert!(!bag.is_full());
        bag.push(ptr::null_mut(), None);
        assert!(!bag.is_full());
        bag.push(ptr::null_mut(), None);
        assert!(bag.is_full());
        assert_eq!(bag.count(), 2);
        assert_eq!(bag.epoch, 3);
    }

    #[test]
    fn test_reclaim_bag_runs_destructors() {
        static mut HIT: i32 = 0;
        unsafe fn bump(_p: *mut ()) {
            HIT += 1;
        }

        let mut bag = Bag::new(1, 4);
        bag.push(ptr::null_mut(), Some(bump));
        bag.push(ptr::null_mut(), Some(bump));
        bag.push(ptr::null_mut(), None);
        let count = unsafe { reclaim_bag(bag) };
        assert_eq!(count, 3);
        unsafe {
            assert_eq!(HIT, 2);
        }
    }
}
