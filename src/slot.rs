//! The thread slot table: one cell per registered thread, claimed and released via a
//! CAS-guarded active mask.

use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use crate::limbo::{reclaim_bag, reclaim_bag_swallowing, Bag, DestructorFn};
use crate::util::{pause, Aligned64};

/// Sentinel for "this slot has never held a thread" / "this slot was released". No real
/// `pthread_t` observed by this crate is ever zero.
pub(crate) const INVALID_THREAD_ID: u64 = 0;

/// One cell in the manager's thread table.
///
/// `observed_epoch`/`pinned` are written only by the owning thread and read by the
/// reclaimer/neutralizer; `neutralized` is written by the owning thread (on acknowledge) and
/// by the signal handler running *in* the owning thread's context (never cross-thread).
/// `head` is the newest limbo bag and is appended to only by the owning thread; each bag's
/// own `next` pointer may be rewritten exactly once by a reclaimer splicing off the oldest
/// suffix of the list (see [`crate::reclaim`]).
#[repr(align(64))]
pub(crate) struct Slot {
    pub observed_epoch: AtomicU64,
    pub pinned: AtomicBool,
    pub neutralized: AtomicBool,
    pub thread_id: AtomicU64,
    head: AtomicPtr<Bag>,
    limbo_count: AtomicUsize,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            observed_epoch: AtomicU64::new(0),
            pinned: AtomicBool::new(false),
            neutralized: AtomicBool::new(false),
            thread_id: AtomicU64::new(INVALID_THREAD_ID),
            head: AtomicPtr::new(std::ptr::null_mut()),
            limbo_count: AtomicUsize::new(0),
        }
    }
}

impl Slot {
    #[inline]
    pub fn is_claimed(&self) -> bool {
        self.thread_id.load(Ordering::Acquire) != INVALID_THREAD_ID
    }

    #[inline]
    pub fn limbo_count(&self) -> usize {
        self.limbo_count.load(Ordering::Relaxed)
    }

    /// Append `(ptr, destructor)` to this slot's current bag, allocating a fresh one if the
    /// current bag is absent or full. Single-writer: only ever called by the owning thread
    /// from within a pinned critical section.
    ///
    /// # Safety
    /// Must only be called by the thread that owns this slot.
    pub(crate) unsafe fn retire(
        &self,
        observed_epoch: u64,
        bag_capacity: usize,
        ptr: *mut (),
        destructor: Option<DestructorFn>,
    ) {
        let mut head = self.head.load(Ordering::Acquire);
        let needs_new_bag = head.is_null() || (*head).is_full();
        if needs_new_bag {
            let new_bag = Box::into_raw(Bag::new(observed_epoch, bag_capacity));
            (*new_bag).set_next(head);
            self.head.store(new_bag, Ordering::Release);
            head = new_bag;
        }
        (*head).push(ptr, destructor);
        self.limbo_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Reclaim every bag in this slot's list whose epoch is strictly below `threshold`.
    /// Bags are in non-increasing epoch order from `head` (newest) onward, so once we find
    /// (walking from the newest end) the first bag eligible for reclamation, every bag after
    /// it toward the oldest end is eligible too; that suffix is spliced off in one CAS and
    /// reclaimed.
    ///
    /// # Safety
    /// May be called by any thread, but at most one reclamation pass may run against a given
    /// slot at a time (the caller serializes concurrent reclaimers, e.g. via the manager).
    pub(crate) unsafe fn reclaim_below(&self, threshold: u64) -> usize {
        let mut kept_tail: *mut Bag = std::ptr::null_mut();
        let mut iter = self.head.load(Ordering::Acquire);
        while !iter.is_null() && (*iter).epoch >= threshold {
            kept_tail = iter;
            iter = (*iter).next();
        }
        // `iter` now points at the first bag eligible for reclamation (or is null). Splice it
        // off the list: either truncate the kept prefix's tail, or clear `head` entirely if
        // every bag was eligible.
        if iter.is_null() {
            return 0;
        }
        if kept_tail.is_null() {
            self.head.store(std::ptr::null_mut(), Ordering::Release);
        } else {
            (*kept_tail).set_next(std::ptr::null_mut());
        }

        let mut reclaimed = 0;
        let mut victim = iter;
        while !victim.is_null() {
            let next = (*victim).next();
            let bag = Box::from_raw(victim);
            reclaimed += bag.count();
            self.limbo_count.fetch_sub(bag.count(), Ordering::Relaxed);
            reclaim_bag(bag);
            victim = next;
        }
        reclaimed
    }

    /// Drain every bag unconditionally, swallowing destructor panics. Used by
    /// `Manager::shutdown` and by `Handle::deregister`.
    ///
    /// # Safety
    /// Must only be called once the slot is no longer concurrently retired into (the
    /// thread has exited the critical section / deregistered).
    pub(crate) unsafe fn drain_all(&self) -> usize {
        let mut total = 0;
        let mut iter = self.head.swap(std::ptr::null_mut(), Ordering::AcqRel);
        while !iter.is_null() {
            let next = (*iter).next();
            let bag = Box::from_raw(iter);
            let count = bag.count();
            total += count;
            self.limbo_count.fetch_sub(count, Ordering::Relaxed);
            reclaim_bag_swallowing(bag);
            iter = next;
        }
        total
    }

    /// Reset a released slot back to its free state. Caller must have already drained it.
    pub(crate) fn reset(&self) {
        self.observed_epoch.store(0, Ordering::Relaxed);
        self.pinned.store(false, Ordering::Relaxed);
        self.neutralized.store(false, Ordering::Relaxed);
        self.thread_id.store(INVALID_THREAD_ID, Ordering::Release);
    }
}

/// Bitmask tracking which slots are claimed, one word per 64 slots.
pub(crate) struct ActiveMask {
    words: Vec<Aligned64<AtomicU64>>,
}

impl ActiveMask {
    pub fn new(max_threads: usize) -> Self {
        let word_count = max_threads.div_ceil(64).max(1);
        let mut words = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            words.push(Aligned64(AtomicU64::new(0)));
        }
        ActiveMask { words }
    }

    /// Attempt to claim `index`. Returns true on success.
    fn try_claim(&self, index: usize) -> bool {
        let word = &self.words[index / 64];
        let bit = 1u64 << (index % 64);
        let mut expected = word.load(Ordering::Relaxed);
        loop {
            if expected & bit != 0 {
                return false;
            }
            match word.compare_exchange_weak(
                expected,
                expected | bit,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => expected = actual,
            }
        }
    }

    fn clear(&self, index: usize) {
        let word = &self.words[index / 64];
        let bit = 1u64 << (index % 64);
        word.fetch_and(!bit, Ordering::Release);
    }

    /// Total number of claimed slots. Used by tests and diagnostics.
    pub fn popcount(&self) -> u32 {
        self.words.iter().map(|w| w.load(Ordering::Relaxed).count_ones()).sum()
    }

    /// Snapshot as a single `u64` when the table fits in one word (the common case, and the
    /// one the scenario tests in `tests/` exercise directly).
    pub fn as_u64(&self) -> u64 {
        self.words[0].load(Ordering::Relaxed)
    }
}

/// Scan the active mask for a free slot and claim it via CAS, publishing `thread_id`.
/// Returns the claimed index, or `None` if every slot is occupied.
pub(crate) fn claim_slot(slots: &[Slot], mask: &ActiveMask, thread_id: u64) -> Option<usize> {
    loop {
        let mut found_candidate = false;
        for index in 0..slots.len() {
            if slots[index].is_claimed() {
                continue;
            }
            found_candidate = true;
            if mask.try_claim(index) {
                slots[index].thread_id.store(thread_id, Ordering::Release);
                return Some(index);
            }
            // Lost the race for this slot; try the next one.
            pause();
        }
        if !found_candidate {
            return None;
        }
    }
}

/// Release a claimed slot: the caller must have already drained its bags.
pub(crate) fn release_slot(slots: &[Slot], mask: &ActiveMask, index: usize) {
    slots[index].reset();
    mask.clear(index);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_claim_and_release() {
        let slots: Vec<Slot> = (0..4).map(|_| Slot::default()).collect();
        let mask = ActiveMask::new(4);

        let a = claim_slot(&slots, &mask, 111).unwrap();
        let b = claim_slot(&slots, &mask, 222).unwrap();
        assert_ne!(a, b);
        assert_eq!(mask.popcount(), 2);

        release_slot(&slots, &mask, a);
        assert_eq!(mask.popcount(), 1);
        assert!(!slots[a].is_claimed());
    }

    #[test]
    fn test_exhaustion() {
        let slots: Vec<Slot> = (0..2).map(|_| Slot::default()).collect();
        let mask = ActiveMask::new(2);
        claim_slot(&slots, &mask, 1).unwrap();
        claim_slot(&slots, &mask, 2).unwrap();
        assert_eq!(mask.as_u64(), 0b11);
        assert!(claim_slot(&slots, &mask, 3).is_none());
        assert_eq!(mask.as_u64(), 0b11);
    }

    #[test]
    fn test_retire_and_reclaim_below() {
        let slot = Slot::default();
        unsafe {
            slot.retire(1, 64, std::ptr::null_mut(), None);
            slot.retire(1, 64, std::ptr::null_mut(), None);
        }
        assert_eq!(slot.limbo_count(), 2);
        let reclaimed = unsafe { slot.reclaim_below(2) };
        assert_eq!(reclaimed, 2);
        assert_eq!(slot.limbo_count(), 0);
    }
}
