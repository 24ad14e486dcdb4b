//! A Treiber stack built on `debra_reclaim`, showing how a concrete lock-free container
//! unlinks a node under a pin and hands it to the reclaimer instead of freeing it
//! immediately. Illustrative only, concrete containers are an out-of-scope collaborator
//! per the crate's purpose and scope, so this lives under `demos/` rather than `src/`.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use std::thread;

use debra_reclaim::config::Config;
use debra_reclaim::handle::Handle;
use debra_reclaim::limbo::DestructorFn;
use debra_reclaim::manager::Manager;

struct Node<T> {
    value: Option<T>,
    next: *mut Node<T>,
}

unsafe fn drop_node<T>(ptr: *mut ()) {
    drop(Box::from_raw(ptr as *mut Node<T>));
}

/// A lock-free LIFO stack. Callers provide their own `Handle`, one per thread, the same way
/// they would for any other critical section guarded by this crate.
///
/// `T: Send` because a node pushed by one thread may be dropped by the reclaimer running on
/// another thread entirely.
pub struct Stack<T: Send> {
    top: AtomicPtr<Node<T>>,
}

impl<T: Send> Default for Stack<T> {
    fn default() -> Self {
        Stack {
            top: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T: Send> Stack<T> {
    pub fn push(&self, handle: &Handle, value: T) {
        let node = Box::into_raw(Box::new(Node {
            value: Some(value),
            next: ptr::null_mut(),
        }));
        let pinned = handle.unpinned().pin();
        let mut current = self.top.load(Ordering::Acquire);
        loop {
            unsafe {
                (*node).next = current;
            }
            match self
                .top
                .compare_exchange_weak(current, node, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let _ = pinned.unpin();
    }

    pub fn pop(&self, handle: &Handle) -> Option<T> {
        let pinned = handle.unpinned().pin();
        let mut current = self.top.load(Ordering::Acquire);
        loop {
            if current.is_null() {
                let _ = pinned.unpin();
                return None;
            }
            let next = unsafe { (*current).next };
            match self
                .top
                .compare_exchange_weak(current, next, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let value = unsafe { (*current).value.take() };
        let retired = pinned
            .retire_ready()
            .retire(current as *mut (), Some(drop_node::<T> as DestructorFn));
        let _ = retired.unpin();
        value
    }
}

fn main() {
    let manager = Manager::new(Config::with_max_threads(8));
    let stack = Arc::new(Stack::default());

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let stack = Arc::clone(&stack);
            thread::spawn(move || {
                let handle = Handle::register(&manager).unwrap();
                for n in 0..1000 {
                    stack.push(&handle, i * 1000 + n);
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let stack = Arc::clone(&stack);
            thread::spawn(move || {
                let handle = Handle::register(&manager).unwrap();
                let mut popped = 0;
                while stack.pop(&handle).is_some() {
                    popped += 1;
                }
                popped
            })
        })
        .collect();
    let total: i32 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    println!("popped {} values", total);

    manager.advance_epoch();
    manager.advance_epoch();
    let reclaimed = match manager.reclaim_start().load_epochs().check_safe() {
        debra_reclaim::reclaim::ReclaimState::Ready(ready) => ready.try_reclaim(),
        debra_reclaim::reclaim::ReclaimState::Blocked => 0,
    };
    println!("reclaimed {} nodes", reclaimed);
}
