use crate::context::SetCurrentGuard;
use crate::queue::threaded::Queue;
use crate::queue::{Handle, Precision, TaskQueue};
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;


/// Adapter that executes an immediately-posted task synchronously on the
/// caller's thread when the wrapped queue is uncontended, falling back to
/// normal queuing otherwise.
///
/// The serial-execution invariant still holds: an atomic count of in-flight
/// or queued tasks gates the fast path (only the claimant of the first slot
/// may run inline), and a task mutex is the serialization point when inline
/// execution races a still-draining queued task. While a task runs inline,
/// the thread's current queue reports the adapter itself, so `is_current`
/// checks and nested posts behave exactly as in the asynchronous case.
///
/// Delayed tasks never run inline; they take the slow path through the
/// wrapped queue but share the same counter and mutex bookkeeping.
pub struct InlineQueue {
    // Owned so that dropping the adapter stops the base queue.
    _base: Queue,
    inner: Arc<Inner>,
}

impl InlineQueue {
    pub fn new(base: Queue) -> Self {
        let base_handle = base.handle();
        let name = format!("{}/inline", base.name());
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            base: base_handle,
            name,
            queue_size: AtomicUsize::new(0),
            task_mu: Mutex::new(()),
            self_weak: weak.clone(),
        });
        Self { _base: base, inner }
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.inner.clone())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

struct Inner {
    base: Handle,
    name: String,
    /// How many tasks are in flight or queued. An atomic, not a counter
    /// under `task_mu`, so the fast path can be claimed without taking the
    /// mutex and re-entrant posts cannot invert lock order.
    queue_size: AtomicUsize,
    /// Ensures queued, delayed and inline tasks run in isolation.
    task_mu: Mutex<()>,
    self_weak: Weak<Inner>,
}

impl Inner {
    fn self_arc(&self) -> Arc<Inner> {
        // Posting requires a live Handle, which keeps the Arc alive.
        self.self_weak.upgrade().expect("inline queue state dropped while in use")
    }
}

/// Holds one slot of `queue_size`, released on drop so the count is also
/// given back when a wrapped task is discarded unrun at queue teardown.
struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.queue_size.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskQueue for Inner {
    fn post_impl(&self, task: Task) {
        if self.queue_size.fetch_add(1, Ordering::SeqCst) == 0 {
            // Uncontended: run inline on the calling thread. The mutex keeps
            // us serial with a queued or delayed task that is still
            // finishing, and the slot is released only afterwards.
            // Declaration order matters: unwinding or scope exit restores
            // the current queue, releases the mutex, then gives the slot
            // back, in that order.
            let _slot = SlotGuard { inner: self.self_arc() };
            let _lock = self.task_mu.lock();
            let _current = SetCurrentGuard::new(Handle::new(self.self_arc()));
            task.run();
        } else {
            // Contended: the slot claimed above travels with the wrapper to
            // the base queue and is released when the wrapper completes (or
            // is dropped unrun).
            let inner = self.self_arc();
            let slot = SlotGuard { inner: inner.clone() };
            let wrapped = Task::new(move || {
                let _slot = slot;
                let _lock = inner.task_mu.lock();
                let _current = SetCurrentGuard::new(Handle::new(inner.clone()));
                task.run();
            });
            self.base.post_raw(wrapped);
        }
    }

    fn post_delayed_impl(&self, precision: Precision, delay: Duration, task: Task) {
        // Never inline: a delayed task takes a slot only while executing, so
        // inline execution stays available while it is pending.
        let inner = self.self_arc();
        let wrapped = Task::new(move || {
            inner.queue_size.fetch_add(1, Ordering::SeqCst);
            let _slot = SlotGuard { inner: inner.clone() };
            let _lock = inner.task_mu.lock();
            let _current = SetCurrentGuard::new(Handle::new(inner.clone()));
            task.run();
        });
        self.base.post_delayed_raw(precision, delay, wrapped);
    }

    fn name(&self) -> &str {
        &self.name
    }
}
