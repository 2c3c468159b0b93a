use crate::context;
use crate::sync::Event;
use crate::task::Task;
use crate::utils::ScopeGuard;
use crate::voucher::{ScopedSetter, Voucher};
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod builder;
pub use builder::{Builder, Priority};

pub mod inline;
pub use inline::InlineQueue;

pub mod threaded;
pub use threaded::Queue;


/// Precision class for delayed tasks.
///
/// This is a scheduling hint, not a correctness contract: a `Low` task may
/// run up to the queue's configured slack later than its due time so wakeups
/// can coalesce, and implementations may silently upgrade `Low` to `High`.
/// Neither class ever runs before its due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Low,
    High,
}

/// A serial execution context.
///
/// Implementations guarantee FIFO order for immediately-posted tasks and
/// never run two tasks of the same queue concurrently. The `post*` family is
/// fire-and-forget by contract: a task either runs exactly once or is
/// silently discarded (queue shutting down), and no error is returned.
/// A caller that needs confirmation has the task itself signal completion.
///
/// The provided methods capture the poster's [`Voucher`] and reinstall it
/// around the task body; implementations only supply the `*_impl` entry
/// points and must not be called directly.
pub trait TaskQueue: Send + Sync + 'static {
    fn post_impl(&self, task: Task);

    fn post_delayed_impl(&self, precision: Precision, delay: Duration, task: Task);

    fn name(&self) -> &str {
        "task-queue"
    }

    /// Schedules `task` to run as soon as the queue is free, after all
    /// previously posted immediate tasks.
    fn post(&self, task: Task) {
        self.post_impl(wrap_with_current_voucher(task));
    }

    /// Schedules `task` to become eligible at `now + delay`, with low
    /// precision. The task never runs earlier; drift is only ever positive.
    fn post_delayed(&self, delay: Duration, task: Task) {
        self.post_delayed_with_precision(Precision::Low, delay, task);
    }

    fn post_delayed_with_precision(&self, precision: Precision, delay: Duration, task: Task) {
        self.post_delayed_impl(precision, delay, wrap_with_current_voucher(task));
    }
}

// Mirrors the post-internal layering: the poster's context is captured here,
// once, no matter which queue implementation the task lands on.
fn wrap_with_current_voucher(task: Task) -> Task {
    let voucher = Voucher::current();
    Task::new(move || {
        let _setter = ScopedSetter::new(voucher);
        task.run();
    })
}

/// Cheap, cloneable reference to a queue. All posting goes through handles;
/// equality is queue identity.
#[derive(Clone)]
pub struct Handle {
    queue: Arc<dyn TaskQueue>,
}

impl Handle {
    pub(crate) fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// The queue the calling code is presently executing on, or `None` if
    /// the calling thread is not a recognized queue context.
    pub fn current() -> Option<Handle> {
        context::current()
    }

    /// Whether the calling code is executing on this queue.
    pub fn is_current(&self) -> bool {
        Handle::current().is_some_and(|current| current == *self)
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn post(&self, f: impl FnOnce() + Send + 'static) {
        self.queue.post(Task::new(f));
    }

    pub fn post_task(&self, task: Task) {
        self.queue.post(task);
    }

    pub fn post_delayed(&self, delay: Duration, f: impl FnOnce() + Send + 'static) {
        self.queue.post_delayed(delay, Task::new(f));
    }

    pub fn post_delayed_task(&self, delay: Duration, task: Task) {
        self.queue.post_delayed(delay, task);
    }

    pub fn post_delayed_with_precision(
        &self,
        precision: Precision,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) {
        self.queue
            .post_delayed_with_precision(precision, delay, Task::new(f));
    }

    /// Posts `f` and blocks until it has run on the queue, returning its
    /// result. Fails if the queue shuts down before the task runs.
    ///
    /// Use sparingly and only across distinct queues; calling this from the
    /// target queue itself would deadlock and is a checked error.
    pub fn invoke<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            panic!(
                "FATAL: Handle::invoke called on its own queue '{}'; this would deadlock",
                self.name()
            );
        }

        let done = Arc::new(Event::new());
        let slot: Arc<Mutex<Option<R>>> = Arc::new(Mutex::new(None));
        {
            let done = done.clone();
            let slot = slot.clone();
            // The guard travels inside the task closure: it fires after the
            // body runs, but also if the task is dropped unrun at teardown,
            // so the waiter below is always unblocked.
            let guard = ScopeGuard::new(move || done.set());
            self.post(move || {
                let _guard = guard;
                *slot.lock() = Some(f());
            });
        }
        done.wait_forever();

        let result = slot.lock().take();
        result.ok_or_else(|| anyhow!("queue '{}' shut down before the task ran", self.name()))
    }

    // Bypasses the voucher capture for tasks that were already wrapped once,
    // e.g. the inline adapter handing its fallback wrapper to the base queue.
    pub(crate) fn post_raw(&self, task: Task) {
        self.queue.post_impl(task);
    }

    pub(crate) fn post_delayed_raw(&self, precision: Precision, delay: Duration, task: Task) {
        self.queue.post_delayed_impl(precision, delay, task);
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.queue), Arc::as_ptr(&other.queue))
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("queue", &self.name()).finish()
    }
}
