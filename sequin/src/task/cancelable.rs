use crate::queue::Handle;
use crate::task::Task;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Shared canceled flag between a scheduled task and any number of handles.
///
/// `cancel` is the sole mutation entry point and is deliberately a relaxed,
/// check-free write: it must be callable from any thread, cross-queue. The
/// flag is read at each run decision, so cancellation takes effect before
/// the *next* run, never retroactively for work already past that point.
struct CancellationToken {
    canceled: AtomicBool,
}

/// Cheap-to-copy handle for requesting that a scheduled task not run.
///
/// Any number of clones may reference the same task; dropping handles never
/// cancels. Only an explicit [`cancel`](CancellationHandle::cancel) call
/// does. Canceling an already-completed task is a safe no-op, as is
/// canceling twice.
#[derive(Clone)]
pub struct CancellationHandle {
    token: Arc<CancellationToken>,
}

impl CancellationHandle {
    fn new() -> Self {
        Self {
            token: Arc::new(CancellationToken {
                canceled: AtomicBool::new(false),
            }),
        }
    }

    pub fn cancel(&self) {
        self.token.canceled.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.token.canceled.load(Ordering::Relaxed)
    }
}

/// A handle not attached to any task; `cancel` does nothing.
impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a periodic task together with its cancellation handle.
///
/// Post the returned task once; on each run it checks the shared flag and,
/// if live, invokes `closure`. The closure's return drives rescheduling on
/// the queue the task is executing on: `None` stops, `Some(ZERO)` re-posts
/// to the immediate FIFO, `Some(delay)` re-posts delayed. A canceled task
/// treats itself as a no-op completion and releases the closure on the
/// queue's thread.
pub fn cancelable_periodic_task<F>(closure: F) -> (Task, CancellationHandle)
where
    F: FnMut() -> Option<Duration> + Send + 'static,
{
    let handle = CancellationHandle::new();
    let token = handle.token.clone();
    (Task::new(move || periodic_step(token, closure)), handle)
}

fn periodic_step<F>(token: Arc<CancellationToken>, mut closure: F)
where
    F: FnMut() -> Option<Duration> + Send + 'static,
{
    if token.canceled.load(Ordering::Relaxed) {
        return;
    }
    if let Some(delay) = closure() {
        let queue = Handle::current()
            .expect("FATAL: cancelable periodic task must run on a task queue");
        let next = Task::new(move || periodic_step(token, closure));
        if delay.is_zero() {
            queue.post_task(next);
        } else {
            queue.post_delayed_task(delay, next);
        }
    }
}
