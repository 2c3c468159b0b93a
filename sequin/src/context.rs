use crate::queue::Handle;
use std::cell::RefCell;

thread_local! {
    /// The queue the calling thread is currently executing a task for, if any.
    static CURRENT_QUEUE: RefCell<Option<Handle>> = const { RefCell::new(None) };
}

pub(crate) fn current() -> Option<Handle> {
    CURRENT_QUEUE.with(|cell| cell.borrow().clone())
}

/// Installs `handle` as the thread's current queue for the guard's lifetime.
///
/// The previous value is restored unconditionally on drop, including on
/// unwind, so guards may nest (inline execution inside a worker thread).
pub(crate) struct SetCurrentGuard {
    prev: Option<Handle>,
}

impl SetCurrentGuard {
    pub(crate) fn new(handle: Handle) -> Self {
        let prev = CURRENT_QUEUE.with(|cell| cell.borrow_mut().replace(handle));
        Self { prev }
    }
}

impl Drop for SetCurrentGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        // The thread-local may already be gone during thread teardown.
        let _ = CURRENT_QUEUE.try_with(|cell| *cell.borrow_mut() = prev);
    }
}
