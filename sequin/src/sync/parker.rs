use parking_lot::{Condvar, Mutex};
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::time::Instant;

const EMPTY: usize = 0;
const PARKED: usize = 1;
const NOTIFIED: usize = 2;

/// Blocks a worker thread until it is notified or a deadline passes.
///
/// A notification delivered while the worker is not parked is buffered and
/// consumed by the next `park_deadline` call, so a wake posted between "check
/// for work" and "go to sleep" is never lost.
pub(crate) struct Parker {
    state: AtomicUsize,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Parker {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicUsize::new(EMPTY),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Parks the calling thread until `unpark` is called or `deadline`
    /// passes. `None` parks with no deadline.
    pub(crate) fn park_deadline(&self, deadline: Option<Instant>) {
        // Consume a buffered notification without sleeping.
        if self.state.compare_exchange(NOTIFIED, EMPTY, SeqCst, SeqCst).is_ok() {
            return;
        }

        let mut guard = self.mutex.lock();

        match self.state.compare_exchange(EMPTY, PARKED, SeqCst, SeqCst) {
            Ok(_) => {}
            Err(NOTIFIED) => {
                // We must read from the state write `unpark` made so its
                // preceding writes are visible here; hence a swap rather
                // than trusting the value we just observed.
                let old = self.state.swap(EMPTY, SeqCst);
                debug_assert_eq!(old, NOTIFIED, "park state changed unexpectedly");
                return;
            }
            Err(actual) => panic!("inconsistent park state; actual = {actual}"),
        }

        loop {
            let timed_out = match deadline {
                Some(deadline) => self.condvar.wait_until(&mut guard, deadline).timed_out(),
                None => {
                    self.condvar.wait(&mut guard);
                    false
                }
            };

            if self.state.compare_exchange(NOTIFIED, EMPTY, SeqCst, SeqCst).is_ok() {
                return;
            }

            if timed_out {
                // A notification may still land between the timeout and
                // this swap; either way the slot must end up EMPTY.
                self.state.swap(EMPTY, SeqCst);
                return;
            }

            // Spurious wakeup, go back to sleep.
        }
    }

    pub(crate) fn unpark(&self) {
        // Swap unconditionally so the parked side always reads from this
        // write, even when the state was already NOTIFIED.
        match self.state.swap(NOTIFIED, SeqCst) {
            EMPTY | NOTIFIED => {}
            PARKED => {
                // Taking and releasing the mutex closes the window between
                // the parker publishing PARKED and actually waiting on the
                // condvar; notifying inside that window would otherwise be
                // lost.
                drop(self.mutex.lock());
                self.condvar.notify_one();
            }
            actual => panic!("inconsistent state in unpark; actual = {actual}"),
        }
    }
}
