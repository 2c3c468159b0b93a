use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One-shot signal used to block a thread until another thread flags
/// completion. Once set, an event stays set.
#[derive(Default)]
pub struct Event {
    set: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *self.set.lock() = true;
        self.condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Blocks until the event is set or `timeout` elapses. Returns whether
    /// the event was set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.set.lock();
        while !*set {
            if self.condvar.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }

    /// Blocks until the event is set, with no timeout.
    pub fn wait_forever(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.condvar.wait(&mut set);
        }
    }
}
