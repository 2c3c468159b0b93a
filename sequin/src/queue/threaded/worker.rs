use super::Shared;
use crate::context::SetCurrentGuard;
use crate::queue::builder::Priority;
use crate::queue::{Handle, TaskQueue};
use crate::utils::thread;
use bitflags::bitflags;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, trace};

bitflags! {
    /// What woke the worker up, or what it found ready on a pass. The worker
    /// waits on the wake signal and the earliest timer deadline at once and
    /// dispatches by whichever fired, so immediate and delayed work cannot
    /// starve each other.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct WakeEvents: u8 {
        const STOP = 1;
        const TIMERS = 1 << 1;
        const IMMEDIATE = 1 << 2;
    }
}

pub(super) fn run(shared: Arc<Shared>, handle: Handle, priority: Priority) {
    thread::set_current_thread_name(shared.name());
    thread::set_current_thread_niceness(priority.niceness());

    // The whole worker lifetime counts as "on this queue".
    let _current = SetCurrentGuard::new(handle);
    debug!(queue = %shared.name(), "worker started");

    loop {
        let events = poll_events(&shared);

        if events.contains(WakeEvents::STOP) {
            break;
        }
        if events.contains(WakeEvents::TIMERS) {
            run_due_tasks(&shared);
        }
        if events.contains(WakeEvents::IMMEDIATE) {
            run_pending_tasks(&shared);
        }

        if events.is_empty() {
            let deadline = shared.timers.lock().next_wakeup();
            shared.wake.park_deadline(deadline);
        }
    }

    discard_leftovers(&shared);
    debug!(queue = %shared.name(), "worker stopped");
}

fn poll_events(shared: &Shared) -> WakeEvents {
    let mut events = WakeEvents::empty();
    if shared.stopped.load(Ordering::Acquire) {
        return WakeEvents::STOP;
    }
    if shared.timers.lock().has_due(Instant::now()) {
        events |= WakeEvents::TIMERS;
    }
    if !shared.pending.is_empty() {
        events |= WakeEvents::IMMEDIATE;
    }
    events
}

fn run_due_tasks(shared: &Shared) {
    // Pop under the lock, run outside it: the timer lock is never held
    // across task execution.
    let due = shared.timers.lock().pop_due(Instant::now());
    for task in due {
        task.run();
    }
}

fn run_pending_tasks(shared: &Shared) {
    while let Some(task) = shared.pending.pop() {
        task.run();
    }
}

fn discard_leftovers(shared: &Shared) {
    let mut dropped = shared.timers.lock().clear();
    while shared.pending.pop().is_some() {
        dropped += 1;
    }
    if dropped > 0 {
        trace!(queue = %shared.name(), dropped, "discarded tasks at shutdown");
    }
}
