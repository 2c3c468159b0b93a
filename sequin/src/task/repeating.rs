use crate::queue::Handle;
use crate::task::Task;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How a repeating task's closure-supplied delay relates to execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalMode {
    /// The returned delay includes execution time: the next run is scheduled
    /// at `previous_scheduled_time + delay`, so extra delay and long
    /// execution are compensated for and the task holds a steady cadence
    /// from a fixed origin. Appropriate for timed tasks with a target update
    /// rate.
    IncludingExecution,
    /// The returned delay excludes execution time: the next run is scheduled
    /// at `now_after_execution + delay`, so slow invocations naturally slow
    /// the cadence. Appropriate for resource-intensive work without strict
    /// timing requirements.
    ExcludingExecution,
}

/// Non-owning reference to a live repeating task.
///
/// The task itself is owned by the queue and lives until it is stopped, its
/// closure returns the stop sentinel, or the queue is destroyed. The handle
/// is spent after one `stop`/`post_stop`; a second call is a checked error.
pub struct RepeatingTaskHandle {
    inner: Option<Inner>,
}

struct Inner {
    queue: Handle,
    running: Arc<AtomicBool>,
}

impl RepeatingTaskHandle {
    /// Starts a task on `queue` that reschedules itself with the delay
    /// returned by `closure`; `None` stops it. The first run is posted
    /// immediately.
    pub fn start<F>(queue: Handle, mode: IntervalMode, closure: F) -> RepeatingTaskHandle
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        Self::delayed_start(queue, Duration::ZERO, mode, closure)
    }

    /// Like [`start`](Self::start), but the first run happens `first_delay`
    /// from now.
    pub fn delayed_start<F>(
        queue: Handle,
        first_delay: Duration,
        mode: IntervalMode,
        closure: F,
    ) -> RepeatingTaskHandle
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let state = RepeatState {
            mode,
            running: running.clone(),
            closure,
            next_run_time: Instant::now() + first_delay,
        };
        let task = Task::new(move || run_step(state));
        if first_delay.is_zero() {
            queue.post_task(task);
        } else {
            queue.post_delayed_task(first_delay, task);
        }
        RepeatingTaskHandle {
            inner: Some(Inner { queue, running }),
        }
    }

    /// Stops future runs. Must be called while executing on the task's own
    /// queue; use [`post_stop`](Self::post_stop) from anywhere else.
    pub fn stop(&mut self) {
        let inner = self.take_inner();
        if !inner.queue.is_current() {
            panic!(
                "FATAL: RepeatingTaskHandle::stop called off queue '{}'; use post_stop",
                inner.queue.name()
            );
        }
        inner.running.store(false, Ordering::Release);
    }

    /// Posts a stop to the task's queue and returns immediately; the task
    /// may still be running when this returns.
    pub fn post_stop(&mut self) {
        let inner = self.take_inner();
        let running = inner.running.clone();
        inner.queue.post(move || running.store(false, Ordering::Release));
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.running.load(Ordering::Acquire))
    }

    fn take_inner(&mut self) -> Inner {
        self.inner
            .take()
            .expect("FATAL: repeating task handle already stopped")
    }
}

struct RepeatState<F> {
    mode: IntervalMode,
    running: Arc<AtomicBool>,
    closure: F,
    /// The instant this run was scheduled for; origin of the
    /// including-execution cadence.
    next_run_time: Instant,
}

fn run_step<F>(mut state: RepeatState<F>)
where
    F: FnMut() -> Option<Duration> + Send + 'static,
{
    if !state.running.load(Ordering::Acquire) {
        // Dropped here, on the queue's thread, releasing the closure.
        return;
    }

    let Some(delay) = (state.closure)() else {
        state.running.store(false, Ordering::Release);
        return;
    };

    let queue = Handle::current().expect("FATAL: repeating task must run on a task queue");
    let now = Instant::now();
    let post_delay = match state.mode {
        IntervalMode::IncludingExecution => {
            // Keep the cadence anchored to the scheduled time, catching up
            // after an overrun. A remainder in the past posts immediately
            // rather than retroactively.
            state.next_run_time += delay;
            state.next_run_time.saturating_duration_since(now)
        }
        IntervalMode::ExcludingExecution => {
            state.next_run_time = now + delay;
            delay
        }
    };

    // Re-post before returning: the "keep me alive" decision is made by
    // construction, never signaled after the fact.
    let next = Task::new(move || run_step(state));
    if post_delay.is_zero() {
        queue.post_task(next);
    } else {
        queue.post_delayed_task(post_delay, next);
    }
}
