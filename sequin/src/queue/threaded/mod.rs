use crate::queue::builder::Priority;
use crate::queue::{Handle, Precision, TaskQueue};
use crate::sync::Parker;
use crate::task::Task;
use anyhow::{Context, Result};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::trace;

mod timer;
use timer::TimerHeap;

mod worker;


#[derive(Debug, Clone)]
pub(crate) struct QueueConfig {
    pub(crate) name: String,
    pub(crate) priority: Priority,
    pub(crate) low_precision_slack: Duration,
}

/// State shared between a queue's worker thread and every posting handle.
///
/// The pending FIFO is lock-free; the timer heap has its own lock, held only
/// for heap mutation and never across task execution.
pub(crate) struct Shared {
    name: String,
    pending: SegQueue<Task>,
    timers: Mutex<TimerHeap>,
    wake: Parker,
    stopped: AtomicBool,
}

impl Shared {
    fn new(config: &QueueConfig) -> Self {
        Self {
            name: config.name.clone(),
            pending: SegQueue::new(),
            timers: Mutex::new(TimerHeap::new(config.low_precision_slack)),
            wake: Parker::new(),
            stopped: AtomicBool::new(false),
        }
    }
}

impl TaskQueue for Shared {
    fn post_impl(&self, task: Task) {
        if self.stopped.load(Ordering::Acquire) {
            trace!(queue = %self.name, "dropping task posted after shutdown");
            return;
        }
        self.pending.push(task);
        self.wake.unpark();
    }

    fn post_delayed_impl(&self, precision: Precision, delay: Duration, task: Task) {
        if delay.is_zero() {
            // Run-immediately goes to the FIFO, not the timer heap.
            return self.post_impl(task);
        }
        if self.stopped.load(Ordering::Acquire) {
            trace!(queue = %self.name, "dropping delayed task posted after shutdown");
            return;
        }

        let due = Instant::now() + delay;
        let rearm = {
            let mut timers = self.timers.lock();
            let before = timers.next_wakeup();
            timers.insert(precision, due, task);
            // Inserting can only keep or advance the wakeup; wake the
            // worker when it must re-arm for an earlier deadline.
            before != timers.next_wakeup()
        };
        if rearm {
            self.wake.unpark();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Owning handle to a worker-thread queue, built via [`crate::Builder`].
///
/// Dropping the `Queue` stops the queue: tasks not yet run are discarded
/// without running, and the drop does not return until the worker thread has
/// finished its in-flight task and exited. Outstanding [`Handle`]s stay valid
/// but their posts are silently dropped from then on.
pub struct Queue {
    shared: Arc<Shared>,
    handle: Handle,
    join: Option<JoinHandle<()>>,
}

impl Queue {
    pub(crate) fn spawn(config: QueueConfig) -> Result<Queue> {
        let shared = Arc::new(Shared::new(&config));
        let handle = Handle::new(shared.clone());

        let worker_shared = shared.clone();
        let worker_handle = handle.clone();
        let join = std::thread::Builder::new()
            .spawn(move || worker::run(worker_shared, worker_handle, config.priority))
            .with_context(|| format!("failed to spawn worker thread for queue '{}'", config.name))?;

        Ok(Queue {
            shared,
            handle,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        if self.handle.is_current() {
            panic!(
                "FATAL: queue '{}' dropped from its own worker thread",
                self.name()
            );
        }
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.wake.unpark();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
