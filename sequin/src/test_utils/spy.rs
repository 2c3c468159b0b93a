use crate::context::SetCurrentGuard;
use crate::queue::{Handle, Precision, TaskQueue};
use crate::task::Task;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// One recorded posting call, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Post,
    PostDelayed { precision: Precision, delay: Duration },
}

/// A queue that records every post and runs nothing until told to.
///
/// More powerful than a mock: tasks are held and can be drained one at a
/// time with the spy installed as the current queue, exactly as the real
/// worker would run them, which makes self-reposting task logic fully
/// deterministic under test.
pub(crate) struct SpyQueue {
    self_weak: Weak<SpyQueue>,
    calls: Mutex<Vec<Call>>,
    tasks: Mutex<VecDeque<Task>>,
}

impl SpyQueue {
    pub(crate) fn new() -> Arc<SpyQueue> {
        Arc::new_cyclic(|weak| SpyQueue {
            self_weak: weak.clone(),
            calls: Mutex::new(Vec::new()),
            tasks: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn handle(&self) -> Handle {
        Handle::new(self.self_weak.upgrade().expect("spy queue gone"))
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn queued(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Runs the next held task with this queue as current. Returns whether
    /// a task was run.
    pub(crate) fn run_next(&self) -> bool {
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                let _current = SetCurrentGuard::new(self.handle());
                task.run();
                true
            }
            None => false,
        }
    }

    /// Drains held tasks (including ones they repost) until none remain.
    /// Returns how many ran.
    pub(crate) fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl TaskQueue for SpyQueue {
    fn post_impl(&self, task: Task) {
        self.calls.lock().push(Call::Post);
        self.tasks.lock().push_back(task);
    }

    fn post_delayed_impl(&self, precision: Precision, delay: Duration, task: Task) {
        self.calls.lock().push(Call::PostDelayed { precision, delay });
        self.tasks.lock().push_back(task);
    }

    fn name(&self) -> &str {
        "spy"
    }
}
