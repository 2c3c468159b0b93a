use crate::queue::threaded::{Queue, QueueConfig};
use anyhow::Result;
use std::time::Duration;

/// Default slack applied to low-precision delayed tasks, roughly one frame
/// interval. Tunable per queue via [`Builder::low_precision_slack`].
const LOW_PRECISION_SLACK: Duration = Duration::from_millis(17);

/// Relative priority of a queue's worker thread, applied as a best-effort
/// niceness hint on platforms that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub(crate) fn niceness(self) -> i32 {
        match self {
            Priority::Low => 10,
            Priority::Normal => 0,
            Priority::High => -10,
        }
    }
}

/// Configures and spawns a worker-thread [`Queue`].
#[derive(Debug)]
pub struct Builder {
    name: String,
    priority: Priority,
    low_precision_slack: Duration,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "queue name cannot be empty");
        Self {
            name,
            priority: Priority::Normal,
            low_precision_slack: LOW_PRECISION_SLACK,
        }
    }

    pub fn priority(&mut self, priority: Priority) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Sets how late a low-precision delayed task may run past its due time
    /// so the worker can batch wakeups. Zero disables coalescing, making
    /// low precision behave like high precision.
    pub fn low_precision_slack(&mut self, slack: Duration) -> &mut Self {
        self.low_precision_slack = slack;
        self
    }

    /// Spawns the worker thread and returns the owning queue handle.
    ///
    /// The returned `Queue` is ready to accept posts; dropping it stops the
    /// worker and discards anything not yet run.
    pub fn try_build(&mut self) -> Result<Queue> {
        Queue::spawn(QueueConfig {
            name: self.name.clone(),
            priority: self.priority,
            low_precision_slack: self.low_precision_slack,
        })
    }
}
