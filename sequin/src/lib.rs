mod context;

pub mod queue;
pub use queue::{Builder, Handle, InlineQueue, Precision, Priority, Queue, TaskQueue};

pub mod task;
pub use task::Task;
pub use task::cancelable::{CancellationHandle, cancelable_periodic_task};
pub use task::repeating::{IntervalMode, RepeatingTaskHandle};

pub mod voucher;
pub use voucher::Voucher;

pub mod sync;
pub use sync::Event;

mod utils;

#[cfg(test)]
mod test_utils;
