use crate::queue::Precision;
use crate::task::Task;
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Min-heap of delayed tasks, keyed by `(due, seq)`.
///
/// Tasks are released in due-time order, FIFO among exact ties (the sequence
/// number is global across both precision classes). Low-precision entries
/// only influence *wakeup* scheduling: their wakeup may lag `due` by up to
/// the configured slack so the worker can batch nearby timers, but
/// eligibility is always governed by `due` alone.
pub(crate) struct TimerHeap {
    // One heap per precision class. The slack is constant per queue, so
    // ordering the low heap by due time also orders it by wakeup time.
    high: BinaryHeap<Reverse<TimerEntry>>,
    low: BinaryHeap<Reverse<TimerEntry>>,
    slack: Duration,
    next_seq: u64,
}

struct TimerEntry {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

impl TimerHeap {
    pub(crate) fn new(slack: Duration) -> Self {
        Self {
            high: BinaryHeap::new(),
            low: BinaryHeap::new(),
            slack,
            next_seq: 0,
        }
    }

    pub(crate) fn insert(&mut self, precision: Precision, due: Instant, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = Reverse(TimerEntry { due, seq, task });
        match precision {
            Precision::High => self.high.push(entry),
            Precision::Low => self.low.push(entry),
        }
    }

    /// Earliest instant the worker must wake up: the next high-precision due
    /// time, or the next low-precision due time plus slack, whichever comes
    /// first. `None` when no timers are pending.
    pub(crate) fn next_wakeup(&self) -> Option<Instant> {
        let high = self.high.peek().map(|entry| entry.0.due);
        let low = self.low.peek().map(|entry| entry.0.due + self.slack);
        match (high, low) {
            (Some(high), Some(low)) => Some(high.min(low)),
            (high, None) => high,
            (None, low) => low,
        }
    }

    /// Whether any entry is already eligible to run.
    pub(crate) fn has_due(&self, now: Instant) -> bool {
        let due = |heap: &BinaryHeap<Reverse<TimerEntry>>| {
            heap.peek().is_some_and(|entry| entry.0.due <= now)
        };
        due(&self.high) || due(&self.low)
    }

    /// Drains every entry with `due <= now`, in `(due, seq)` order across
    /// both precision classes.
    pub(crate) fn pop_due(&mut self, now: Instant) -> SmallVec<[Task; 8]> {
        let mut due = SmallVec::new();
        loop {
            let take_high = match (self.high.peek(), self.low.peek()) {
                (None, None) => break,
                (Some(high), None) => {
                    if high.0.due > now {
                        break;
                    }
                    true
                }
                (None, Some(low)) => {
                    if low.0.due > now {
                        break;
                    }
                    false
                }
                (Some(high), Some(low)) => {
                    let take_high = (high.0.due, high.0.seq) <= (low.0.due, low.0.seq);
                    let earliest = if take_high { high.0.due } else { low.0.due };
                    if earliest > now {
                        break;
                    }
                    take_high
                }
            };
            let heap = if take_high { &mut self.high } else { &mut self.low };
            let entry = heap.pop().expect("peeked entry vanished").0;
            due.push(entry.task);
        }
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }

    /// Discards every pending entry without running it. Returns how many
    /// were dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.high.clear();
        self.low.clear();
        dropped
    }
}
