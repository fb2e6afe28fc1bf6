use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

/// Stable engine-internal identity for a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Min-heap of next-run times.
///
/// Keys are `(next_run, insertion seq)`, so two tasks due at the same
/// instant cannot collide and dispatch in insertion order. A task is in the
/// heap exactly once whenever it is not being dispatched.
pub(crate) struct ScheduleQueue {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, TaskId)>>,
    seq: u64,
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn insert(&mut self, id: TaskId, when: DateTime<Utc>) {
        self.heap.push(Reverse((when, self.seq, id)));
        self.seq += 1;
    }

    /// Drain every entry due at or before `now`, in `(next_run, insertion)`
    /// order. Entries reinserted by the caller get a fresh sequence number
    /// and are not seen again until the next cycle.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut due = Vec::new();
        while let Some(Reverse((when, _, _))) = self.heap.peek() {
            if *when > now {
                break;
            }
            let Reverse((_, _, id)) = self.heap.pop().expect("peeked entry vanished");
            due.push(id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
