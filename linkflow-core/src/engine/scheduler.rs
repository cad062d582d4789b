//! Run Scheduler
//!
//! The scheduler holds the instances waiting to execute and decides their
//! order. It is owned by an [`Engine`](super::Engine); nothing about it is
//! process-wide.
//!
//! # Algorithm
//!
//! 1. An invalidated live instance is enqueued. It is inserted right before
//!    the first queued instance whose dependency set contains it (a producer
//!    runs before a consumer already waiting), or appended if none does.
//! 2. A flush pops the queue head and executes it until the queue is empty.
//!    Executions may enqueue more instances; they join the same flush.
//! 3. Each instance executes at most once per flush. An instance invalidated
//!    again after it ran is not re-queued in that flush, which bounds every
//!    flush by the number of instances even in cyclic graphs.
//! 4. A flush aborted by an error keeps whatever is still queued; the next
//!    flush starts with it.
//!
//! The dependency sets are cached upstream closures, so the ordering is a
//! heuristic, not a full topological sort of the live graph.

use std::collections::{HashSet, VecDeque};

use crate::node::InstanceId;

/// The pending queue and the per-flush bookkeeping.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// A flush is draining the queue.
    flushing: bool,

    /// Instances waiting to execute, in execution order.
    queue: VecDeque<InstanceId>,

    /// Instances already executed in the current flush.
    executed: HashSet<InstanceId>,
}

impl Scheduler {
    /// Create an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued instances.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued instances in execution order.
    pub fn pending(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.queue.iter().copied()
    }

    /// Whether `id` already ran in the current flush.
    pub fn has_executed(&self, id: InstanceId) -> bool {
        self.flushing && self.executed.contains(&id)
    }

    /// Queue `id`.
    ///
    /// `depends_on(queued)` must report whether the already queued instance
    /// depends on `id`.
    pub fn enqueue<F>(&mut self, id: InstanceId, depends_on: F)
    where
        F: Fn(InstanceId) -> bool,
    {
        match self.queue.iter().position(|&queued| depends_on(queued)) {
            Some(index) => {
                tracing::trace!(instance = %id, before = %self.queue[index], "enqueue ahead of dependent");
                self.queue.insert(index, id);
            }
            None => {
                tracing::trace!(instance = %id, "enqueue at tail");
                self.queue.push_back(id);
            }
        }
    }

    /// Start a flush. Returns `false` if one is already running or there is
    /// nothing to do.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing || self.queue.is_empty() {
            return false;
        }
        self.flushing = true;
        self.executed.clear();
        true
    }

    /// Pop the next instance to execute and record it as executed.
    pub fn pop(&mut self) -> Option<InstanceId> {
        let id = self.queue.pop_front()?;
        self.executed.insert(id);
        Some(id)
    }

    /// Drop `id` from the queue. Returns `false` if it was not queued.
    pub fn remove(&mut self, id: InstanceId) -> bool {
        match self.queue.iter().position(|&queued| queued == id) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Finish the current flush.
    ///
    /// Instances still queued, which only happens when the flush was aborted
    /// by an error, stay queued and run in the next flush.
    pub fn end_flush(&mut self) {
        self.flushing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> InstanceId {
        InstanceId::new(raw)
    }

    #[test]
    fn appends_unrelated_instances() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(id(1), |_| false);
        scheduler.enqueue(id(2), |_| false);

        assert_eq!(scheduler.pending().collect::<Vec<_>>(), vec![id(1), id(2)]);
    }

    #[test]
    fn producer_jumps_ahead_of_waiting_consumer() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(id(1), |_| false);
        scheduler.enqueue(id(3), |_| false);

        // 3 depends on 2.
        scheduler.enqueue(id(2), |queued| queued == id(3));

        assert_eq!(scheduler.pending().collect::<Vec<_>>(), vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn flush_tracks_executed_instances() {
        let mut scheduler = Scheduler::new();
        assert!(!scheduler.begin_flush());

        scheduler.enqueue(id(1), |_| false);
        assert!(scheduler.begin_flush());
        assert!(!scheduler.begin_flush());

        assert_eq!(scheduler.pop(), Some(id(1)));
        assert!(scheduler.has_executed(id(1)));
        assert_eq!(scheduler.pop(), None);

        scheduler.end_flush();
        assert!(!scheduler.has_executed(id(1)));
    }

    #[test]
    fn aborted_flush_keeps_leftovers_for_the_next_one() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(id(1), |_| false);
        scheduler.enqueue(id(2), |_| false);
        scheduler.begin_flush();
        scheduler.pop();
        scheduler.end_flush();

        assert_eq!(scheduler.pending().collect::<Vec<_>>(), vec![id(2)]);
        assert!(scheduler.begin_flush());
        assert!(!scheduler.has_executed(id(1)));
        assert_eq!(scheduler.pop(), Some(id(2)));
    }

    #[test]
    fn remove_drops_a_queued_instance() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(id(1), |_| false);
        scheduler.enqueue(id(2), |_| false);

        assert!(scheduler.remove(id(1)));
        assert!(!scheduler.remove(id(1)));
        assert_eq!(scheduler.len(), 1);
    }
}
