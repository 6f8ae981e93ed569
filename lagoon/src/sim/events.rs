//! The event queue driving the simulation.
//!
//! Events are ordered by `(due_tick, sequence)`: the sequence number is a
//! monotone counter assigned at scheduling time, so events scheduled for the
//! same tick fire in scheduling order. That tie-break is what makes a run
//! fully reproducible.

use crate::domain::CommTypeSet;
use crate::ids::{ActorId, DomainId, Endpoint, GroupId};
use crate::message::Message;
use crate::sim::World;
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// Handle to a scheduled event.
///
/// Cancelling marks the event as a tombstone; the queue skips it when the
/// due tick arrives.
#[derive(Debug, Clone)]
pub struct EventHandle {
    cancelled: Rc<Cell<bool>>,
}

impl EventHandle {
    /// Cancel the event. Has no effect once the event has fired.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Whether the event has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

pub(crate) enum EventKind {
    /// Deliver a message to an endpoint.
    Deliver {
        msg: Message,
        source: ActorId,
        dest: Endpoint,
        comm_types: Option<CommTypeSet>,
        via_domain: Option<DomainId>,
        relay: Option<GroupId>,
    },
    /// Run a closure against the world.
    Task(Box<dyn FnOnce(&mut World)>),
}

struct ScheduledEvent {
    due: u64,
    sequence: u64,
    cancelled: Rc<Cell<bool>>,
    kind: EventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest event pops first.
        (self.due, self.sequence)
            .cmp(&(other.due, other.sequence))
            .reverse()
    }
}

#[derive(Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub(crate) fn push(&mut self, due: u64, kind: EventKind) -> EventHandle {
        let cancelled = Rc::new(Cell::new(false));
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            due,
            sequence,
            cancelled: cancelled.clone(),
            kind,
        });
        EventHandle { cancelled }
    }

    /// Pop the earliest live event.
    pub(crate) fn pop(&mut self) -> Option<(u64, EventKind)> {
        while let Some(event) = self.heap.pop() {
            if event.cancelled.get() {
                continue;
            }
            return Some((event.due, event.kind));
        }
        None
    }

    /// Due tick of the earliest live event, discarding cancelled ones.
    pub(crate) fn next_due(&mut self) -> Option<u64> {
        while let Some(event) = self.heap.peek() {
            if event.cancelled.get() {
                self.heap.pop();
                continue;
            }
            return Some(event.due);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> EventKind {
        EventKind::Task(Box::new(|_| {}))
    }

    #[test]
    fn pops_in_due_then_sequence_order() {
        let mut q = EventQueue::new();
        q.push(5, task());
        q.push(3, task());
        q.push(3, task());
        assert_eq!(q.pop().map(|(d, _)| d), Some(3));
        assert_eq!(q.pop().map(|(d, _)| d), Some(3));
        assert_eq!(q.pop().map(|(d, _)| d), Some(5));
        assert!(q.pop().is_none());
    }

    #[test]
    fn same_tick_events_fire_in_scheduling_order() {
        let mut q = EventQueue::new();
        let mut order = Vec::new();
        for i in 0..4 {
            q.push(
                7,
                EventKind::Task(Box::new(move |_w: &mut World| {
                    let _ = i;
                })),
            );
            order.push(i);
        }
        // sequence numbers are assigned monotonically
        let mut seqs = Vec::new();
        while let Some(event) = q.heap.pop() {
            seqs.push(event.sequence);
        }
        let mut sorted = seqs.clone();
        sorted.sort();
        assert_eq!(seqs, sorted);
        let _ = order;
    }

    #[test]
    fn cancelled_events_are_skipped() {
        let mut q = EventQueue::new();
        let handle = q.push(1, task());
        q.push(2, task());
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(q.pop().map(|(d, _)| d), Some(2));
    }

    #[test]
    fn next_due_skips_cancelled() {
        let mut q = EventQueue::new();
        let handle = q.push(1, task());
        q.push(4, task());
        handle.cancel();
        assert_eq!(q.next_due(), Some(4));
    }
}
