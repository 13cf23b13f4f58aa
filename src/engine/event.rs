use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::domain::DomainId;
use super::{Simulation, Time};

pub type EventId = usize;

/// Reserved id of an event that was never registered. Scheduling it is fatal.
pub const EV_INVALID: EventId = 0;

/// Reserved id of an event whose scheduling has no effect.
pub const EV_NONE: EventId = 1;

pub type EventHandler<S> = Rc<dyn Fn(&mut S, EventId, <S as Simulation>::Payload)>;

/// A registered event kind.
pub struct EventDescriptor<S: Simulation> {
    pub(super) id: EventId,
    pub(super) name: String,
    pub(super) domain: Option<DomainId>,
    pub(super) handler: Option<EventHandler<S>>,
}

impl<S: Simulation> EventDescriptor<S> {
    pub(super) fn sentinel(id: EventId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            domain: None,
            handler: None,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` only for the two reserved sentinels.
    pub fn domain(&self) -> Option<DomainId> {
        self.domain
    }
}

impl<S: Simulation> fmt::Debug for EventDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("domain", &self.domain)
            .finish()
    }
}

/// A pending event in the scheduler heap.
#[derive(Debug)]
pub struct ScheduledEvent<P> {
    pub when: Time,
    pub seq: u64,
    pub id: EventId,
    pub payload: P,
}

impl<P> PartialEq for ScheduledEvent<P> {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl<P> Eq for ScheduledEvent<P> {}

impl<P> PartialOrd for ScheduledEvent<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for ScheduledEvent<P> {
    // BinaryHeap pops the greatest element: the earliest time, then the earliest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn ev(when: Time, seq: u64) -> ScheduledEvent<()> {
        ScheduledEvent {
            when,
            seq,
            id: 2,
            payload: (),
        }
    }

    #[test]
    fn heap_pops_earliest_then_inserted_first() {
        let mut heap = BinaryHeap::new();
        heap.push(ev(20, 0));
        heap.push(ev(10, 1));
        heap.push(ev(10, 2));
        heap.push(ev(5, 3));
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|e| (e.when, e.seq))).collect();
        assert_eq!(vec![(5, 3), (10, 1), (10, 2), (20, 0)], order);
    }
}
