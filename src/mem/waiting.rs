use std::collections::VecDeque;

use super::stack::StackId;
use crate::engine::EventId;

/// A blocked access and the event that resumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub stack: StackId,
    pub event: EventId,
}

/// FIFO of blocked accesses, owned by a module or a port.
#[derive(Debug, Default)]
pub struct WaitingList {
    queue: VecDeque<Waiter>,
}

impl WaitingList {
    pub fn push(&mut self, stack: StackId, event: EventId) {
        assert!(
            !self.contains(stack),
            "request context {:?} enqueued twice on the same waiting list",
            stack
        );
        self.queue.push_back(Waiter { stack, event });
    }

    pub fn contains(&self, stack: StackId) -> bool {
        self.queue.iter().any(|waiter| waiter.stack == stack)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Detach every waiter, leaving the list empty.
    pub fn take(&mut self) -> WaitingList {
        std::mem::take(self)
    }
}

impl IntoIterator for WaitingList {
    type Item = Waiter;
    type IntoIter = std::collections::vec_deque::IntoIter<Waiter>;

    fn into_iter(self) -> Self::IntoIter {
        self.queue.into_iter()
    }
}
