//! FIFO of outbound messages awaiting a delivery cycle.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::core::envelope::OutboundMessage;

/// Ordered backlog. Messages leave only through [`BroadcastQueue::pop`].
#[derive(Debug, Default)]
pub struct BroadcastQueue {
    pending: Mutex<VecDeque<OutboundMessage>>,
}

impl BroadcastQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<OutboundMessage>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Appends a message at the back.
    pub fn push(&self, message: OutboundMessage) {
        self.pending().push_back(message);
    }

    /// Takes the oldest message.
    pub fn pop(&self) -> Option<OutboundMessage> {
        self.pending().pop_front()
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    /// Whether the backlog is empty.
    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_push_order() {
        let queue = BroadcastQueue::new();
        for text in ["one", "two", "three"] {
            queue.push(OutboundMessage::raw("Test", text));
        }
        let drained: Vec<String> =
            std::iter::from_fn(|| queue.pop()).map(|m| m.payload().to_string()).collect();
        assert_eq!(drained, vec!["one", "two", "three"]);
        assert!(queue.is_empty());
    }
}
