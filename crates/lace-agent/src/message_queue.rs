//! `MessageQueue` (§4.H): FIFO with a single high-priority head slot.
//!
//! Open question resolved here (see DESIGN.md): only one high-priority
//! message may occupy the head reservation at a time. A second
//! high-priority send while one is already reserved is appended after it,
//! ahead of ordinary messages but behind the existing priority message —
//! "one slot", not "one priority lane".

use std::collections::VecDeque;

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub text: String,
    pub priority: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_length: usize,
    pub high_priority_count: usize,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<QueuedMessage>,
    has_priority_slot: bool,
}

pub struct MessageQueue {
    inner: Mutex<Inner>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Enqueues `text`. Returns the queue length right after insertion, for
    /// the caller to emit `message_queued { queueLength }`.
    pub fn enqueue(&self, text: impl Into<String>, high_priority: bool) -> usize {
        let mut inner = self.inner.lock();
        let message = QueuedMessage {
            text: text.into(),
            priority: high_priority,
        };
        if high_priority && !inner.has_priority_slot {
            inner.queue.push_front(message);
            inner.has_priority_slot = true;
        } else if high_priority {
            // The head slot is taken; insert right after it.
            inner.queue.insert(1.min(inner.queue.len()), message);
        } else {
            inner.queue.push_back(message);
        }
        inner.queue.len()
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            queue_length: inner.queue.len(),
            high_priority_count: usize::from(inner.has_priority_slot),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Pops the head message, clearing the priority slot if it was the one
    /// being dequeued.
    pub fn pop_front(&self) -> Option<QueuedMessage> {
        let mut inner = self.inner.lock();
        let message = inner.queue.pop_front()?;
        if message.priority {
            inner.has_priority_slot = false;
        }
        Some(message)
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_for_plain_messages() {
        let queue = MessageQueue::new();
        queue.enqueue("first", false);
        queue.enqueue("second", false);
        assert_eq!(queue.pop_front().unwrap().text, "first");
        assert_eq!(queue.pop_front().unwrap().text, "second");
    }

    #[test]
    fn high_priority_message_jumps_to_head() {
        let queue = MessageQueue::new();
        queue.enqueue("normal-1", false);
        queue.enqueue("normal-2", false);
        queue.enqueue("urgent", true);
        assert_eq!(queue.pop_front().unwrap().text, "urgent");
        assert_eq!(queue.pop_front().unwrap().text, "normal-1");
    }

    #[test]
    fn stats_report_length_and_priority_slot() {
        let queue = MessageQueue::new();
        queue.enqueue("a", false);
        queue.enqueue("b", true);
        let stats = queue.stats();
        assert_eq!(stats.queue_length, 2);
        assert_eq!(stats.high_priority_count, 1);
    }

    #[test]
    fn second_high_priority_message_waits_behind_the_first() {
        let queue = MessageQueue::new();
        queue.enqueue("normal", false);
        queue.enqueue("urgent-1", true);
        queue.enqueue("urgent-2", true);
        assert_eq!(queue.pop_front().unwrap().text, "urgent-1");
        assert_eq!(queue.pop_front().unwrap().text, "urgent-2");
        assert_eq!(queue.pop_front().unwrap().text, "normal");
    }

    #[test]
    fn priority_slot_frees_up_after_dequeue() {
        let queue = MessageQueue::new();
        queue.enqueue("urgent-1", true);
        queue.pop_front();
        assert_eq!(queue.stats().high_priority_count, 0);
        queue.enqueue("urgent-2", true);
        assert_eq!(queue.stats().high_priority_count, 1);
    }

    #[test]
    fn drain_to_empty_then_idle() {
        let queue = MessageQueue::new();
        assert!(queue.is_empty());
        queue.enqueue("a", false);
        assert!(!queue.is_empty());
        queue.pop_front();
        assert!(queue.is_empty());
    }
}
