//! Bounded delivery primitives shared by the Bus (per-subscriber outbound
//! queues) and the AgentRuntime (per-agent inbox). Two backpressure policies
//! are named in §5: drop-oldest for telemetry fan-out, block-with-timeout for
//! request/response and agent mailboxes.

use std::{collections::VecDeque, sync::Mutex};

use tokio::sync::Notify;

/// A bounded queue that drops the oldest entry on overflow rather than
/// blocking the publisher. Used for telemetry topics where a missed frame is
/// harmless and a stalled publisher is not.
pub struct DropOldestQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> DropOldestQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    /// Pushes `item`, dropping the oldest buffered item if at capacity.
    /// Returns `true` if something was dropped to make room.
    pub fn push(&self, item: T) -> bool {
        let mut queue = self.inner.lock().expect("queue mutex poisoned");
        let dropped = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(item);
        drop(queue);
        self.notify.notify_one();
        dropped
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }

    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_oldest() {
        let queue = DropOldestQueue::new(2);
        assert!(!queue.push(1));
        assert!(!queue.push(2));
        assert!(queue.push(3));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }
}
