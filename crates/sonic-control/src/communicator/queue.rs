use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A bounded queue of received messages. When full, the oldest message is
/// dropped.
///
/// Unread queues overflow routinely, so drops are counted instead of logged
/// one by one.
#[derive(Debug)]
pub struct MessageQueue {
    name: &'static str,
    capacity: usize,
    items: Mutex<VecDeque<String>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl MessageQueue {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        MessageQueue {
            name,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a message, dropping the oldest one if the queue is full.
    pub fn push(&self, message: String) {
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                if let Some(dropped) = items.pop_front() {
                    if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                        tracing::debug!(queue = self.name, "queue full, dropping oldest messages");
                    }
                    tracing::trace!(queue = self.name, %dropped, "dropped message");
                }
            }
            items.push_back(message);
        }
        self.notify.notify_one();
    }

    /// Take the oldest message without waiting.
    pub fn try_pop(&self) -> Option<String> {
        self.items.lock().pop_front()
    }

    /// Take the oldest message, waiting up to `timeout` for one to arrive.
    pub async fn pop(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_pop() {
                return Some(message);
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Number of messages dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_drops_oldest_when_full() {
        let queue = MessageQueue::new("test", 2);
        queue.push("a".to_string());
        queue.push("b".to_string());
        assert_eq!(queue.dropped(), 0);
        queue.push("c".to_string());
        queue.push("d".to_string());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.try_pop().as_deref(), Some("c"));
        assert_eq!(queue.try_pop().as_deref(), Some("d"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(MessageQueue::new("test", 4));
        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push("late".to_string());
        });
        assert_eq!(queue.pop(Duration::from_secs(2)).await.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_pop_times_out() {
        let queue = MessageQueue::new("test", 4);
        assert_eq!(queue.pop(Duration::from_millis(10)).await, None);
    }
}
