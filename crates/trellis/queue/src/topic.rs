//! A single topic: a FIFO that delivers each item to exactly one
//! consumer, with unacknowledged deliveries returning to the front.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::delivery::Delivery;
use crate::error::{QueueError, Result};

/// A keyed FIFO queue. Consumers wait on [`TopicQueue::dequeue`]; each
/// item reaches exactly one of them, wrapped in a [`Delivery`] that
/// requeues the item at the front unless acknowledged.
pub struct TopicQueue<T: Clone + Send + 'static> {
    key: String,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    closed: AtomicBool,
}

impl<T: Clone + Send + 'static> TopicQueue<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Poisoning only happens if a holder panicked; the deque is
        // still structurally sound, so recover it.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an item for delivery. Fails once the topic is closed.
    pub fn enqueue(&self, item: T) -> Result<()> {
        if self.is_closed() {
            return Err(QueueError::Closed(self.key.clone()));
        }
        self.lock().push_back(item);
        self.notify.notify_one();
        Ok(())
    }

    /// Return an undelivered item to the front of the queue. Allowed
    /// even after close so in-flight deliveries are never lost; a
    /// closed topic drains before reporting [`QueueError::Closed`].
    pub fn requeue(&self, item: T) {
        self.lock().push_front(item);
        self.notify.notify_one();
    }

    /// Close the topic: pending items remain consumable, waiters are
    /// released, and further enqueues fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Stored permit for a consumer not yet parked, plus a wake for
        // everyone already parked.
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    /// Pop the next item without waiting. `Ok(None)` means the topic
    /// is open but currently empty.
    pub fn try_dequeue(self: &Arc<Self>) -> Result<Option<Delivery<T>>> {
        let popped = self.lock().pop_front();
        match popped {
            Some(item) => Ok(Some(Delivery::new(self.clone(), item))),
            None if self.is_closed() => Err(QueueError::Closed(self.key.clone())),
            None => Ok(None),
        }
    }

    /// Wait for the next item. Items are handed out in queue order,
    /// one consumer each.
    pub async fn dequeue(self: &Arc<Self>) -> Result<Delivery<T>> {
        loop {
            let notified = self.notified();
            match self.try_dequeue() {
                Ok(Some(delivery)) => return Ok(delivery),
                Ok(None) => {}
                Err(err) => {
                    // Pass the close along to the next parked consumer.
                    self.notify.notify_one();
                    return Err(err);
                }
            }
            notified.await;
        }
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = Arc::new(TopicQueue::new("etl"));
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        let first = queue.dequeue().await.unwrap();
        assert_eq!(*first.item(), 1);
        first.ack();
        let second = queue.dequeue().await.unwrap();
        assert_eq!(*second.item(), 2);
        second.ack();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn dropped_delivery_returns_to_the_front() {
        let queue = Arc::new(TopicQueue::new("etl"));
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();

        drop(queue.dequeue().await.unwrap());

        // The unacked item is redelivered before the second one.
        let redelivered = queue.dequeue().await.unwrap();
        assert_eq!(*redelivered.item(), 1);
        redelivered.ack();
    }

    #[tokio::test]
    async fn parked_consumer_wakes_on_enqueue() {
        let queue = Arc::new(TopicQueue::new("etl"));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await.unwrap().ack() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(7).unwrap();
        waiter.await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn each_item_reaches_exactly_one_consumer() {
        let queue = Arc::new(TopicQueue::new("etl"));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let delivery = queue.dequeue().await.unwrap();
                let item = *delivery.item();
                delivery.ack();
                item
            }));
        }
        for item in 0..4 {
            queue.enqueue(item).unwrap();
        }

        let mut received = Vec::new();
        for handle in handles {
            received.push(handle.await.unwrap());
        }
        received.sort();
        assert_eq!(received, [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn delivery_is_debuggable_without_a_debug_item() {
        #[derive(Clone)]
        struct Opaque;

        let queue = Arc::new(TopicQueue::new("etl"));
        queue.enqueue(Opaque).unwrap();
        let delivery = queue.dequeue().await.unwrap();
        let rendered = format!("{delivery:?}");
        assert!(rendered.contains("etl"));
        delivery.ack();
    }

    #[tokio::test]
    async fn close_drains_then_reports_closed() {
        let queue = Arc::new(TopicQueue::<u32>::new("etl"));
        queue.enqueue(1).unwrap();
        queue.close();

        assert!(queue.enqueue(2).is_err());
        queue.dequeue().await.unwrap().ack();
        assert_eq!(
            queue.dequeue().await.unwrap_err(),
            QueueError::Closed("etl".into())
        );
    }

    #[tokio::test]
    async fn close_releases_parked_consumers() {
        let queue = Arc::new(TopicQueue::<u32>::new("etl"));
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let queue = queue.clone();
            waiters.push(tokio::spawn(async move { queue.dequeue().await }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        for waiter in waiters {
            assert!(waiter.await.unwrap().is_err());
        }
    }
}
