//! The at-least-once delivery handle.

use std::sync::Arc;

use crate::topic::TopicQueue;

/// One in-flight item handed to one consumer. The holder either calls
/// [`Delivery::ack`] after processing it, or drops the handle and the
/// item returns to the front of its topic for redelivery.
#[must_use = "an unacknowledged delivery is requeued on drop"]
pub struct Delivery<T: Clone + Send + 'static> {
    item: T,
    // Cleared on ack; Some means "still owed to the queue".
    origin: Option<Arc<TopicQueue<T>>>,
}

impl<T: Clone + Send + 'static> Delivery<T> {
    pub(crate) fn new(origin: Arc<TopicQueue<T>>, item: T) -> Self {
        Self {
            item,
            origin: Some(origin),
        }
    }

    /// The topic this item was delivered from.
    pub fn key(&self) -> &str {
        match &self.origin {
            Some(queue) => queue.key(),
            None => "",
        }
    }

    pub fn item(&self) -> &T {
        &self.item
    }

    /// Acknowledge the delivery, consuming the handle and returning
    /// the item to the caller. The item will not be redelivered.
    pub fn ack(mut self) -> T {
        self.origin = None;
        self.item.clone()
    }
}

// Hand-written so T itself is not required to be Debug.
impl<T: Clone + Send + 'static> std::fmt::Debug for Delivery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("key", &self.key())
            .field("acked", &self.origin.is_none())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Drop for Delivery<T> {
    fn drop(&mut self) {
        if let Some(queue) = self.origin.take() {
            tracing::debug!(key = queue.key(), "unacknowledged delivery requeued");
            queue.requeue(self.item.clone());
        }
    }
}
