//! Waiting across several topics at once.

use std::pin::Pin;
use std::sync::Arc;

use futures::future::select_all;
use tokio::sync::futures::Notified;

use crate::delivery::Delivery;
use crate::error::{QueueError, Result};
use crate::topic::TopicQueue;

/// A consumer-side view over a fixed set of topics. [`MultiQueue::get`]
/// resolves with one delivery at a time, drawn from whichever topic
/// has an item first; topics earlier in the set win ties.
pub struct MultiQueue<T: Clone + Send + 'static> {
    queues: Vec<Arc<TopicQueue<T>>>,
}

impl<T: Clone + Send + 'static> MultiQueue<T> {
    pub fn new(queues: Vec<Arc<TopicQueue<T>>>) -> Self {
        Self { queues }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.queues.iter().map(|q| q.key())
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Wait for the next item from any of the topics. Fails with
    /// [`QueueError::Closed`] once every topic is closed and drained.
    pub async fn get(&self) -> Result<Delivery<T>> {
        loop {
            let mut open = 0usize;
            for queue in &self.queues {
                match queue.try_dequeue() {
                    Ok(Some(delivery)) => return Ok(delivery),
                    Ok(None) => open += 1,
                    Err(QueueError::Closed(_)) => {}
                }
            }
            if open == 0 {
                let keys: Vec<&str> = self.keys().collect();
                return Err(QueueError::Closed(keys.join(",")));
            }

            // Missed-wake safe: an enqueue racing this gap leaves a
            // stored permit on its topic's Notify, so the future below
            // resolves immediately.
            let waits: Vec<Pin<Box<Notified<'_>>>> = self
                .queues
                .iter()
                .map(|q| Box::pin(q.notified()))
                .collect();
            select_all(waits).await;
        }
    }
}
