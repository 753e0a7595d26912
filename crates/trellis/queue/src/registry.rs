//! Process-wide registry of topic queues.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::Result;
use crate::multi::MultiQueue;
use crate::topic::TopicQueue;

/// Keyed collection of [`TopicQueue`]s, created on first use.
///
/// Producers enqueue by key; consumers subscribe to a set of keys and
/// receive a [`MultiQueue`] over the live queues. Queues with no items
/// and no outside holders can be reclaimed with
/// [`QueueRegistry::collect_idle`].
pub struct QueueRegistry<T: Clone + Send + 'static> {
    queues: DashMap<String, Arc<TopicQueue<T>>>,
}

impl<T: Clone + Send + 'static> QueueRegistry<T> {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// The queue for `key`, created if absent.
    pub fn topic(&self, key: &str) -> Arc<TopicQueue<T>> {
        self.queues
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!(key, "topic queue created");
                Arc::new(TopicQueue::new(key))
            })
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<TopicQueue<T>>> {
        self.queues.get(key).map(|q| q.clone())
    }

    pub fn enqueue(&self, key: &str, item: T) -> Result<()> {
        self.topic(key).enqueue(item)
    }

    /// A consumer view over the given keys, creating missing queues.
    pub fn subscribe<S: AsRef<str>>(&self, keys: &[S]) -> MultiQueue<T> {
        MultiQueue::new(keys.iter().map(|k| self.topic(k.as_ref())).collect())
    }

    /// Close and drop the queue for `key`. Pending items stay readable
    /// through handles subscribers already hold.
    pub fn remove(&self, key: &str) -> bool {
        match self.queues.remove(key) {
            Some((_, queue)) => {
                queue.close();
                true
            }
            None => false,
        }
    }

    /// Reclaim queues nobody holds and nothing waits in. Returns how
    /// many were dropped.
    pub fn collect_idle(&self) -> usize {
        let before = self.queues.len();
        // strong_count == 1 means the registry holds the only handle,
        // so no subscriber can be parked in it.
        self.queues
            .retain(|_, queue| Arc::strong_count(queue) > 1 || !queue.is_empty());
        let dropped = before - self.queues.len();
        if dropped > 0 {
            tracing::debug!(dropped, "idle topic queues reclaimed");
        }
        dropped
    }
}

impl<T: Clone + Send + 'static> Default for QueueRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
