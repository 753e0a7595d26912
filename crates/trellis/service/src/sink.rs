//! Bridges the engine's scheduled-run side effect into topic queues.

use std::sync::Arc;

use async_trait::async_trait;
use trellis_orchestration::ScheduledRunSink;
use trellis_queue::QueueRegistry;
use trellis_types::Run;

/// Fans scheduled task runs out to the topic queue named by the run.
pub(crate) struct QueueSink {
    queues: Arc<QueueRegistry<Run>>,
}

impl QueueSink {
    pub(crate) fn new(queues: Arc<QueueRegistry<Run>>) -> Self {
        Self { queues }
    }
}

#[async_trait]
impl ScheduledRunSink for QueueSink {
    async fn run_scheduled(&self, run: &Run) {
        let Some(queue) = run.queue.as_deref() else {
            return;
        };
        match self.queues.enqueue(queue, run.clone()) {
            Ok(()) => {
                tracing::debug!(run_id = %run.id, queue, "scheduled run enqueued");
            }
            Err(err) => {
                tracing::warn!(run_id = %run.id, queue, error = %err, "scheduled run dropped");
            }
        }
    }
}
