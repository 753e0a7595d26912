//! Side-effect seams for the engine
//!
//! The orchestration core treats notification-policy matching and
//! scheduled-run queueing as external collaborators behind these
//! traits. The engine guarantees *when* they fire (notification
//! evaluation iff a transition resolved to Accept or Reject; queue
//! fan-out when an accepted transition lands a task run in Scheduled);
//! *what* they do is the implementor's business.

use async_trait::async_trait;
use trellis_types::Run;

/// "Notify interested parties" — evaluated after a transition resolves
/// to Accept or Reject, never for Wait or Abort.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn run_state_changed(&self, run: &Run);
}

/// No-op dispatcher for deployments without notification policies.
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn run_state_changed(&self, _run: &Run) {}
}

/// Receives task runs whose committed state is Scheduled, for fan-out
/// to queue subscribers.
#[async_trait]
pub trait ScheduledRunSink: Send + Sync {
    async fn run_scheduled(&self, run: &Run);
}

/// No-op sink for deployments without queue subscribers.
pub struct NoopScheduledRunSink;

#[async_trait]
impl ScheduledRunSink for NoopScheduledRunSink {
    async fn run_scheduled(&self, _run: &Run) {}
}
