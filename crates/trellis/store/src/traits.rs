//! Storage trait definition.
//!
//! Defines the interface the orchestration engine and the run
//! lifecycle API program against.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::OwnedMutexGuard;
use trellis_types::{NewRun, Run, RunFilter, RunId, RunSort, RunUpdate, StateValue};

use crate::error::Result;

/// Exclusive lock on one run, held for the duration of a transition
/// attempt. Released on drop, whether the attempt commits or not.
///
/// This is the in-process equivalent of a row lock: a second attempt
/// on the same run blocks in [`RunStore::lock_run`] until the guard
/// drops, then observes the post-transition state.
#[derive(Debug)]
#[must_use = "dropping the lock releases the run to concurrent attempts"]
pub struct RunLock {
    _guard: OwnedMutexGuard<()>,
}

impl RunLock {
    pub(crate) fn new(guard: OwnedMutexGuard<()>) -> Self {
        Self { _guard: guard }
    }
}

/// Timing bookkeeping applied atomically with a state commit.
/// Computed by the engine's global rules; the store only applies it.
#[derive(Clone, Debug, Default)]
pub struct TimingUpdate {
    /// Set the run's start time (first entry into Running)
    pub start_time: Option<DateTime<Utc>>,
    /// Set the run's end time (entry into a terminal state)
    pub end_time: Option<DateTime<Utc>>,
    /// Clear the end time (a forced restart out of a terminal state)
    pub clear_end_time: bool,
    /// Add to accumulated run time (time spent in the Running state)
    pub run_time_increment: Option<Duration>,
    /// Add to the attempt counter
    pub run_count_increment: u32,
}

impl TimingUpdate {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.end_time.is_none()
            && !self.clear_end_time
            && self.run_time_increment.is_none()
            && self.run_count_increment == 0
    }
}

/// Trait for run storage backends.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new run unconditionally. The run's initial state (if
    /// any, on the spec) is NOT written here; states are written only
    /// through [`RunStore::commit_state`].
    async fn create_run(&self, new_run: NewRun) -> Result<Run>;

    /// Insert a run conditionally on `(parent scope, idempotency_key)`
    /// uniqueness. Returns the run occupying that key and a flag that
    /// is true iff this call inserted it.
    ///
    /// Falls back to an unconditional insert when the spec carries no
    /// idempotency key.
    async fn create_run_idempotent(&self, new_run: NewRun) -> Result<(Run, bool)>;

    /// Read a run by id.
    async fn read_run(&self, id: RunId) -> Result<Option<Run>>;

    /// Acquire the per-run exclusive lock. Blocks while another
    /// attempt holds it; never contends across different runs.
    async fn lock_run(&self, id: RunId) -> Result<RunLock>;

    /// Partial update of non-state fields. Returns false when no row
    /// matched the id.
    async fn update_run(&self, id: RunId, update: RunUpdate) -> Result<bool>;

    /// Atomically commit a new current state: the prior state (if any)
    /// is appended to the run's immutable history, the new state gets
    /// its back-reference stamped, and timing bookkeeping is applied
    /// in the same step. Returns the updated run.
    ///
    /// Callers must hold the run's [`RunLock`].
    async fn commit_state(&self, id: RunId, state: StateValue, timing: TimingUpdate)
        -> Result<Run>;

    /// The run's superseded states, oldest first. Never includes the
    /// current state.
    async fn read_state_history(&self, id: RunId) -> Result<Vec<StateValue>>;

    /// Filtered, sorted, paginated listing.
    async fn list_runs(
        &self,
        filter: &RunFilter,
        sort: RunSort,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Run>>;

    /// Count runs matching a filter.
    async fn count_runs(&self, filter: &RunFilter) -> Result<usize>;

    /// Delete a run, cascading to owned nested runs and all history.
    /// Returns false when no row matched the id.
    async fn delete_run(&self, id: RunId) -> Result<bool>;
}
