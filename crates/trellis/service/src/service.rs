//! The run lifecycle service.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use trellis_orchestration::rules::{PARAM_MAX_RETRIES, PARAM_RETRY_DELAY_SECONDS};
use trellis_orchestration::{NotificationDispatcher, OrchestrationEngine, Policy};
use trellis_queue::{Delivery, MultiQueue, QueueRegistry};
use trellis_store::RunStore;
use trellis_types::{
    HistoryBucket, NewRun, OrchestrationResult, Run, RunFilter, RunId, RunKind, RunSort,
    RunUpdate, StateValue,
};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::history::bucket_states;
use crate::sink::QueueSink;

/// Upper bound on intervals per history request; larger windows must
/// use a coarser interval.
pub const MAX_HISTORY_BUCKETS: i64 = 500;

/// The run lifecycle API: creation, reads, listings, orchestrated
/// state transitions, history aggregation, and scheduled-run
/// subscriptions. All state changes flow through the orchestration
/// engine; nothing here writes a state directly.
pub struct RunService {
    store: Arc<dyn RunStore>,
    engine: OrchestrationEngine,
    queues: Arc<QueueRegistry<Run>>,
    task_policy: Policy,
    flow_policy: Policy,
    config: ServiceConfig,
}

impl RunService {
    pub fn new(store: Arc<dyn RunStore>, config: ServiceConfig) -> Self {
        Self::build(store, config, None)
    }

    /// A service whose engine evaluates notifications through the
    /// given dispatcher.
    pub fn with_dispatcher(
        store: Arc<dyn RunStore>,
        config: ServiceConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self::build(store, config, Some(dispatcher))
    }

    fn build(
        store: Arc<dyn RunStore>,
        config: ServiceConfig,
        dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    ) -> Self {
        let queues = Arc::new(QueueRegistry::new());
        let mut engine = OrchestrationEngine::new(store.clone())
            .with_scheduled_sink(Arc::new(QueueSink::new(queues.clone())));
        if let Some(dispatcher) = dispatcher {
            engine = engine.with_dispatcher(dispatcher);
        }
        Self {
            store,
            engine,
            queues,
            task_policy: Policy::task_policy(),
            flow_policy: Policy::flow_policy(),
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Create a run. With an idempotency key, a repeat of the same key
    /// in the same parent scope returns the existing run and `false`;
    /// the initial state is attached only on genuine creation. Runs
    /// created without an initial state start Pending, and runs
    /// without a queue land on the configured default.
    pub async fn create_run(&self, mut new_run: NewRun) -> Result<(Run, bool)> {
        if new_run.queue.is_none() {
            new_run.queue = Some(self.config.default_queue.clone());
        }
        let initial = new_run.state.take().unwrap_or_else(StateValue::pending);

        let (run, created) = if new_run.idempotency_key.is_some() {
            self.store.create_run_idempotent(new_run).await?
        } else {
            (self.store.create_run(new_run).await?, true)
        };
        if !created {
            tracing::debug!(run_id = %run.id, "idempotency key matched existing run");
            return Ok((run, false));
        }

        // The initial state bypasses policy but still gets the global
        // bookkeeping tier.
        self.engine
            .set_run_state(run.id, initial, true, None, None)
            .await?;
        let run = self
            .store
            .read_run(run.id)
            .await?
            .ok_or(ServiceError::NotFound(run.id))?;
        tracing::info!(run_id = %run.id, kind = %run.kind, "run created");
        Ok((run, true))
    }

    // ── Reads and updates ────────────────────────────────────────────

    pub async fn read_run(&self, id: RunId) -> Result<Run> {
        self.store
            .read_run(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Partial update of non-state attributes; returns the updated run.
    pub async fn update_run(&self, id: RunId, update: RunUpdate) -> Result<Run> {
        if !self.store.update_run(id, update).await? {
            return Err(ServiceError::NotFound(id));
        }
        self.read_run(id).await
    }

    /// Delete a run, its nested runs, and all their history.
    pub async fn delete_run(&self, id: RunId) -> Result<()> {
        if !self.store.delete_run(id).await? {
            return Err(ServiceError::NotFound(id));
        }
        tracing::info!(run_id = %id, "run deleted");
        Ok(())
    }

    /// Filtered listing, with the page size capped by configuration.
    pub async fn list_runs(
        &self,
        filter: &RunFilter,
        sort: RunSort,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Run>> {
        let cap = self.config.max_list_limit;
        let limit = limit.map_or(cap, |l| l.min(cap));
        Ok(self.store.list_runs(filter, sort, offset, Some(limit)).await?)
    }

    pub async fn count_runs(&self, filter: &RunFilter) -> Result<usize> {
        Ok(self.store.count_runs(filter).await?)
    }

    // ── State transitions ────────────────────────────────────────────

    /// Attempt an orchestrated state transition. The policy is chosen
    /// by the run's kind; `force` bypasses it (global bookkeeping
    /// still applies). Accept, Reject, and Wait come back as a result;
    /// an abort surfaces as [`ServiceError::Aborted`].
    pub async fn set_run_state(
        &self,
        id: RunId,
        state: StateValue,
        force: bool,
        parameters: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<OrchestrationResult> {
        let run = self.read_run(id).await?;
        let policy = match run.kind {
            RunKind::Task => &self.task_policy,
            RunKind::Flow => &self.flow_policy,
        };
        let mut params = self.default_parameters();
        if let Some(overrides) = parameters {
            params.extend(overrides);
        }
        Ok(self
            .engine
            .set_run_state(id, state, force, Some(policy), Some(params))
            .await?)
    }

    fn default_parameters(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            (
                PARAM_MAX_RETRIES.to_string(),
                serde_json::json!(self.config.default_max_retries),
            ),
            (
                PARAM_RETRY_DELAY_SECONDS.to_string(),
                serde_json::json!(self.config.default_retry_delay_seconds),
            ),
        ])
    }

    // ── History ──────────────────────────────────────────────────────

    /// Time-bucketed histogram of states entered during `[start, end)`
    /// by runs of the given kind matching the filter. The interval
    /// must be at least one second and the window must not exceed
    /// [`MAX_HISTORY_BUCKETS`] intervals; both are checked before any
    /// storage access.
    pub async fn run_history(
        &self,
        kind: RunKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
        filter: &RunFilter,
    ) -> Result<Vec<HistoryBucket>> {
        if interval < Duration::seconds(1) {
            return Err(ServiceError::InvalidArgument(
                "history interval must be at least one second".to_string(),
            ));
        }
        if end <= start {
            return Err(ServiceError::InvalidArgument(
                "history window must end after it starts".to_string(),
            ));
        }
        let interval_ms = interval.num_milliseconds();
        let buckets = ((end - start).num_milliseconds() + interval_ms - 1) / interval_ms;
        if buckets > MAX_HISTORY_BUCKETS {
            return Err(ServiceError::InvalidArgument(format!(
                "history window spans {buckets} intervals; the maximum is {MAX_HISTORY_BUCKETS}"
            )));
        }

        let filter = filter.clone().with_kind(kind);
        let runs = self
            .store
            .list_runs(&filter, RunSort::default(), 0, None)
            .await?;
        let mut observations = Vec::new();
        for run in runs {
            for state in self.store.read_state_history(run.id).await? {
                observations.push((state.state_type, state.timestamp));
            }
            if let Some(state) = run.state {
                observations.push((state.state_type, state.timestamp));
            }
        }
        Ok(bucket_states(start, end, interval, observations))
    }

    // ── Scheduled-run subscriptions ──────────────────────────────────

    /// Subscribe to scheduled-run fan-out on the given queue names (the
    /// configured default queue when none are given). Deliveries arrive
    /// one at a time and must be acknowledged; an unacknowledged
    /// delivery is requeued for another subscriber.
    pub fn subscribe<S: AsRef<str>>(&self, keys: &[S]) -> Subscription {
        let inner = if keys.is_empty() {
            self.queues.subscribe(&[self.config.default_queue.as_str()])
        } else {
            self.queues.subscribe(keys)
        };
        Subscription { inner }
    }

    /// Drop queues with no subscribers and no backlog.
    pub fn collect_idle_queues(&self) -> usize {
        self.queues.collect_idle()
    }
}

/// One consumer session over a set of scheduled-run queues.
pub struct Subscription {
    inner: MultiQueue<Run>,
}

impl Subscription {
    /// The next scheduled run from any subscribed queue.
    pub async fn next(&self) -> Result<Delivery<Run>> {
        Ok(self.inner.get().await?)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys().map(str::to_string).collect()
    }
}
