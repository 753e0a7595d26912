//! In-memory implementation of the run store
//!
//! Suitable for development and testing. Production deployments should
//! use a persistent backend behind the same trait.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use trellis_types::{NewRun, Run, RunFilter, RunId, RunSort, RunUpdate, StateValue};

use crate::error::{Result, StoreError};
use crate::traits::{RunLock, RunStore, TimingUpdate};

/// One run row plus its append-only state history
#[derive(Clone, Debug)]
struct RunRecord {
    run: Run,
    /// Superseded states, oldest first. Entries are never mutated.
    history: Vec<StateValue>,
}

/// In-memory run store backed by concurrent maps.
///
/// The lock table hands out per-run `tokio::sync::Mutex` guards; the
/// engine holds one for the duration of a transition attempt, which
/// serializes attempts on the same run while leaving attempts on
/// different runs fully concurrent.
pub struct InMemoryRunStore {
    runs: DashMap<RunId, RunRecord>,
    /// `(owning scope, idempotency key)` -> run occupying that key
    idempotency: DashMap<(Option<RunId>, String), RunId>,
    locks: DashMap<RunId, Arc<Mutex<()>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            idempotency: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn insert_row(&self, new_run: NewRun) -> Run {
        let run = new_run.into_run(Utc::now());
        self.runs.insert(
            run.id,
            RunRecord {
                run: run.clone(),
                history: Vec::new(),
            },
        );
        run
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(&self, new_run: NewRun) -> Result<Run> {
        let run = self.insert_row(new_run);
        tracing::debug!(run_id = %run.id, kind = %run.kind, "run created");
        Ok(run)
    }

    async fn create_run_idempotent(&self, new_run: NewRun) -> Result<(Run, bool)> {
        let Some(key) = new_run.idempotency_key.clone() else {
            let run = self.create_run(new_run).await?;
            return Ok((run, true));
        };

        // The entry guard serializes concurrent creates for the same
        // (scope, key) pair, which is what makes the inserted flag a
        // storage guarantee rather than a timestamp heuristic.
        match self.idempotency.entry((new_run.parent_run_id, key)) {
            Entry::Occupied(entry) => {
                let existing_id = *entry.get();
                let run = self
                    .runs
                    .get(&existing_id)
                    .map(|r| r.run.clone())
                    .ok_or(StoreError::NotFound(existing_id))?;
                tracing::debug!(run_id = %run.id, "idempotent create returned existing run");
                Ok((run, false))
            }
            Entry::Vacant(entry) => {
                let run = self.insert_row(new_run);
                entry.insert(run.id);
                tracing::debug!(run_id = %run.id, kind = %run.kind, "run created");
                Ok((run, true))
            }
        }
    }

    async fn read_run(&self, id: RunId) -> Result<Option<Run>> {
        Ok(self.runs.get(&id).map(|r| r.run.clone()))
    }

    async fn lock_run(&self, id: RunId) -> Result<RunLock> {
        if !self.runs.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let mutex = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        // The map reference is dropped before awaiting; only the
        // per-run mutex is held across the attempt.
        let guard = mutex.lock_owned().await;
        Ok(RunLock::new(guard))
    }

    async fn update_run(&self, id: RunId, update: RunUpdate) -> Result<bool> {
        match self.runs.get_mut(&id) {
            Some(mut record) => {
                update.apply(&mut record.run);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn commit_state(
        &self,
        id: RunId,
        state: StateValue,
        timing: TimingUpdate,
    ) -> Result<Run> {
        let mut record = self.runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let mut state = state;
        state.run_id = Some(id);

        if let Some(prior) = record.run.state.replace(state) {
            record.history.push(prior);
        }

        if let Some(start) = timing.start_time {
            record.run.start_time = Some(start);
        }
        if let Some(end) = timing.end_time {
            record.run.end_time = Some(end);
        } else if timing.clear_end_time {
            record.run.end_time = None;
        }
        if let Some(increment) = timing.run_time_increment {
            record.run.total_run_time = record.run.total_run_time + increment;
        }
        record.run.run_count += timing.run_count_increment;

        Ok(record.run.clone())
    }

    async fn read_state_history(&self, id: RunId) -> Result<Vec<StateValue>> {
        let record = self.runs.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(record.history.clone())
    }

    async fn list_runs(
        &self,
        filter: &RunFilter,
        sort: RunSort,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|r| filter.matches(&r.run))
            .map(|r| r.run.clone())
            .collect();
        runs.sort_by(|a, b| sort.compare(a, b));

        let runs = runs
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(runs)
    }

    async fn count_runs(&self, filter: &RunFilter) -> Result<usize> {
        Ok(self.runs.iter().filter(|r| filter.matches(&r.run)).count())
    }

    async fn delete_run(&self, id: RunId) -> Result<bool> {
        let mut pending = vec![id];
        let mut deleted_root = false;

        while let Some(next) = pending.pop() {
            let Some((_, record)) = self.runs.remove(&next) else {
                continue;
            };
            if next == id {
                deleted_root = true;
            }
            if let Some(key) = record.run.idempotency_key.clone() {
                self.idempotency.remove(&(record.run.parent_run_id, key));
            }
            self.locks.remove(&next);

            // Cascade to owned nested runs
            let children: Vec<RunId> = self
                .runs
                .iter()
                .filter(|r| r.run.parent_run_id == Some(next))
                .map(|r| r.run.id)
                .collect();
            pending.extend(children);

            tracing::debug!(run_id = %next, "run deleted");
        }

        Ok(deleted_root)
    }
}
