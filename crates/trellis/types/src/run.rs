//! Runs: units of trackable work
//!
//! A run owns exactly one current [`StateValue`]. Timing fields
//! (start/end time, accumulated run time, attempt count) are derived
//! from state history by the orchestration engine's bookkeeping rules.

use crate::{StateType, StateValue};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Run Identifier ───────────────────────────────────────────────────

/// Unique identifier for a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Run Kind ─────────────────────────────────────────────────────────

/// The two kinds of run in the system. They share the same
/// state-machine shape; task runs are nested under a flow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Flow,
    Task,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Flow => "flow",
            RunKind::Task => "task",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Run ──────────────────────────────────────────────────────────────

/// A unit of trackable work passing through the run lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub kind: RunKind,
    /// Owning run, for nested (task) runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<RunId>,
    pub name: String,
    pub created: DateTime<Utc>,
    /// Caller-supplied token preventing duplicate creation within the
    /// owning scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Queue assignment for scheduled-run fan-out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// The one live state; prior states live in the store's history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateValue>,
    /// When the run first entered Running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the run entered a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Accumulated time spent in Running states
    #[serde(with = "duration_millis")]
    pub total_run_time: Duration,
    /// Number of times the run has entered Running
    pub run_count: u32,
}

impl Run {
    pub fn state_type(&self) -> Option<StateType> {
        self.state.as_ref().map(|s| s.state_type)
    }

    /// Accumulated run time, plus the age of a live Running state.
    pub fn estimated_run_time(&self) -> Duration {
        match &self.state {
            Some(state) if state.state_type == StateType::Running => {
                self.total_run_time + (Utc::now() - state.timestamp)
            }
            _ => self.total_run_time,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state_type().map(|t| t.is_terminal()).unwrap_or(false)
    }
}

// ── Creation and update specs ────────────────────────────────────────

/// Specification for creating a run. The store inserts the row without
/// a state; the lifecycle API attaches `state` through the engine only
/// when the row was genuinely newly created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRun {
    pub kind: RunKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<RunId>,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Initial state to attach on genuine creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateValue>,
}

impl NewRun {
    pub fn new(kind: RunKind) -> Self {
        Self {
            kind,
            parent_run_id: None,
            name: String::new(),
            idempotency_key: None,
            queue: None,
            tags: Vec::new(),
            state: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parent(mut self, parent: RunId) -> Self {
        self.parent_run_id = Some(parent);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_state(mut self, state: StateValue) -> Self {
        self.state = Some(state);
        self
    }

    /// Materialize the run row. State is deliberately left unset; only
    /// the orchestration engine writes states.
    pub fn into_run(self, created: DateTime<Utc>) -> Run {
        Run {
            id: RunId::generate(),
            kind: self.kind,
            parent_run_id: self.parent_run_id,
            name: self.name,
            created,
            idempotency_key: self.idempotency_key,
            queue: self.queue,
            tags: self.tags,
            state: None,
            start_time: None,
            end_time: None,
            total_run_time: Duration::zero(),
            run_count: 0,
        }
    }
}

/// Partial update of a run's non-state attributes. `None` fields are
/// left untouched; state changes go through the engine, never here.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl RunUpdate {
    pub fn apply(&self, run: &mut Run) {
        if let Some(name) = &self.name {
            run.name = name.clone();
        }
        if let Some(queue) = &self.queue {
            run.queue = Some(queue.clone());
        }
        if let Some(tags) = &self.tags {
            run.tags = tags.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.queue.is_none() && self.tags.is_none()
    }
}

// ── Serde helper for chrono::Duration ────────────────────────────────

pub(crate) mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(millis))
    }
}
