//! State values: immutable snapshots of a run's status
//!
//! A `StateValue` is created once and never edited. Construction stamps
//! a server-assigned timestamp; a rule may supersede it before the
//! value is committed, but a committed state is frozen.

use crate::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── State Identifier ─────────────────────────────────────────────────

/// Unique identifier for a state value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(pub uuid::Uuid);

impl StateId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── State Type ───────────────────────────────────────────────────────

/// The lifecycle stage a state value represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateType {
    Scheduled,
    Pending,
    Running,
    Paused,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Crashed,
}

impl StateType {
    /// Terminal stages: once here, a run is done unless forced onward.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StateType::Completed | StateType::Failed | StateType::Cancelled | StateType::Crashed
        )
    }

    /// Stages during which a run should not pick up new work.
    pub fn is_stopping(&self) -> bool {
        matches!(self, StateType::Paused | StateType::Cancelling) || self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateType::Scheduled => "SCHEDULED",
            StateType::Pending => "PENDING",
            StateType::Running => "RUNNING",
            StateType::Paused => "PAUSED",
            StateType::Cancelling => "CANCELLING",
            StateType::Completed => "COMPLETED",
            StateType::Failed => "FAILED",
            StateType::Cancelled => "CANCELLED",
            StateType::Crashed => "CRASHED",
        }
    }
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── State Details ────────────────────────────────────────────────────

/// Structured detail payload attached to a state value
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDetails {
    /// When a scheduled state should become eligible to run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,

    /// Delay before a retry attempt becomes eligible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_seconds: Option<u64>,

    /// Whether the run's result cannot be tracked by the platform
    #[serde(default)]
    pub untrackable_result: bool,

    /// Whether a paused run leaves its slot and is rescheduled instead
    /// of resuming in place
    #[serde(default)]
    pub pause_reschedule: bool,
}

// ── State Value ──────────────────────────────────────────────────────

/// Immutable value object representing one point-in-time status of a run.
///
/// Equality is by content. The `run_id` back-reference is populated by
/// the store when the state is committed as a run's current state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateValue {
    pub id: StateId,
    /// The run this state belongs to; set at commit time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub state_type: StateType,
    /// Server-assigned at construction unless superseded by a rule
    pub timestamp: DateTime<Utc>,
    /// Human-readable name, e.g. "Completed" or "AwaitingRetry"
    pub name: String,
    /// Human-readable message explaining the state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub details: StateDetails,
}

impl StateValue {
    /// Create a state of the given type, stamped with the current time.
    pub fn new(state_type: StateType, name: impl Into<String>) -> Self {
        Self {
            id: StateId::generate(),
            run_id: None,
            state_type,
            timestamp: Utc::now(),
            name: name.into(),
            message: None,
            details: StateDetails::default(),
        }
    }

    pub fn scheduled(scheduled_time: DateTime<Utc>) -> Self {
        let mut state = Self::new(StateType::Scheduled, "Scheduled");
        state.details.scheduled_time = Some(scheduled_time);
        state
    }

    pub fn pending() -> Self {
        Self::new(StateType::Pending, "Pending")
    }

    pub fn running() -> Self {
        Self::new(StateType::Running, "Running")
    }

    pub fn completed() -> Self {
        Self::new(StateType::Completed, "Completed")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(StateType::Failed, "Failed").with_message(message)
    }

    pub fn cancelled() -> Self {
        Self::new(StateType::Cancelled, "Cancelled")
    }

    pub fn crashed(message: impl Into<String>) -> Self {
        Self::new(StateType::Crashed, "Crashed").with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: StateDetails) -> Self {
        self.details = details;
        self
    }

    /// Supersede the server-assigned timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state_type.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(StateType::Completed.is_terminal());
        assert!(StateType::Crashed.is_terminal());
        assert!(!StateType::Running.is_terminal());
        assert!(!StateType::Cancelling.is_terminal());
        assert!(StateType::Cancelling.is_stopping());
    }

    #[test]
    fn constructors_stamp_timestamps() {
        let before = Utc::now();
        let state = StateValue::pending();
        assert_eq!(state.state_type, StateType::Pending);
        assert!(state.timestamp >= before);
        assert!(state.run_id.is_none());
    }

    #[test]
    fn scheduled_carries_scheduled_time() {
        let when = Utc::now() + chrono::Duration::minutes(5);
        let state = StateValue::scheduled(when);
        assert_eq!(state.details.scheduled_time, Some(when));
    }

    #[test]
    fn equality_is_by_content() {
        let a = StateValue::running();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.message = Some("different".into());
        assert_ne!(a, b);
    }

    #[test]
    fn details_default_to_all_flags_clear() {
        let details: StateDetails = serde_json::from_str("{}").unwrap();
        assert!(!details.untrackable_result);
        assert!(!details.pause_reschedule);
        assert!(details.scheduled_time.is_none());
    }

    #[test]
    fn state_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&StateType::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }
}
