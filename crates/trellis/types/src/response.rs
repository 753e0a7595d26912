//! Orchestration responses
//!
//! `set_run_state` always answers with a structured result for
//! Accept/Reject/Wait outcomes; Abort surfaces as an error after the
//! rule scopes unwind.

use crate::StateValue;
use serde::{Deserialize, Serialize};

/// Terminal status of one transition attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetStateStatus {
    /// The proposed state (or a server substitution of it) was committed
    Accept,
    /// A rule substituted a different state, or vetoed the write entirely
    Reject,
    /// A rule raised a terminal orchestration error; nothing was committed
    Abort,
    /// The transition should be retried after a delay; nothing was committed
    Wait,
}

/// Per-status detail entries accumulated by rules during an attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseDetails {
    Reject { reason: String },
    Abort { reason: String },
    Wait { delay_seconds: u64, reason: String },
}

/// Result of a `set_run_state` attempt.
///
/// `state` is the final (possibly substituted) state that was
/// committed, or `None` when the attempt wrote nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub state: Option<StateValue>,
    pub status: SetStateStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ResponseDetails>,
}

impl OrchestrationResult {
    pub fn is_accept(&self) -> bool {
        self.status == SetStateStatus::Accept
    }

    pub fn is_reject(&self) -> bool {
        self.status == SetStateStatus::Reject
    }

    pub fn is_wait(&self) -> bool {
        self.status == SetStateStatus::Wait
    }
}
