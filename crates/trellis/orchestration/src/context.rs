//! The orchestration context: working state of one transition attempt
//!
//! Owned exclusively by one engine invocation; never shared across
//! concurrent attempts. Rules communicate through it — rewriting the
//! proposal, recording response details, or setting the terminal
//! orchestration error that aborts the chain.

use std::collections::HashMap;
use std::sync::Arc;
use trellis_store::{RunStore, TimingUpdate};
use trellis_types::{
    OrchestrationResult, ResponseDetails, Run, RunId, SetStateStatus, StateType, StateValue,
};

use crate::rule::Transition;

/// Mutable working state of one transition attempt.
pub struct OrchestrationContext {
    store: Arc<dyn RunStore>,
    /// The run being transitioned; refreshed when the commit lands
    run: Run,
    /// Read-only snapshot of the state the attempt started from
    initial_state: Option<StateValue>,
    /// The in-flight proposal; rules may replace or clear it
    proposed_state: Option<StateValue>,
    /// Set once validation commits a state; `None` means no state change
    validated_state: Option<StateValue>,
    /// Free-form configuration visible to every rule in the chain
    pub parameters: HashMap<String, serde_json::Value>,
    response_status: SetStateStatus,
    response_details: Vec<ResponseDetails>,
    /// Terminal error; set by any rule to abort the whole attempt
    orchestration_error: Option<String>,
    /// Timing bookkeeping accumulated by global rules, applied at commit
    timing: TimingUpdate,
}

impl OrchestrationContext {
    pub fn new(
        store: Arc<dyn RunStore>,
        run: Run,
        initial_state: Option<StateValue>,
        proposed_state: StateValue,
    ) -> Self {
        Self {
            store,
            run,
            initial_state,
            proposed_state: Some(proposed_state),
            validated_state: None,
            parameters: HashMap::new(),
            response_status: SetStateStatus::Accept,
            response_details: Vec::new(),
            orchestration_error: None,
            timing: TimingUpdate::default(),
        }
    }

    // ── Read access for rules ────────────────────────────────────────

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn run_id(&self) -> RunId {
        self.run.id
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn initial_state(&self) -> Option<&StateValue> {
        self.initial_state.as_ref()
    }

    pub fn proposed_state(&self) -> Option<&StateValue> {
        self.proposed_state.as_ref()
    }

    pub fn validated_state(&self) -> Option<&StateValue> {
        self.validated_state.as_ref()
    }

    pub fn initial_type(&self) -> Option<StateType> {
        self.initial_state.as_ref().map(|s| s.state_type)
    }

    pub fn proposed_type(&self) -> Option<StateType> {
        self.proposed_state.as_ref().map(|s| s.state_type)
    }

    /// The attempt's current `(initial, proposed)` pair. Rules that
    /// rewrite the proposal change what later rules observe here.
    pub fn transition(&self) -> Transition {
        Transition::new(self.initial_type(), self.proposed_type())
    }

    pub fn status(&self) -> SetStateStatus {
        self.response_status
    }

    pub fn details(&self) -> &[ResponseDetails] {
        &self.response_details
    }

    pub fn orchestration_error(&self) -> Option<&str> {
        self.orchestration_error.as_deref()
    }

    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }

    /// Integer parameter helper for rules with numeric configuration.
    pub fn parameter_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(|v| v.as_u64())
    }

    // ── Mutation API for rules ───────────────────────────────────────

    /// Swap the proposal without changing the response status. Used by
    /// bookkeeping rules that adjust the proposed value (e.g. restamp
    /// its timestamp) while still accepting the transition.
    pub fn replace_proposed_state(&mut self, state: StateValue) {
        self.proposed_state = Some(state);
    }

    /// Reject the transition. With `Some(state)` the server substitutes
    /// its own state for the proposal; with `None` the transition is
    /// vetoed entirely and no state will be written.
    pub fn reject_transition(&mut self, state: Option<StateValue>, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!(run_id = %self.run.id, %reason, "transition rejected");
        self.proposed_state = state;
        self.response_status = SetStateStatus::Reject;
        self.response_details.push(ResponseDetails::Reject { reason });
    }

    /// Ask the caller to retry the identical transition after a delay.
    /// Nothing will be written.
    pub fn delay_transition(&mut self, delay_seconds: u64, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!(run_id = %self.run.id, delay_seconds, %reason, "transition delayed");
        self.proposed_state = None;
        self.response_status = SetStateStatus::Wait;
        self.response_details.push(ResponseDetails::Wait {
            delay_seconds,
            reason,
        });
    }

    /// Abort the whole attempt. The engine unwinds every entered rule
    /// scope and then surfaces the error to the caller; nothing is
    /// committed.
    pub fn abort_transition(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!(run_id = %self.run.id, %reason, "transition aborted");
        self.proposed_state = None;
        self.response_status = SetStateStatus::Abort;
        self.response_details.push(ResponseDetails::Abort {
            reason: reason.clone(),
        });
        self.orchestration_error = Some(reason);
    }

    /// Timing bookkeeping applied atomically with the commit.
    pub fn timing_mut(&mut self) -> &mut TimingUpdate {
        &mut self.timing
    }

    // ── Validation ───────────────────────────────────────────────────

    /// The terminal step inside the innermost rule scope. If no rule
    /// set an orchestration error and a proposal survives, it is
    /// committed as the run's new current state (the prior one is
    /// retained in history) and `validated_state` is set. A vetoed
    /// (`None`) proposal writes nothing and `validated_state` stays
    /// `None`.
    pub async fn validate_proposed_state(&mut self) -> trellis_store::Result<()> {
        if self.orchestration_error.is_some() {
            return Ok(());
        }
        let Some(proposed) = self.proposed_state.clone() else {
            return Ok(());
        };

        let timing = std::mem::take(&mut self.timing);
        let run = self.store.commit_state(self.run.id, proposed, timing).await?;
        self.validated_state = run.state.clone();
        tracing::info!(
            run_id = %run.id,
            state = %run.state.as_ref().map(|s| s.state_type.as_str()).unwrap_or("NONE"),
            status = ?self.response_status,
            "state committed"
        );
        self.run = run;
        Ok(())
    }

    /// Collapse the attempt into its caller-visible result.
    pub fn into_result(self) -> OrchestrationResult {
        OrchestrationResult {
            state: self.validated_state,
            status: self.response_status,
            details: self.response_details,
        }
    }
}
