//! Kind-specific orchestration rules
//!
//! These are the rules a forced transition bypasses. Each one guards a
//! narrow slice of the transition space, declared through its
//! `(from_states, to_states)` pair.

use async_trait::async_trait;
use chrono::Utc;
use trellis_types::{RunKind, StateDetails, StateType, StateValue};

use crate::context::OrchestrationContext;
use crate::error::Result;
use crate::rule::{OrchestrationRule, StateTypeSet};

/// Parameter key: how many times a failed run may be retried.
pub const PARAM_MAX_RETRIES: &str = "max_retries";
/// Parameter key: seconds before a retry becomes eligible.
pub const PARAM_RETRY_DELAY_SECONDS: &str = "retry_delay_seconds";

// ── ProtectTerminalStates ────────────────────────────────────────────

/// Vetoes any transition out of a terminal state. A run that finished
/// stays finished unless the caller forces it onward.
pub struct ProtectTerminalStates;

#[async_trait]
impl OrchestrationRule for ProtectTerminalStates {
    fn name(&self) -> &'static str {
        "protect_terminal_states"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::terminal()
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        if let Some(initial) = ctx.initial_type() {
            ctx.reject_transition(
                None,
                format!("run is already in the terminal state {initial}"),
            );
        }
        Ok(())
    }
}

// ── PreventRedundantTransitions ──────────────────────────────────────

/// Vetoes a transition into the state type the run is already in.
pub struct PreventRedundantTransitions;

#[async_trait]
impl OrchestrationRule for PreventRedundantTransitions {
    fn name(&self) -> &'static str {
        "prevent_redundant_transitions"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        match (ctx.initial_type(), ctx.proposed_type()) {
            (Some(from), Some(to)) if from == to => {
                ctx.reject_transition(None, format!("run is already in state {to}"));
            }
            _ => {}
        }
        Ok(())
    }
}

// ── PreventRunningTasksFromStoppedParents ────────────────────────────

/// A nested task run may not start while its owning run is paused,
/// cancelling, or finished.
pub struct PreventRunningTasksFromStoppedParents;

#[async_trait]
impl OrchestrationRule for PreventRunningTasksFromStoppedParents {
    fn name(&self) -> &'static str {
        "prevent_running_tasks_from_stopped_parents"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Running])
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        if ctx.run().kind != RunKind::Task {
            return Ok(());
        }
        let Some(parent_id) = ctx.run().parent_run_id else {
            return Ok(());
        };

        let parent = ctx.store().read_run(parent_id).await?;
        let stopped = parent
            .as_ref()
            .and_then(|p| p.state_type())
            .map(|t| t.is_stopping())
            .unwrap_or(false);
        if stopped {
            ctx.reject_transition(
                None,
                format!("owning run {parent_id} is stopped; task may not start"),
            );
        }
        Ok(())
    }
}

// ── RetryFailedRuns ──────────────────────────────────────────────────

/// Converts a failure into a scheduled retry while the retry budget
/// lasts. The proposed Failed state is rejected and a server-supplied
/// Scheduled state ("AwaitingRetry") is substituted in its place.
pub struct RetryFailedRuns;

#[async_trait]
impl OrchestrationRule for RetryFailedRuns {
    fn name(&self) -> &'static str {
        "retry_failed_runs"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Running])
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Failed])
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let max_retries = ctx.parameter_u64(PARAM_MAX_RETRIES).unwrap_or(0);
        // run_count counts entries into Running; attempt N may retry
        // while N <= max_retries.
        if u64::from(ctx.run().run_count) > max_retries {
            return Ok(());
        }

        let delay = ctx.parameter_u64(PARAM_RETRY_DELAY_SECONDS).unwrap_or(0);
        let scheduled_time = Utc::now() + chrono::Duration::seconds(delay as i64);
        let retry = StateValue::new(StateType::Scheduled, "AwaitingRetry")
            .with_message("retrying failed run")
            .with_details(StateDetails {
                scheduled_time: Some(scheduled_time),
                retry_delay_seconds: Some(delay),
                ..Default::default()
            });

        tracing::info!(
            run_id = %ctx.run_id(),
            attempt = ctx.run().run_count,
            max_retries,
            "scheduling retry for failed run"
        );
        ctx.reject_transition(Some(retry), "failed run will be retried");
        Ok(())
    }
}

// ── WaitForScheduledTime ─────────────────────────────────────────────

/// Holds back a scheduled run that tries to leave Scheduled before its
/// scheduled time: the caller is told to wait for the remaining delay.
pub struct WaitForScheduledTime;

#[async_trait]
impl OrchestrationRule for WaitForScheduledTime {
    fn name(&self) -> &'static str {
        "wait_for_scheduled_time"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Scheduled])
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Pending, StateType::Running])
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let scheduled_time = ctx
            .initial_state()
            .and_then(|s| s.details.scheduled_time);
        let Some(scheduled_time) = scheduled_time else {
            return Ok(());
        };

        let now = Utc::now();
        if scheduled_time > now {
            let remaining = (scheduled_time - now).num_seconds().max(1) as u64;
            ctx.delay_transition(remaining, "run is not yet eligible; scheduled time not reached");
        }
        Ok(())
    }
}
