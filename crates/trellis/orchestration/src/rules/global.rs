//! Global orchestration rules
//!
//! Kind-independent invariants and bookkeeping. These run innermost —
//! after the kind-specific tier, right before validation — and apply
//! to every transition, forced or not.

use async_trait::async_trait;
use chrono::Duration;
use trellis_types::StateType;

use crate::context::OrchestrationContext;
use crate::error::Result;
use crate::rule::{OrchestrationRule, StateTypeSet};

// ── EnforceMonotonicTimestamps ───────────────────────────────────────

/// A run's state timestamps never go backwards. A proposal stamped at
/// or before the current state is restamped just past it.
pub struct EnforceMonotonicTimestamps;

#[async_trait]
impl OrchestrationRule for EnforceMonotonicTimestamps {
    fn name(&self) -> &'static str {
        "enforce_monotonic_timestamps"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let Some(initial_ts) = ctx.initial_state().map(|s| s.timestamp) else {
            return Ok(());
        };
        let Some(proposed) = ctx.proposed_state() else {
            return Ok(());
        };
        if proposed.timestamp <= initial_ts {
            let restamped = proposed
                .clone()
                .with_timestamp(initial_ts + Duration::milliseconds(1));
            ctx.replace_proposed_state(restamped);
        }
        Ok(())
    }
}

// ── SetStartTime ─────────────────────────────────────────────────────

/// Records the run's start time on its first entry into Running.
pub struct SetStartTime;

#[async_trait]
impl OrchestrationRule for SetStartTime {
    fn name(&self) -> &'static str {
        "set_start_time"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Running])
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        if ctx.run().start_time.is_some() {
            return Ok(());
        }
        if let Some(proposed) = ctx.proposed_state() {
            let timestamp = proposed.timestamp;
            ctx.timing_mut().start_time = Some(timestamp);
        }
        Ok(())
    }
}

// ── IncrementRunCount ────────────────────────────────────────────────

/// Counts every entry into Running as one attempt.
pub struct IncrementRunCount;

#[async_trait]
impl OrchestrationRule for IncrementRunCount {
    fn name(&self) -> &'static str {
        "increment_run_count"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Running])
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        ctx.timing_mut().run_count_increment = 1;
        Ok(())
    }
}

// ── TrackRunTime ─────────────────────────────────────────────────────

/// Accumulates the time a run spent in Running when it leaves that
/// state.
pub struct TrackRunTime;

#[async_trait]
impl OrchestrationRule for TrackRunTime {
    fn name(&self) -> &'static str {
        "track_run_time"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::only([StateType::Running])
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let (Some(initial), Some(proposed)) = (ctx.initial_state(), ctx.proposed_state()) else {
            return Ok(());
        };
        let elapsed = proposed.timestamp - initial.timestamp;
        if elapsed > Duration::zero() {
            ctx.timing_mut().run_time_increment = Some(elapsed);
        }
        Ok(())
    }
}

// ── SetEndTime ───────────────────────────────────────────────────────

/// Records the run's end time on entry into any terminal state.
pub struct SetEndTime;

#[async_trait]
impl OrchestrationRule for SetEndTime {
    fn name(&self) -> &'static str {
        "set_end_time"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::terminal()
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        if let Some(proposed) = ctx.proposed_state() {
            let timestamp = proposed.timestamp;
            ctx.timing_mut().end_time = Some(timestamp);
        }
        Ok(())
    }
}

// ── ResetEndTimeOnRestart ────────────────────────────────────────────

/// A forced restart out of a terminal state clears the recorded end
/// time so timing fields stay consistent with the live state.
pub struct ResetEndTimeOnRestart;

#[async_trait]
impl OrchestrationRule for ResetEndTimeOnRestart {
    fn name(&self) -> &'static str {
        "reset_end_time_on_restart"
    }

    fn from_states(&self) -> StateTypeSet {
        StateTypeSet::terminal()
    }

    fn to_states(&self) -> StateTypeSet {
        StateTypeSet::Any
    }

    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let leaving_terminal = ctx
            .proposed_type()
            .map(|t| !t.is_terminal())
            .unwrap_or(false);
        if leaving_terminal {
            ctx.timing_mut().clear_end_time = true;
        }
        Ok(())
    }
}
