//! The built-in rule catalog
//!
//! Kind-specific rules (`core`) can veto, rewrite, or delay a
//! transition and are bypassed by forced transitions. Global rules
//! (`global`) maintain invariants and bookkeeping that hold no matter
//! what, including under `force`.

mod core;
mod global;

pub use self::core::{
    PreventRedundantTransitions, PreventRunningTasksFromStoppedParents, ProtectTerminalStates,
    RetryFailedRuns, WaitForScheduledTime, PARAM_MAX_RETRIES, PARAM_RETRY_DELAY_SECONDS,
};
pub use self::global::{
    EnforceMonotonicTimestamps, IncrementRunCount, ResetEndTimeOnRestart, SetEndTime,
    SetStartTime, TrackRunTime,
};
