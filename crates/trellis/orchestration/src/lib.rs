//! The Trellis orchestration engine
//!
//! Setting a new state on a run is the one action governed by
//! orchestration logic. A proposed state does not guarantee a write:
//! an ordered chain of [`OrchestrationRule`]s intercepts the
//! transition and may pass it through, rewrite it, veto it, or abort
//! the whole attempt. If the (possibly substituted) state survives the
//! chain, it is committed as the run's new current state.
//!
//! # How a transition attempt runs
//!
//! 1. The engine acquires the run's exclusive lock — at most one
//!    in-flight transition per run.
//! 2. Two rule tiers are compiled for the `(initial, proposed)` type
//!    pair: the **kind-specific policy** (replaced by the minimal
//!    policy when the caller forces the transition) and the **global
//!    policy**, which always applies.
//! 3. Rules nest like scoped resource acquisitions: each entered
//!    rule's `before_transition` runs on the way in, and its
//!    `after_transition` is guaranteed to run exactly once on the way
//!    out, in reverse entry order, on every exit path. Kind-specific
//!    rules wrap global rules, so global rules see the final proposal
//!    right before validation.
//! 4. `validate_proposed_state` commits the surviving proposal inside
//!    the locked scope, then the scopes unwind.
//! 5. Accept and Reject (a state was considered and a concrete answer
//!    produced) dispatch notification evaluation; Wait and Abort never
//!    do. Accepted scheduled task runs are handed to the scheduled-run
//!    sink for queue fan-out.

#![deny(unsafe_code)]

mod context;
mod dispatch;
mod engine;
mod error;
mod policy;
mod rule;
pub mod rules;

pub use context::OrchestrationContext;
pub use dispatch::{NoopDispatcher, NoopScheduledRunSink, NotificationDispatcher, ScheduledRunSink};
pub use engine::OrchestrationEngine;
pub use error::{OrchestrationError, Result};
pub use policy::Policy;
pub use rule::{OrchestrationRule, StateTypeSet, Transition};
