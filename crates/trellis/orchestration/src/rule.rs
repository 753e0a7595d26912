//! The orchestration rule contract
//!
//! A rule is a scoped interceptor around one transition attempt. It
//! declares the `(from, to)` state-type pairs it governs; the policy
//! compiler filters the catalog to the rules covering the intended
//! transition, and the engine re-checks coverage at entry so a rule
//! whose transition was rewritten by an earlier rule quietly drops out
//! of the chain.

use async_trait::async_trait;
use trellis_types::StateType;

use crate::context::OrchestrationContext;
use crate::error::Result;

/// The `(initial type, proposed type)` pair of a transition attempt.
/// `None` means "the run has no state yet" / "no state proposed".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<StateType>,
    pub to: Option<StateType>,
}

impl Transition {
    pub fn new(from: Option<StateType>, to: Option<StateType>) -> Self {
        Self { from, to }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |t: Option<StateType>| t.map(|t| t.as_str()).unwrap_or("NONE");
        write!(f, "{} -> {}", name(self.from), name(self.to))
    }
}

/// The set of state types a rule declares for one side of a transition
#[derive(Clone, Debug)]
pub enum StateTypeSet {
    /// Matches any type, including "no state"
    Any,
    /// Matches exactly these types; never matches "no state"
    Only(Vec<StateType>),
}

impl StateTypeSet {
    pub fn only(types: impl IntoIterator<Item = StateType>) -> Self {
        Self::Only(types.into_iter().collect())
    }

    pub fn terminal() -> Self {
        Self::only([
            StateType::Completed,
            StateType::Failed,
            StateType::Cancelled,
            StateType::Crashed,
        ])
    }

    pub fn matches(&self, state_type: Option<StateType>) -> bool {
        match self {
            StateTypeSet::Any => true,
            StateTypeSet::Only(types) => state_type.map(|t| types.contains(&t)).unwrap_or(false),
        }
    }
}

/// A single unit of transition-interception logic.
///
/// Rules nest like scoped resource acquisitions: `before_transition`
/// runs on entry (and may mutate the proposal, veto it, or abort the
/// chain); `after_transition` is the teardown, invoked exactly once
/// for every entered rule in reverse entry order, after the inner
/// rules and the final validation have run — so teardown observes
/// whether the transition ultimately committed.
///
/// A rule must be deterministic for a given `(initial type, proposed
/// type, context)`; no hidden randomness.
#[async_trait]
pub trait OrchestrationRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Initial state types this rule governs
    fn from_states(&self) -> StateTypeSet;

    /// Proposed state types this rule governs
    fn to_states(&self) -> StateTypeSet;

    /// Setup: runs before inner rules and validation see the proposal.
    async fn before_transition(&self, ctx: &mut OrchestrationContext) -> Result<()>;

    /// Teardown: runs after inner rules and validation, on every exit
    /// path. The default observes nothing.
    async fn after_transition(&self, _ctx: &mut OrchestrationContext) -> Result<()> {
        Ok(())
    }

    /// Whether this rule governs the given transition.
    fn covers(&self, transition: Transition) -> bool {
        self.from_states().matches(transition.from) && self.to_states().matches(transition.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_missing_state() {
        assert!(StateTypeSet::Any.matches(None));
        assert!(StateTypeSet::Any.matches(Some(StateType::Running)));
    }

    #[test]
    fn only_never_matches_missing_state() {
        let set = StateTypeSet::only([StateType::Running]);
        assert!(set.matches(Some(StateType::Running)));
        assert!(!set.matches(Some(StateType::Pending)));
        assert!(!set.matches(None));
    }

    #[test]
    fn terminal_set_covers_all_terminal_types() {
        let set = StateTypeSet::terminal();
        assert!(set.matches(Some(StateType::Crashed)));
        assert!(!set.matches(Some(StateType::Cancelling)));
    }

    #[test]
    fn transition_display_names_missing_states() {
        let t = Transition::new(None, Some(StateType::Pending));
        assert_eq!(t.to_string(), "NONE -> PENDING");
    }
}
