//! Policies: ordered, transition-keyed rule catalogs
//!
//! A policy is a statically declared, ordered list of rules. Compiling
//! a policy for a transition filters the catalog to the rules whose
//! declared `(from, to)` sets cover the pair, preserving declaration
//! order — earlier rules wrap later ones, so earlier rules' teardown
//! observes the final outcome after later rules and validation have
//! already run.

use std::sync::Arc;

use crate::rule::{OrchestrationRule, Transition};
use crate::rules;

/// An ordered catalog of orchestration rules for a class of
/// transitions.
#[derive(Clone)]
pub struct Policy {
    name: &'static str,
    catalog: Vec<Arc<dyn OrchestrationRule>>,
}

impl Policy {
    pub fn new(name: &'static str, catalog: Vec<Arc<dyn OrchestrationRule>>) -> Self {
        Self { name, catalog }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rules(&self) -> &[Arc<dyn OrchestrationRule>] {
        &self.catalog
    }

    /// Filter the catalog to the rules covering this transition,
    /// preserving declaration order. Deterministic: the same pair
    /// always compiles to the same chain.
    pub fn compile_transition_rules(&self, transition: Transition) -> Vec<Arc<dyn OrchestrationRule>> {
        self.catalog
            .iter()
            .filter(|rule| rule.covers(transition))
            .cloned()
            .collect()
    }

    /// The kind-specific policy for nested task runs.
    pub fn task_policy() -> Self {
        Self::new(
            "task_policy",
            vec![
                Arc::new(rules::ProtectTerminalStates),
                Arc::new(rules::PreventRedundantTransitions),
                Arc::new(rules::PreventRunningTasksFromStoppedParents),
                Arc::new(rules::RetryFailedRuns),
                Arc::new(rules::WaitForScheduledTime),
            ],
        )
    }

    /// The kind-specific policy for top-level flow runs.
    pub fn flow_policy() -> Self {
        Self::new(
            "flow_policy",
            vec![
                Arc::new(rules::ProtectTerminalStates),
                Arc::new(rules::PreventRedundantTransitions),
                Arc::new(rules::RetryFailedRuns),
                Arc::new(rules::WaitForScheduledTime),
            ],
        )
    }

    /// The near-empty policy substituted for the kind-specific tier on
    /// forced transitions (or when no policy was supplied).
    pub fn minimal() -> Self {
        Self::new("minimal", Vec::new())
    }

    /// Kind-independent bookkeeping and invariants; applies to every
    /// transition regardless of the force flag.
    pub fn global() -> Self {
        Self::new(
            "global_policy",
            vec![
                Arc::new(rules::EnforceMonotonicTimestamps),
                Arc::new(rules::SetStartTime),
                Arc::new(rules::IncrementRunCount),
                Arc::new(rules::TrackRunTime),
                Arc::new(rules::SetEndTime),
                Arc::new(rules::ResetEndTimeOnRestart),
            ],
        )
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("rules", &self.catalog.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_types::StateType;

    #[test]
    fn compilation_preserves_declaration_order() {
        let policy = Policy::task_policy();
        let transition =
            Transition::new(Some(StateType::Running), Some(StateType::Failed));

        let chain = policy.compile_transition_rules(transition);
        let names: Vec<_> = chain.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            ["prevent_redundant_transitions", "retry_failed_runs"]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let policy = Policy::flow_policy();
        let transition =
            Transition::new(Some(StateType::Scheduled), Some(StateType::Pending));

        let first: Vec<_> = policy
            .compile_transition_rules(transition)
            .iter()
            .map(|r| r.name())
            .collect();
        let second: Vec<_> = policy
            .compile_transition_rules(transition)
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn minimal_policy_compiles_to_empty_chain() {
        let chain = Policy::minimal().compile_transition_rules(Transition::new(
            Some(StateType::Completed),
            Some(StateType::Running),
        ));
        assert!(chain.is_empty());
    }

    #[test]
    fn global_policy_covers_every_transition() {
        // Monotonic timestamps are declared Any -> Any, so no pair
        // compiles to an empty global chain.
        let policy = Policy::global();
        let chain = policy.compile_transition_rules(Transition::new(None, Some(StateType::Pending)));
        assert!(!chain.is_empty());
    }
}
