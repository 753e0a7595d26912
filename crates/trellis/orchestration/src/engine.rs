//! The orchestration engine: `set_run_state` end to end
//!
//! One engine invocation runs one transition attempt: acquire the
//! run's lock, compile both rule tiers, thread the context through the
//! nested rule scopes, validate, unwind, and fire side effects for
//! transitions that actually resolved.

use std::collections::HashMap;
use std::sync::Arc;
use trellis_store::{RunStore, StoreError};
use trellis_types::{OrchestrationResult, RunId, RunKind, SetStateStatus, StateType, StateValue};

use crate::context::OrchestrationContext;
use crate::dispatch::{
    NoopDispatcher, NoopScheduledRunSink, NotificationDispatcher, ScheduledRunSink,
};
use crate::error::{OrchestrationError, Result};
use crate::policy::Policy;
use crate::rule::{OrchestrationRule, Transition};

/// Orchestrates run state transitions against a store, with
/// notification and queueing side effects behind seams.
pub struct OrchestrationEngine {
    store: Arc<dyn RunStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    scheduled_sink: Arc<dyn ScheduledRunSink>,
    global_policy: Policy,
}

impl OrchestrationEngine {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            store,
            dispatcher: Arc::new(NoopDispatcher),
            scheduled_sink: Arc::new(NoopScheduledRunSink),
            global_policy: Policy::global(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_scheduled_sink(mut self, sink: Arc<dyn ScheduledRunSink>) -> Self {
        self.scheduled_sink = sink;
        self
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Attempt one orchestrated state transition.
    ///
    /// Accept, Reject, and Wait come back as a structured
    /// [`OrchestrationResult`]; an abort (a rule raised the terminal
    /// orchestration error) surfaces as [`OrchestrationError::Aborted`]
    /// after every entered rule scope has been unwound.
    pub async fn set_run_state(
        &self,
        run_id: RunId,
        proposed_state: StateValue,
        force: bool,
        policy: Option<&Policy>,
        parameters: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<OrchestrationResult> {
        // Held for the whole attempt: serializes transitions per run.
        let _lock = match self.store.lock_run(run_id).await {
            Ok(lock) => lock,
            Err(StoreError::NotFound(id)) => return Err(OrchestrationError::RunNotFound(id)),
            Err(err) => return Err(err.into()),
        };
        let run = self
            .store
            .read_run(run_id)
            .await?
            .ok_or(OrchestrationError::RunNotFound(run_id))?;

        let initial_state = run.state.clone();
        let intended = Transition::new(
            initial_state.as_ref().map(|s| s.state_type),
            Some(proposed_state.state_type),
        );

        // Forced (or policy-less) transitions bypass the kind-specific
        // tier; the global tier always applies.
        let minimal = Policy::minimal();
        let kind_policy = match policy {
            Some(p) if !force => p,
            _ => &minimal,
        };
        let kind_rules = kind_policy.compile_transition_rules(intended);
        let global_rules = self.global_policy.compile_transition_rules(intended);

        tracing::debug!(
            %run_id,
            transition = %intended,
            policy = kind_policy.name(),
            force,
            kind_rules = kind_rules.len(),
            global_rules = global_rules.len(),
            "orchestrating state transition"
        );

        let mut ctx = OrchestrationContext::new(
            self.store.clone(),
            run,
            initial_state,
            proposed_state,
        );
        if let Some(parameters) = parameters {
            ctx.parameters = parameters;
        }

        // Enter rule scopes: kind-specific rules wrap global rules, so
        // global rules see the final proposal right before validation.
        let mut entered: Vec<Arc<dyn OrchestrationRule>> = Vec::new();
        let mut failure: Option<OrchestrationError> = None;

        for rule in kind_rules.iter().chain(global_rules.iter()) {
            if ctx.orchestration_error().is_some() {
                break;
            }
            // An earlier rule may have rewritten the proposal; a rule
            // that no longer covers the live transition drops out.
            let live = Transition::new(intended.from, ctx.proposed_type());
            if !rule.covers(live) {
                tracing::debug!(rule = rule.name(), transition = %live, "rule skipped");
                continue;
            }
            match rule.before_transition(&mut ctx).await {
                Ok(()) => entered.push(rule.clone()),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        // Terminal step inside the innermost scope.
        if failure.is_none() {
            if let Err(err) = ctx.validate_proposed_state().await {
                failure = Some(err.into());
            }
        }

        // Unwind: teardown runs exactly once per entered rule, in
        // reverse entry order, on every exit path.
        for rule in entered.iter().rev() {
            if let Err(err) = rule.after_transition(&mut ctx).await {
                tracing::warn!(rule = rule.name(), error = %err, "rule teardown failed");
                if failure.is_none() {
                    failure = Some(err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if let Some(reason) = ctx.orchestration_error() {
            return Err(OrchestrationError::Aborted(reason.to_string()));
        }

        let run = ctx.run().clone();
        let result = ctx.into_result();

        // A transition that resolved to a concrete answer (either the
        // caller's state or a server substitution) triggers
        // notification evaluation; Wait never does.
        if matches!(result.status, SetStateStatus::Accept | SetStateStatus::Reject) {
            self.dispatcher.run_state_changed(&run).await;
        }

        // Committed scheduled task runs fan out to queue subscribers.
        let landed_scheduled = result
            .state
            .as_ref()
            .map(|s| s.state_type == StateType::Scheduled)
            .unwrap_or(false);
        if landed_scheduled && run.kind == RunKind::Task && run.queue.is_some() {
            self.scheduled_sink.run_scheduled(&run).await;
        }

        Ok(result)
    }
}
