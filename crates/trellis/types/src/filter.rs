//! List/count filters and sort orders for runs
//!
//! A filter is a set of independent optional predicate fragments
//! combined with AND semantics. Backends share the in-memory `matches`
//! evaluation; a SQL backend would translate each fragment to a WHERE
//! clause instead.

use crate::{Run, RunId, RunKind, StateType};
use serde::{Deserialize, Serialize};

/// AND-combined predicate fragments over runs
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RunKind>,

    /// Only runs owned by this run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<RunId>,

    /// Only top-level runs (no owning run)
    #[serde(default)]
    pub only_top_level: bool,

    /// Current state type is one of these
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_types: Option<Vec<StateType>>,

    /// Queue assignment is one of these
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queues: Option<Vec<String>>,

    /// Run carries at least one of these tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_any: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: RunKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_parent(mut self, parent: RunId) -> Self {
        self.parent_run_id = Some(parent);
        self
    }

    pub fn top_level_only(mut self) -> Self {
        self.only_top_level = true;
        self
    }

    pub fn with_state_types(mut self, types: impl IntoIterator<Item = StateType>) -> Self {
        self.state_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_queues(mut self, queues: impl IntoIterator<Item = String>) -> Self {
        self.queues = Some(queues.into_iter().collect());
        self
    }

    pub fn with_tags_any(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags_any = Some(tags.into_iter().collect());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Evaluate every set fragment against a run.
    pub fn matches(&self, run: &Run) -> bool {
        if let Some(kind) = self.kind {
            if run.kind != kind {
                return false;
            }
        }
        if let Some(parent) = self.parent_run_id {
            if run.parent_run_id != Some(parent) {
                return false;
            }
        }
        if self.only_top_level && run.parent_run_id.is_some() {
            return false;
        }
        if let Some(types) = &self.state_types {
            match run.state_type() {
                Some(t) if types.contains(&t) => {}
                _ => return false,
            }
        }
        if let Some(queues) = &self.queues {
            match &run.queue {
                Some(q) if queues.contains(q) => {}
                _ => return false,
            }
        }
        if let Some(tags) = &self.tags_any {
            if !tags.iter().any(|t| run.tags.contains(t)) {
                return false;
            }
        }
        if let Some(key) = &self.idempotency_key {
            if run.idempotency_key.as_deref() != Some(key.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Sort order for run listings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunSort {
    #[default]
    IdDesc,
    CreatedAsc,
    CreatedDesc,
    StartTimeAsc,
    StartTimeDesc,
}

impl RunSort {
    pub fn compare(&self, a: &Run, b: &Run) -> std::cmp::Ordering {
        match self {
            RunSort::IdDesc => b.id.0.cmp(&a.id.0),
            RunSort::CreatedAsc => a.created.cmp(&b.created),
            RunSort::CreatedDesc => b.created.cmp(&a.created),
            // Runs without a start time sort last in either direction
            RunSort::StartTimeAsc => match (a.start_time, b.start_time) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            },
            RunSort::StartTimeDesc => match (a.start_time, b.start_time) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewRun, StateValue};
    use chrono::Utc;

    fn sample_run() -> Run {
        let mut run = NewRun::new(RunKind::Task)
            .with_queue("etl")
            .with_tag("nightly")
            .into_run(Utc::now());
        run.state = Some(StateValue::running());
        run
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(RunFilter::new().matches(&sample_run()));
    }

    #[test]
    fn fragments_combine_with_and() {
        let run = sample_run();
        let filter = RunFilter::new()
            .with_kind(RunKind::Task)
            .with_state_types([StateType::Running])
            .with_queues(["etl".to_string()]);
        assert!(filter.matches(&run));

        let filter = filter.with_tags_any(["missing-tag".to_string()]);
        assert!(!filter.matches(&run));
    }

    #[test]
    fn state_filter_excludes_stateless_runs() {
        let mut run = sample_run();
        run.state = None;
        let filter = RunFilter::new().with_state_types([StateType::Running]);
        assert!(!filter.matches(&run));
    }

    #[test]
    fn top_level_excludes_nested() {
        let mut run = sample_run();
        run.parent_run_id = Some(RunId::generate());
        assert!(!RunFilter::new().top_level_only().matches(&run));
    }

    #[test]
    fn start_time_sort_places_unstarted_last() {
        let mut started = sample_run();
        started.start_time = Some(Utc::now());
        let unstarted = sample_run();
        assert_eq!(
            RunSort::StartTimeDesc.compare(&started, &unstarted),
            std::cmp::Ordering::Less
        );
    }
}
