//! Run-history aggregation buckets

use crate::StateType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Count of states of one type observed within a bucket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHistogramEntry {
    pub state_type: StateType,
    pub count: u64,
}

/// One interval of the run-history aggregation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryBucket {
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    /// Histogram of state types entered during this interval
    pub states: Vec<StateHistogramEntry>,
}

impl HistoryBucket {
    pub fn empty(interval_start: DateTime<Utc>, interval_end: DateTime<Utc>) -> Self {
        Self {
            interval_start,
            interval_end,
            states: Vec::new(),
        }
    }

    pub fn total(&self) -> u64 {
        self.states.iter().map(|e| e.count).sum()
    }
}
