//! Time-bucketed state histograms.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use trellis_types::{HistoryBucket, StateHistogramEntry, StateType};

/// Aggregate `(state type, entered-at)` observations into fixed-width
/// buckets covering `[start, end)`. Observations outside the window
/// are dropped; every bucket in the window is emitted, empty or not.
/// The final bucket is clamped to `end` when the interval does not
/// divide the window evenly.
pub(crate) fn bucket_states(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Duration,
    observations: impl IntoIterator<Item = (StateType, DateTime<Utc>)>,
) -> Vec<HistoryBucket> {
    let interval_ms = interval.num_milliseconds();
    let window_ms = (end - start).num_milliseconds();
    if interval_ms <= 0 || window_ms <= 0 {
        return Vec::new();
    }
    let bucket_count = ((window_ms + interval_ms - 1) / interval_ms) as usize;

    let mut histograms: Vec<HashMap<StateType, u64>> = vec![HashMap::new(); bucket_count];
    for (state_type, timestamp) in observations {
        if timestamp < start || timestamp >= end {
            continue;
        }
        let index = ((timestamp - start).num_milliseconds() / interval_ms) as usize;
        *histograms[index].entry(state_type).or_insert(0) += 1;
    }

    histograms
        .into_iter()
        .enumerate()
        .map(|(index, histogram)| {
            let interval_start = start + interval * index as i32;
            let interval_end = std::cmp::min(interval_start + interval, end);
            let mut states: Vec<StateHistogramEntry> = histogram
                .into_iter()
                .map(|(state_type, count)| StateHistogramEntry { state_type, count })
                .collect();
            states.sort_by_key(|e| e.state_type.as_str());
            HistoryBucket {
                interval_start,
                interval_end,
                states,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
        start + Duration::seconds(seconds)
    }

    #[test]
    fn observations_land_in_their_interval() {
        let start = Utc::now();
        let end = at(start, 30);
        let buckets = bucket_states(
            start,
            end,
            Duration::seconds(10),
            vec![
                (StateType::Completed, at(start, 1)),
                (StateType::Completed, at(start, 12)),
                (StateType::Failed, at(start, 12)),
                (StateType::Running, at(start, 29)),
            ],
        );

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].total(), 1);
        assert_eq!(buckets[1].total(), 2);
        assert_eq!(buckets[2].total(), 1);
        assert_eq!(buckets[1].states.len(), 2);
    }

    #[test]
    fn out_of_window_observations_are_dropped() {
        let start = Utc::now();
        let end = at(start, 10);
        let buckets = bucket_states(
            start,
            end,
            Duration::seconds(10),
            vec![
                (StateType::Completed, at(start, -1)),
                (StateType::Completed, at(start, 10)),
            ],
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total(), 0);
    }

    #[test]
    fn trailing_bucket_is_clamped_to_the_window() {
        let start = Utc::now();
        let end = at(start, 25);
        let buckets = bucket_states(start, end, Duration::seconds(10), Vec::new());
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[2].interval_end, end);
    }
}
