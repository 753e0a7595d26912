//! End-to-end lifecycle coverage: creation, orchestrated transitions,
//! history aggregation, and scheduled-run fan-out through one service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use trellis_orchestration::NotificationDispatcher;
use trellis_service::{RunService, ServiceConfig, ServiceError};
use trellis_store::InMemoryRunStore;
use trellis_types::{
    NewRun, Run, RunFilter, RunId, RunKind, RunSort, RunUpdate, SetStateStatus, StateType,
    StateValue,
};

fn service() -> RunService {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RunService::new(Arc::new(InMemoryRunStore::new()), ServiceConfig::default())
}

struct CountingDispatcher {
    calls: AtomicUsize,
}

#[async_trait]
impl NotificationDispatcher for CountingDispatcher {
    async fn run_state_changed(&self, _run: &Run) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Creation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn new_runs_default_to_pending_on_the_default_queue() {
    let service = service();
    let (run, created) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();

    assert!(created);
    assert_eq!(run.state_type(), Some(StateType::Pending));
    assert_eq!(run.queue.as_deref(), Some("default"));
}

#[tokio::test]
async fn idempotency_key_returns_the_existing_run() {
    let service = service();
    let spec = || {
        NewRun::new(RunKind::Flow)
            .with_name("nightly")
            .with_idempotency_key("nightly-2026-08-31")
    };

    let (first, created) = service.create_run(spec()).await.unwrap();
    assert!(created);
    let (second, created) = service.create_run(spec()).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);

    // The repeat attached nothing: still exactly one state, no history.
    assert_eq!(second.state_type(), Some(StateType::Pending));
    let history = service.store().read_state_history(first.id).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn same_key_under_different_parents_creates_distinct_runs() {
    let service = service();
    let (parent_a, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();
    let (parent_b, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();

    let spec = |parent: RunId| {
        NewRun::new(RunKind::Task)
            .with_parent(parent)
            .with_idempotency_key("step-1")
    };
    let (task_a, created_a) = service.create_run(spec(parent_a.id)).await.unwrap();
    let (task_b, created_b) = service.create_run(spec(parent_b.id)).await.unwrap();

    assert!(created_a && created_b);
    assert_ne!(task_a.id, task_b.id);
}

// ── Transitions ──────────────────────────────────────────────────────

#[tokio::test]
async fn terminal_states_are_protected_unless_forced() {
    let service = service();
    let (run, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();

    service
        .set_run_state(run.id, StateValue::running(), false, None)
        .await
        .unwrap();
    service
        .set_run_state(run.id, StateValue::completed(), false, None)
        .await
        .unwrap();

    let rejected = service
        .set_run_state(run.id, StateValue::running(), false, None)
        .await
        .unwrap();
    assert_eq!(rejected.status, SetStateStatus::Reject);
    assert!(rejected.state.is_none());
    let current = service.read_run(run.id).await.unwrap();
    assert_eq!(current.state_type(), Some(StateType::Completed));

    let forced = service
        .set_run_state(run.id, StateValue::running(), true, None)
        .await
        .unwrap();
    assert_eq!(forced.status, SetStateStatus::Accept);
    let current = service.read_run(run.id).await.unwrap();
    assert_eq!(current.state_type(), Some(StateType::Running));
    assert!(current.end_time.is_none());
}

#[tokio::test]
async fn scheduled_runs_wait_until_their_time() {
    let service = service();
    let (run, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();

    let when = Utc::now() + Duration::seconds(120);
    service
        .set_run_state(run.id, StateValue::scheduled(when), true, None)
        .await
        .unwrap();

    let result = service
        .set_run_state(run.id, StateValue::pending(), false, None)
        .await
        .unwrap();
    assert_eq!(result.status, SetStateStatus::Wait);
    assert!(result.state.is_none());
}

#[tokio::test]
async fn concurrent_transitions_on_one_run_serialize() {
    let service = Arc::new(service());
    let (run, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let id = run.id;
        handles.push(tokio::spawn(async move {
            service
                .set_run_state(id, StateValue::running(), true, None)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // One commit per attempt, every attempt counted.
    let run = service.read_run(run.id).await.unwrap();
    assert_eq!(run.run_count, 8);
}

#[tokio::test]
async fn history_retains_every_superseded_state_in_order() {
    let service = service();
    let (run, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();

    service
        .set_run_state(run.id, StateValue::running(), false, None)
        .await
        .unwrap();
    service
        .set_run_state(run.id, StateValue::completed(), false, None)
        .await
        .unwrap();

    let history = service.store().read_state_history(run.id).await.unwrap();
    let types: Vec<StateType> = history.iter().map(|s| s.state_type).collect();
    assert_eq!(types, [StateType::Pending, StateType::Running]);

    // A later transition appends; earlier entries are untouched.
    let snapshot = history.clone();
    service
        .set_run_state(run.id, StateValue::running(), true, None)
        .await
        .unwrap();
    let history = service.store().read_state_history(run.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(&history[..2], &snapshot[..]);
}

#[tokio::test]
async fn failed_task_runs_retry_within_their_budget() {
    let store = Arc::new(InMemoryRunStore::new());
    let config = ServiceConfig {
        default_max_retries: 1,
        default_retry_delay_seconds: 0,
        ..ServiceConfig::default()
    };
    let service = RunService::new(store, config);
    let (run, _) = service.create_run(NewRun::new(RunKind::Task)).await.unwrap();

    service
        .set_run_state(run.id, StateValue::running(), false, None)
        .await
        .unwrap();
    let result = service
        .set_run_state(run.id, StateValue::failed("boom"), false, None)
        .await
        .unwrap();
    assert_eq!(result.status, SetStateStatus::Reject);
    assert_eq!(
        result.state.as_ref().map(|s| s.state_type),
        Some(StateType::Scheduled)
    );

    // Budget spent: the second failure stands.
    service
        .set_run_state(run.id, StateValue::running(), false, None)
        .await
        .unwrap();
    let result = service
        .set_run_state(run.id, StateValue::failed("boom again"), false, None)
        .await
        .unwrap();
    assert_eq!(result.status, SetStateStatus::Accept);
}

// ── Notifications ────────────────────────────────────────────────────

#[tokio::test]
async fn notifications_fire_for_accept_and_reject_never_for_wait() {
    let dispatcher = Arc::new(CountingDispatcher {
        calls: AtomicUsize::new(0),
    });
    let service = RunService::with_dispatcher(
        Arc::new(InMemoryRunStore::new()),
        ServiceConfig::default(),
        dispatcher.clone(),
    );

    // Creation commits the initial Pending state: one dispatch.
    let (run, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();
    assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);

    let when = Utc::now() + Duration::seconds(120);
    service
        .set_run_state(run.id, StateValue::scheduled(when), true, None)
        .await
        .unwrap();
    assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 2);

    // Wait: no dispatch.
    let result = service
        .set_run_state(run.id, StateValue::pending(), false, None)
        .await
        .unwrap();
    assert_eq!(result.status, SetStateStatus::Wait);
    assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 2);

    // Reject (redundant proposal): dispatched.
    let result = service
        .set_run_state(run.id, StateValue::scheduled(when), false, None)
        .await
        .unwrap();
    assert_eq!(result.status, SetStateStatus::Reject);
    assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 3);
}

// ── Listings ─────────────────────────────────────────────────────────

#[tokio::test]
async fn listings_filter_and_respect_the_configured_cap() {
    let config = ServiceConfig {
        max_list_limit: 2,
        ..ServiceConfig::default()
    };
    let service = RunService::new(Arc::new(InMemoryRunStore::new()), config);

    let (parent, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();
    for _ in 0..3 {
        service
            .create_run(NewRun::new(RunKind::Task).with_parent(parent.id))
            .await
            .unwrap();
    }

    let tasks = RunFilter::new().with_kind(RunKind::Task);
    assert_eq!(service.count_runs(&tasks).await.unwrap(), 3);
    let page = service
        .list_runs(&tasks, RunSort::CreatedAsc, 0, Some(10))
        .await
        .unwrap();
    assert_eq!(page.len(), 2, "page size is capped by config");

    let children = RunFilter::new().with_parent(parent.id);
    assert_eq!(service.count_runs(&children).await.unwrap(), 3);
}

#[tokio::test]
async fn update_and_delete_of_missing_runs_report_not_found() {
    let service = service();
    let ghost = RunId::generate();

    let update = RunUpdate {
        name: Some("renamed".to_string()),
        ..RunUpdate::default()
    };
    assert!(matches!(
        service.update_run(ghost, update).await.unwrap_err(),
        ServiceError::NotFound(id) if id == ghost
    ));
    assert!(matches!(
        service.delete_run(ghost).await.unwrap_err(),
        ServiceError::NotFound(_)
    ));
}

// ── History aggregation ──────────────────────────────────────────────

#[tokio::test]
async fn sub_second_history_intervals_are_rejected() {
    let service = service();
    let start = Utc::now();
    let err = service
        .run_history(
            RunKind::Flow,
            start,
            start + Duration::minutes(1),
            Duration::milliseconds(500),
            &RunFilter::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
}

#[tokio::test]
async fn oversized_history_windows_are_rejected() {
    let service = service();
    let start = Utc::now();
    // One-second intervals over ten minutes is more buckets than one
    // request may ask for.
    let err = service
        .run_history(
            RunKind::Flow,
            start,
            start + Duration::minutes(10),
            Duration::seconds(1),
            &RunFilter::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
}

#[tokio::test]
async fn history_buckets_count_states_entered_in_the_window() {
    let service = service();
    let start = Utc::now() - Duration::minutes(1);

    let (run, _) = service.create_run(NewRun::new(RunKind::Flow)).await.unwrap();
    service
        .set_run_state(run.id, StateValue::running(), false, None)
        .await
        .unwrap();
    service
        .set_run_state(run.id, StateValue::completed(), false, None)
        .await
        .unwrap();

    // A task run's states must not leak into the flow-run histogram.
    service
        .create_run(NewRun::new(RunKind::Task).with_parent(run.id))
        .await
        .unwrap();

    let end = Utc::now() + Duration::minutes(1);
    let buckets = service
        .run_history(RunKind::Flow, start, end, Duration::minutes(2), &RunFilter::new())
        .await
        .unwrap();

    assert_eq!(buckets.len(), 1);
    // Pending, Running, Completed all entered inside the window.
    assert_eq!(buckets[0].total(), 3);
    let completed = buckets[0]
        .states
        .iter()
        .find(|e| e.state_type == StateType::Completed)
        .map(|e| e.count);
    assert_eq!(completed, Some(1));

    let task_buckets = service
        .run_history(RunKind::Task, start, end, Duration::minutes(2), &RunFilter::new())
        .await
        .unwrap();
    assert_eq!(task_buckets[0].total(), 1, "only the task's Pending state");
}

// ── Scheduled-run fan-out ────────────────────────────────────────────

#[tokio::test]
async fn scheduled_task_runs_reach_queue_subscribers() {
    let service = service();
    let (run, _) = service
        .create_run(
            NewRun::new(RunKind::Task)
                .with_queue("etl")
                .with_state(StateValue::scheduled(Utc::now() + Duration::seconds(30))),
        )
        .await
        .unwrap();

    let subscription = service.subscribe(&["etl"]);
    let delivery = subscription.next().await.unwrap();
    assert_eq!(delivery.key(), "etl");
    assert_eq!(delivery.ack().id, run.id);
}

#[tokio::test]
async fn unacknowledged_deliveries_are_redelivered() {
    let service = service();
    service
        .create_run(
            NewRun::new(RunKind::Task)
                .with_queue("etl")
                .with_state(StateValue::scheduled(Utc::now() + Duration::seconds(30))),
        )
        .await
        .unwrap();

    let subscription = service.subscribe(&["etl"]);
    let first = subscription.next().await.unwrap();
    let id = first.item().id;
    drop(first);

    let second = subscription.next().await.unwrap();
    assert_eq!(second.ack().id, id);
}

#[tokio::test]
async fn flow_runs_never_fan_out_to_queues() {
    let service = service();
    service
        .create_run(
            NewRun::new(RunKind::Flow)
                .with_queue("etl")
                .with_state(StateValue::scheduled(Utc::now() + Duration::seconds(30))),
        )
        .await
        .unwrap();

    // The topic exists once subscribed to, but holds nothing.
    let subscription = service.subscribe(&["etl"]);
    assert_eq!(subscription.keys(), ["etl"]);
    let empty = tokio::time::timeout(std::time::Duration::from_millis(50), subscription.next())
        .await
        .is_err();
    assert!(empty, "nothing should have been enqueued");
}
