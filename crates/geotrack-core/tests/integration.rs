//! End-to-end tests for geotrack-core.
//!
//! Every test wires the real store, dispatcher, repository and worker
//! together; only the location provider is mocked.
//!
//! Run with: `cargo test --package geotrack-core --test integration`

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use geotrack_core::{
    AcquisitionOutcome, MockProvider, RetryPolicy, Tracker, UiIntent, WorkerConfig, WorkerEvent,
};
use geotrack_store::{Store, WorkState};
use geotrack_types::now_millis;
use tokio::time::timeout;

/// Upper bound for anything the tests wait on.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn tracker(provider: Arc<MockProvider>, retry: RetryPolicy) -> Tracker {
    Tracker::new(
        Store::open_in_memory().unwrap(),
        provider,
        WorkerConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_retry(retry),
    )
}

#[tokio::test]
async fn test_refresh_then_jitter_keeps_one_row() {
    let provider = Arc::new(MockProvider::new(37.5665, 126.9780));
    let tracker = tracker(provider.clone(), RetryPolicy::immediate(3));
    let mut live = tracker.observe_locations().execute().await;

    assert!(live.next().await.unwrap().unwrap().is_empty());

    tracker.request_update().execute().await.unwrap();
    tracker.worker().run_pending().await.unwrap();

    let first = live.next().await.unwrap().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!((first[0].latitude, first[0].longitude), (37.5665, 126.978));

    // Make sure the second fix gets a later timestamp
    tokio::time::sleep(Duration::from_millis(5)).await;

    provider.set_location(37.56650001, 126.97800001).await;
    tracker.request_update().execute().await.unwrap();
    tracker.worker().run_pending().await.unwrap();

    let second = live.next().await.unwrap().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first[0].id);
    assert!(second[0].timestamp > first[0].timestamp);
}

#[tokio::test]
async fn test_three_distinct_points_newest_first() {
    let provider = Arc::new(MockProvider::new(0.0, 0.0));
    let tracker = tracker(provider.clone(), RetryPolicy::immediate(1));

    for (lat, lon) in [(10.0, 10.0), (20.0, 20.0), (30.0, 30.0)] {
        provider.set_location(lat, lon).await;
        tracker.request_update().execute().await.unwrap();
        tracker.worker().run_pending().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut live = tracker.observe_locations().execute().await;
    let rows = live.next().await.unwrap().unwrap();

    let latitudes: Vec<f64> = rows.iter().map(|r| r.latitude).collect();
    assert_eq!(latitudes, vec![30.0, 20.0, 10.0]);
    assert!(rows.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

#[tokio::test]
async fn test_no_fix_retries_then_fails_without_new_rows() {
    let provider = Arc::new(MockProvider::unavailable("no satellites"));
    let tracker = tracker(provider.clone(), RetryPolicy::immediate(4));
    let mut events = tracker.worker().events();

    let id = tracker.request_update().execute().await.unwrap();
    assert_eq!(tracker.worker().run_pending().await.unwrap(), 4);

    let store = tracker.store().lock().await;
    let work = store.get_work(id).unwrap().unwrap();
    assert_eq!(work.state, WorkState::Failed);
    assert_eq!(work.attempts, 4);
    assert_eq!(store.count_locations().unwrap(), 0);
    drop(store);

    let mut retries = 0;
    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::WorkRetrying { .. } => retries += 1,
            WorkerEvent::WorkFailed { work_id, .. } => failed = work_id == id,
            _ => {}
        }
    }
    assert_eq!(retries, 3);
    assert!(failed);
}

#[tokio::test]
async fn test_permission_denied_fails_fast() {
    let provider = Arc::new(MockProvider::denied());
    let tracker = tracker(provider.clone(), RetryPolicy::immediate(5));

    let id = tracker.request_update().execute().await.unwrap();
    tracker.worker().run_pending().await.unwrap();

    let work = tracker.store().lock().await.get_work(id).unwrap().unwrap();
    assert_eq!(work.state, WorkState::Failed);
    assert_eq!(work.attempts, 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_two_refreshes_enqueue_two_units() {
    let provider = Arc::new(MockProvider::new(1.0, 1.0));
    let tracker = tracker(provider.clone(), RetryPolicy::immediate(1));

    let a = tracker.request_update().execute().await.unwrap();
    let b = tracker.request_update().execute().await.unwrap();
    assert_ne!(a, b);

    assert_eq!(tracker.worker().run_pending().await.unwrap(), 2);
    assert_eq!(provider.call_count(), 2);
    assert_eq!(tracker.store().lock().await.count_locations().unwrap(), 1);
}

#[tokio::test]
async fn test_view_model_follows_background_worker() {
    let provider = Arc::new(MockProvider::new(37.5665, 126.978));
    let tracker = tracker(provider, RetryPolicy::immediate(3));
    let worker = Arc::clone(tracker.worker()).start();

    let mut vm = tracker.view_model();
    let mut state = vm.subscribe();
    vm.start().await;

    vm.dispatch(UiIntent::Refresh).await;
    assert!(!vm.state().is_loading);

    timeout(TEST_TIMEOUT, state.wait_for(|s| s.locations.len() == 1))
        .await
        .unwrap()
        .unwrap();

    let snapshot = vm.state();
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.locations[0].position.latitude, 37.5665);

    // Closing the view model leaves queued work alone
    vm.close();
    let id = tracker.request_update().execute().await.unwrap();
    let finished = timeout(TEST_TIMEOUT, async {
        loop {
            let work = tracker.store().lock().await.get_work(id).unwrap().unwrap();
            if work.state.is_terminal() {
                break work.state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(finished, WorkState::Succeeded);

    worker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_durable_queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locations.db");

    // First process enqueues and dies before running anything
    let id = {
        let provider = Arc::new(MockProvider::denied());
        let tracker = Tracker::new(
            Store::open(&path).unwrap(),
            provider,
            WorkerConfig::default().with_retry(RetryPolicy::immediate(3)),
        );
        tracker.request_update().execute().await.unwrap()
    };

    // Second process picks it up
    let provider = Arc::new(MockProvider::new(48.8584, 2.2945));
    let tracker = Tracker::new(
        Store::open(&path).unwrap(),
        provider.clone(),
        WorkerConfig::default().with_retry(RetryPolicy::immediate(3)),
    );
    assert_eq!(tracker.worker().run_pending().await.unwrap(), 1);

    let store = tracker.store().lock().await;
    let work = store.get_work(id).unwrap().unwrap();
    assert_eq!(work.state, WorkState::Succeeded);
    assert_eq!(work.max_attempts, 3);
    assert_eq!(store.count_locations().unwrap(), 1);
}

#[tokio::test]
async fn test_interrupted_attempt_is_recovered_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locations.db");

    let id = {
        let store = Store::open(&path).unwrap();
        let id = store.enqueue_work(2).unwrap().id;
        // Lease already expired when the process "dies"
        store.claim_next_work(now_millis(), Duration::ZERO).unwrap();
        id
    };

    let provider = Arc::new(MockProvider::new(1.0, 2.0));
    provider
        .push_outcome(AcquisitionOutcome::unavailable("still cold"))
        .await;
    let tracker = Tracker::new(
        Store::open(&path).unwrap(),
        provider,
        WorkerConfig::default().with_retry(RetryPolicy::immediate(2)),
    );

    assert_eq!(tracker.worker().recover().await.unwrap(), 1);
    tracker.worker().run_pending().await.unwrap();

    // The interrupted attempt counted; the second one exhausted the budget
    let work = tracker.store().lock().await.get_work(id).unwrap().unwrap();
    assert_eq!(work.attempts, 2);
    assert_eq!(work.state, WorkState::Failed);
}

#[tokio::test]
async fn test_in_flight_attempt_is_not_taken_by_second_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locations.db");

    let first = Store::open(&path).unwrap();
    let id = first.enqueue_work(3).unwrap().id;
    let claim = first
        .claim_next_work(now_millis(), Duration::from_secs(60))
        .unwrap()
        .unwrap();

    let provider = Arc::new(MockProvider::new(1.0, 2.0));
    let second = Tracker::new(
        Store::open(&path).unwrap(),
        provider.clone(),
        WorkerConfig::default().with_retry(RetryPolicy::immediate(3)),
    );
    assert_eq!(second.worker().recover().await.unwrap(), 0);
    assert_eq!(second.worker().run_pending().await.unwrap(), 0);
    assert_eq!(provider.call_count(), 0);

    // The first process finishes its attempt normally
    let saved = first.upsert(&geotrack_types::LocationRecord::new(5.0, 6.0, 1)).unwrap();
    let work = first.complete_work(&claim, saved.id).unwrap();
    assert_eq!(work.id, id);
    assert_eq!(work.state, WorkState::Succeeded);
}

#[tokio::test]
async fn test_view_model_follows_worker_in_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locations.db");
    let config = || {
        WorkerConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_retry(RetryPolicy::immediate(3))
    };

    // Viewer without a worker of its own
    let viewer = Tracker::new(
        Store::open(&path).unwrap(),
        Arc::new(MockProvider::new(0.0, 0.0)),
        config(),
    );
    let mut vm = viewer.view_model();
    let mut states = vm.subscribe();
    vm.start().await;

    let background = Tracker::new(
        Store::open(&path).unwrap(),
        Arc::new(MockProvider::new(37.5665, 126.978)),
        config(),
    );
    let handle = Arc::clone(background.worker()).start();
    background.request_update().execute().await.unwrap();

    let state = timeout(TEST_TIMEOUT, states.wait_for(|s| s.locations.len() == 1))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(state.locations[0].position.latitude, 37.5665);

    handle.shutdown().await.unwrap();
}
