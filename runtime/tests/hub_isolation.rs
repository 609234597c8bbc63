//! Integration tests for listener failure isolation
//!
//! Whatever one listener does, the others still see every event, in
//! subscription order, and the publishing service still succeeds.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use asset_lifecycle_core::{Listener, RequestEvent, RequestId, RequestStatus};
use asset_lifecycle_runtime::NotificationHub;
use asset_lifecycle_testing::{
    CallLog, FailingListener, LifecycleHarness, PanickingListener, RecordingListener,
};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Failure {
    Error,
    Panic,
}

fn failure() -> impl Strategy<Value = Failure> {
    prop_oneof![Just(Failure::Error), Just(Failure::Panic)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn kth_failing_listener_does_not_stop_the_others(
        (n, k) in (1usize..8).prop_flat_map(|n| (Just(n), 0..n)),
        kind in failure(),
    ) {
        let hub = NotificationHub::<RequestEvent>::new();
        let log = CallLog::new();
        let mut healthy = Vec::new();

        for i in 0..n {
            if i == k {
                let bad: Arc<dyn Listener<RequestEvent>> = match kind {
                    Failure::Error => Arc::new(FailingListener::new(format!("bad-{i}"))),
                    Failure::Panic => Arc::new(PanickingListener::new(format!("bad-{i}"))),
                };
                hub.subscribe(bad);
            } else {
                let name = format!("ok-{i}");
                hub.subscribe(log.probe(&name));
                healthy.push(name);
            }
        }

        let report = hub.publish(&RequestEvent::Deleted(RequestId::new(1)));

        prop_assert_eq!(log.calls(), healthy);
        prop_assert_eq!(report.delivered, n - 1);
        prop_assert_eq!(report.failed.to_vec(), vec![format!("bad-{k}")]);
        prop_assert_eq!(report.attempted(), n);
    }
}

#[test]
fn every_event_reaches_healthy_listeners() {
    let hub = NotificationHub::<RequestEvent>::new();
    let failing = Arc::new(FailingListener::new("mailer"));
    let panicking = Arc::new(PanickingListener::new("webhook"));
    let recorder = RecordingListener::<RequestEvent>::shared("audit");
    hub.subscribe(failing.clone());
    hub.subscribe(panicking.clone());
    hub.subscribe(recorder.clone());

    for id in 1..=5 {
        let report = hub.publish(&RequestEvent::Deleted(RequestId::new(id)));
        assert!(!report.is_clean());
    }

    assert_eq!(recorder.len(), 5);
    assert_eq!(failing.calls(), 5);
    assert_eq!(panicking.calls(), 5);
}

#[tokio::test]
async fn services_succeed_while_listeners_fail() {
    let h = LifecycleHarness::new();
    let panicking = Arc::new(PanickingListener::new("flaky"));
    h.lifecycle.subscribe(panicking.clone());
    h.manager.subscribe(Arc::new(FailingListener::new("mailer")));

    let id = h.approved_request("D1", "E7").await;
    let allocation = h.manager.allocate(id).await.unwrap();

    assert_eq!(
        h.lifecycle.get(id).await.unwrap().status,
        RequestStatus::Allocated
    );
    assert_eq!(h.manager.get(allocation.id).await.unwrap(), allocation);
    // Added, StatusChanged + Approved, StatusChanged + Allocated
    assert_eq!(panicking.calls(), 5);
    assert_eq!(h.request_events.len(), 5);
    assert_eq!(h.allocation_events.len(), 1);
}

#[test]
fn unsubscribed_listener_misses_later_events() {
    let hub = NotificationHub::<RequestEvent>::new();
    let recorder = RecordingListener::<RequestEvent>::shared("audit");
    let handle: Arc<dyn Listener<RequestEvent>> = recorder.clone();
    hub.subscribe(Arc::clone(&handle));

    hub.publish(&RequestEvent::Deleted(RequestId::new(1)));
    assert!(hub.unsubscribe(&handle));
    hub.publish(&RequestEvent::Deleted(RequestId::new(2)));

    assert_eq!(recorder.len(), 1);
    assert!(hub.is_empty());
}
