//! Hub fan-out benchmarks: per-event cost of delivering to N listeners
//!
//! Run with: `cargo bench --bench hub_fanout`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used, clippy::unwrap_used)] // Benchmarks can use expect for setup

use asset_lifecycle_core::{FnListener, Listener, ListenerError, RequestEvent, RequestId};
use asset_lifecycle_runtime::NotificationHub;
use asset_lifecycle_testing::{FailingListener, LifecycleHarness};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ============================================================================
// Benchmark Fixtures
// ============================================================================

fn counting_listener(counter: &Arc<AtomicU64>) -> Arc<dyn Listener<RequestEvent>> {
    let counter = Arc::clone(counter);
    Arc::new(FnListener::new(
        "counter",
        move |_: &RequestEvent| -> Result<(), ListenerError> {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
    ))
}

fn hub_with(listeners: usize, failing_every: Option<usize>) -> NotificationHub<RequestEvent> {
    let hub = NotificationHub::new();
    let counter = Arc::new(AtomicU64::new(0));
    for i in 0..listeners {
        if failing_every.is_some_and(|n| i % n == 0) {
            hub.subscribe(Arc::new(FailingListener::new(format!("failing-{i}"))));
        } else {
            hub.subscribe(counting_listener(&counter));
        }
    }
    hub
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_fanout");
    group.measurement_time(Duration::from_secs(5));
    let event = RequestEvent::Deleted(RequestId::new(1));

    for listeners in [0, 1, 10, 100] {
        let hub = hub_with(listeners, None);
        group.bench_with_input(
            BenchmarkId::new("healthy", listeners),
            &listeners,
            |b, _| b.iter(|| hub.publish(black_box(&event))),
        );
    }

    group.finish();
}

fn bench_fanout_with_failures(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_fanout_failures");
    group.measurement_time(Duration::from_secs(5));
    let event = RequestEvent::Deleted(RequestId::new(1));

    // One in ten listeners returns an error.
    let hub = hub_with(100, Some(10));
    group.bench_function("100_listeners_10_failing", |b| {
        b.iter(|| hub.publish(black_box(&event)));
    });

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle_round_trip");
    group.measurement_time(Duration::from_secs(5));

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    group.bench_function("create_approve_allocate_return", |b| {
        b.to_async(&runtime).iter(|| async {
            let h = LifecycleHarness::new();
            let id = h.approved_request("D1", "E7").await;
            let allocation = h.manager.allocate(black_box(id)).await.unwrap();
            h.manager
                .return_device(
                    allocation.id,
                    asset_lifecycle_core::ReturnCondition::Good,
                    None,
                )
                .await
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_fanout,
    bench_fanout_with_failures,
    bench_round_trip
);
criterion_main!(benches);
