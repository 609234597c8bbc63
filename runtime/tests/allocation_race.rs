//! Integration tests for concurrent allocation of one device
//!
//! `allocate` checks for an active allocation and then creates one. The two
//! steps are separate repository calls, so two requests for the same device
//! can both pass the check. Closing that window is the storage layer's job
//! (a unique partial index on active allocations per device). These tests
//! pin both halves of that contract:
//!
//! - without the constraint, the interleaving produces two active rows
//! - with it, exactly one caller wins and the other gets a repository error
//!
//! Returns have the same read-then-write shape. There the guard is part of
//! the repository contract: `update_return_info` only closes an active row.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use asset_lifecycle_core::{DeviceId, LifecycleError, RequestStatus, ReturnCondition};
use asset_lifecycle_testing::{InMemoryAllocationRepository, LifecycleHarness};
use futures::future::join;

#[tokio::test]
async fn sequential_allocations_conflict() {
    let h = LifecycleHarness::new();
    let first = h.approved_request("D1", "E7").await;
    let second = h.approved_request("D1", "E8").await;

    h.manager.allocate(first).await.unwrap();
    let result = h.manager.allocate(second).await;

    assert!(matches!(result, Err(LifecycleError::Conflict(_))));
    assert_eq!(h.allocations.active_for_device(&DeviceId::new("D1")).len(), 1);
}

#[tokio::test]
async fn interleaved_check_then_create_double_allocates() {
    let h = LifecycleHarness::new();
    let first = h.approved_request("D1", "E7").await;
    let second = h.approved_request("D1", "E8").await;
    h.allocations.yield_during_active_check(true);

    let (a, b) = join(h.manager.allocate(first), h.manager.allocate(second)).await;

    // Both callers passed the check before either created its row.
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(h.allocations.active_for_device(&DeviceId::new("D1")).len(), 2);
}

#[tokio::test]
async fn unique_active_device_lets_exactly_one_win() {
    let h = LifecycleHarness::with_allocations(
        InMemoryAllocationRepository::new().with_unique_active_device(),
    );
    let first = h.approved_request("D1", "E7").await;
    let second = h.approved_request("D1", "E8").await;
    h.allocations.yield_during_active_check(true);

    let (a, b) = join(h.manager.allocate(first), h.manager.allocate(second)).await;

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(LifecycleError::Repository(_))));

    assert_eq!(h.allocations.active_for_device(&DeviceId::new("D1")).len(), 1);
    assert_eq!(
        h.lifecycle
            .count_by_status(RequestStatus::Allocated)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        h.lifecycle
            .count_by_status(RequestStatus::Approved)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn different_devices_allocate_concurrently() {
    let h = LifecycleHarness::with_allocations(
        InMemoryAllocationRepository::new().with_unique_active_device(),
    );
    let first = h.approved_request("D1", "E7").await;
    let second = h.approved_request("D2", "E7").await;
    h.allocations.yield_during_active_check(true);

    let (a, b) = join(h.manager.allocate(first), h.manager.allocate(second)).await;

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(h.manager.count_active().await.unwrap(), 2);
}

// ============================================================================
// Concurrent returns
// ============================================================================

#[tokio::test]
async fn concurrent_returns_close_the_allocation_once() {
    let h = LifecycleHarness::new();
    let id = h.approved_request("D1", "E7").await;
    let allocation = h.manager.allocate(id).await.unwrap();
    h.clear_events();
    h.allocations.yield_before_return_write(true);

    let (a, b) = join(
        h.manager
            .return_device(allocation.id, ReturnCondition::Good, Some("first")),
        h.manager
            .return_device(allocation.id, ReturnCondition::Lost, Some("second")),
    )
    .await;

    let winner = a.unwrap();
    assert!(matches!(b, Err(LifecycleError::Conflict(_))));

    let stored = h.manager.get(allocation.id).await.unwrap();
    assert_eq!(stored, winner);
    assert_eq!(stored.return_condition, Some(ReturnCondition::Good));
    assert_eq!(stored.notes.as_deref(), Some("first"));
    assert_eq!(
        h.allocation_events.event_types(),
        vec!["AllocationUpdated.v1", "AllocationStatusChanged.v1"]
    );
}
