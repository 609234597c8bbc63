//! Request → Allocation hand-off and the return protocol.
//!
//! # Allocate
//!
//! ```text
//! find request ── absent ──────────────► NotFound
//!      │
//!      ├── status != APPROVED ─────────► InvalidTransition
//!      │
//! device active? ── yes ───────────────► Conflict
//!      │
//! create allocation, publish Added
//!      │
//! mark_allocated ── fails ─────────────► PartialAllocation (allocation kept)
//!      │
//!      ▼
//!   Allocation
//! ```
//!
//! The two writes are not one transaction, and the device check is not
//! locked against concurrent callers. [`AllocationManager::reconcile`]
//! repairs the first gap; the second belongs to the storage layer.

use crate::hub::NotificationHub;
use crate::metrics::record_conflict;
use crate::request_lifecycle::{RequestLifecycle, parse_device_id};
use asset_lifecycle_core::environment::Clock;
use asset_lifecycle_core::error::{EntityKind, LifecycleError, Result};
use asset_lifecycle_core::event::AllocationEvent;
use asset_lifecycle_core::ids::{AllocationId, RequestId};
use asset_lifecycle_core::listener::Listener;
use asset_lifecycle_core::repository::AllocationRepository;
use asset_lifecycle_core::search::{Keyword, filter_by_keyword};
use asset_lifecycle_core::status::{AllocationStatus, RequestStatus, ReturnCondition};
use asset_lifecycle_core::types::{
    Allocation, DEFAULT_MAX_TEXT_LENGTH, NewAllocation, Request, normalize_text,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Coordinates allocations with the request state machine.
pub struct AllocationManager {
    allocations: Arc<dyn AllocationRepository>,
    requests: Arc<RequestLifecycle>,
    hub: Arc<NotificationHub<AllocationEvent>>,
    clock: Arc<dyn Clock>,
    max_text_length: usize,
}

impl AllocationManager {
    /// Create the manager with a fresh, empty hub.
    #[must_use]
    pub fn new(
        allocations: Arc<dyn AllocationRepository>,
        requests: Arc<RequestLifecycle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_hub(allocations, requests, clock, Arc::new(NotificationHub::new()))
    }

    /// Create the manager publishing on an existing hub.
    #[must_use]
    pub fn with_hub(
        allocations: Arc<dyn AllocationRepository>,
        requests: Arc<RequestLifecycle>,
        clock: Arc<dyn Clock>,
        hub: Arc<NotificationHub<AllocationEvent>>,
    ) -> Self {
        Self {
            allocations,
            requests,
            hub,
            clock,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }

    /// Cap free-text return `notes` at `max_text_length` characters.
    #[must_use]
    pub const fn with_max_text_length(mut self, max_text_length: usize) -> Self {
        self.max_text_length = max_text_length;
        self
    }

    /// Hand the device of an approved request over to its employee.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`] if the request does not exist
    /// - [`LifecycleError::InvalidTransition`] unless the request is
    ///   `Approved`; nothing is created
    /// - [`LifecycleError::Conflict`] if the device already has an active
    ///   allocation; nothing is created
    /// - [`LifecycleError::PartialAllocation`] if the allocation was stored
    ///   but the request could not be marked allocated
    /// - [`LifecycleError::Repository`] if storage fails before the
    ///   allocation is written
    #[instrument(skip_all, fields(request_id = %request_id))]
    pub async fn allocate(&self, request_id: RequestId) -> Result<Allocation> {
        let request = self.requests.get(request_id).await?;
        if request.status != RequestStatus::Approved {
            warn!(status = %request.status, "Only approved requests can be allocated");
            return Err(LifecycleError::InvalidTransition {
                id: request_id,
                from: request.status,
                to: RequestStatus::Allocated,
            });
        }

        if self
            .allocations
            .is_device_actively_allocated(request.device_id.clone())
            .await?
        {
            warn!(device_id = %request.device_id, "Device already allocated");
            record_conflict("device_allocated");
            return Err(LifecycleError::conflict(format!(
                "Device {} already has an active allocation",
                request.device_id
            )));
        }

        let allocation = self
            .allocations
            .create(NewAllocation::for_request(&request, self.clock.now()))
            .await?;
        info!(
            allocation_id = %allocation.id,
            device_id = %allocation.device_id,
            employee_id = %allocation.employee_id,
            "Allocation created"
        );
        self.hub.publish(&AllocationEvent::Added(allocation.clone()));

        if let Err(source) = self.requests.mark_allocated(request_id).await {
            error!(
                allocation_id = %allocation.id,
                error = %source,
                "Allocation stored but request not marked allocated"
            );
            return Err(LifecycleError::PartialAllocation {
                allocation: Box::new(allocation),
                source: Box::new(source),
            });
        }
        Ok(allocation)
    }

    /// Record that the device came back.
    ///
    /// `returned_at` is the clock's now, never earlier than `issued_at`.
    /// Device status is left alone; see `AssetDesk::receive_return`.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `notes` is too long
    /// - [`LifecycleError::NotFound`] if the allocation does not exist
    /// - [`LifecycleError::Conflict`] if it was already returned, including
    ///   by a concurrent call between the read and the write; the stored
    ///   return information is untouched
    /// - [`LifecycleError::Repository`] if storage fails
    #[instrument(skip_all, fields(allocation_id = %allocation_id, condition = condition.as_str()))]
    pub async fn return_device(
        &self,
        allocation_id: AllocationId,
        condition: ReturnCondition,
        notes: Option<&str>,
    ) -> Result<Allocation> {
        let notes = normalize_text("notes", notes, self.max_text_length)?;
        let before = self.get(allocation_id).await?;

        let returned_at = self.clock.now().max(before.issued_at);
        let mut after = before.clone();
        if let Err(conflict) = after.record_return(returned_at, condition, notes) {
            warn!(error = %conflict, "Allocation already returned");
            record_conflict("already_returned");
            return Err(conflict);
        }

        let written = self
            .allocations
            .update_return_info(allocation_id, returned_at, condition, after.notes.clone())
            .await?;
        if !written {
            // Either deleted or closed by a concurrent return since the read.
            if self.allocations.find_by_id(allocation_id).await?.is_none() {
                return Err(LifecycleError::not_found(EntityKind::Allocation, allocation_id));
            }
            warn!("Allocation returned concurrently");
            record_conflict("already_returned");
            return Err(LifecycleError::conflict(format!(
                "Allocation {allocation_id} was already returned"
            )));
        }

        info!(
            device_id = %after.device_id,
            returned_at = %returned_at,
            "Allocation returned"
        );
        self.hub.publish(&AllocationEvent::Updated {
            before,
            after: after.clone(),
        });
        self.hub.publish(&AllocationEvent::StatusChanged {
            allocation: after.clone(),
            from: AllocationStatus::Active,
            to: AllocationStatus::Returned,
        });
        Ok(after)
    }

    /// Finish an allocate that failed half-way.
    ///
    /// If the request is still `Approved` and one of its allocations is
    /// active, mark it allocated. Otherwise the request is returned as it is.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`] if the request does not exist
    /// - any error of `mark_allocated`
    #[instrument(skip_all, fields(request_id = %request_id))]
    pub async fn reconcile(&self, request_id: RequestId) -> Result<Request> {
        let request = self.requests.get(request_id).await?;
        if request.status != RequestStatus::Approved {
            debug!(status = %request.status, "Nothing to reconcile");
            return Ok(request);
        }

        let history = self.allocations.list_by_request(request_id).await?;
        match history.iter().find(|a| a.is_active()) {
            Some(active) => {
                info!(allocation_id = %active.id, "Reconciling half-finished allocation");
                self.requests.mark_allocated(request_id).await
            }
            None => Ok(request),
        }
    }

    // ========== Queries ==========

    /// Look an allocation up by id.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn find_by_id(&self, id: AllocationId) -> Result<Option<Allocation>> {
        debug!(allocation_id = %id, "find_by_id");
        Ok(self.allocations.find_by_id(id).await?)
    }

    /// Look an allocation up by id, treating absence as an error.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`] if the allocation does not exist
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn get(&self, id: AllocationId) -> Result<Allocation> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found(EntityKind::Allocation, id))
    }

    /// Every allocation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn list_all(&self) -> Result<Vec<Allocation>> {
        Ok(self.allocations.list_all().await?)
    }

    /// Allocation history of one request.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn list_by_request(&self, request_id: RequestId) -> Result<Vec<Allocation>> {
        Ok(self.allocations.list_by_request(request_id).await?)
    }

    /// Allocations still out.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn list_active(&self) -> Result<Vec<Allocation>> {
        Ok(self.allocations.list_active().await?)
    }

    /// Allocations that came back.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn list_returned(&self) -> Result<Vec<Allocation>> {
        Ok(self.allocations.list_returned().await?)
    }

    /// Whether the device is currently out.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `device_id` is blank or malformed
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn is_device_allocated(&self, device_id: &str) -> Result<bool> {
        let device_id = parse_device_id(device_id)?;
        Ok(self.allocations.is_device_actively_allocated(device_id).await?)
    }

    /// The device's active allocation, if any.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `device_id` is blank or malformed
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn find_active_by_device(&self, device_id: &str) -> Result<Option<Allocation>> {
        let device_id = parse_device_id(device_id)?;
        Ok(self.allocations.find_active_by_device(device_id).await?)
    }

    /// Allocations whose notes, condition, status, device or employee
    /// contains `text`, ignoring case.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `text` is blank
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn search(&self, text: &str) -> Result<Vec<Allocation>> {
        let keyword = Keyword::parse(text)?;
        debug!(keyword = keyword.as_str(), "search");
        Ok(filter_by_keyword(self.allocations.list_all().await?, &keyword))
    }

    /// Number of allocations.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.allocations.count().await?)
    }

    /// Number of active allocations.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn count_active(&self) -> Result<usize> {
        Ok(self.allocations.count_active().await?)
    }

    /// Number of returned allocations.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn count_returned(&self) -> Result<usize> {
        Ok(self.allocations.count_returned().await?)
    }

    // ========== Listeners ==========

    /// Register a listener on the allocation hub.
    pub fn subscribe(&self, listener: Arc<dyn Listener<AllocationEvent>>) -> bool {
        self.hub.subscribe(listener)
    }

    /// Remove a listener from the allocation hub.
    pub fn unsubscribe(&self, listener: &Arc<dyn Listener<AllocationEvent>>) -> bool {
        self.hub.unsubscribe(listener)
    }

    /// The hub this manager publishes on.
    #[must_use]
    pub const fn hub(&self) -> &Arc<NotificationHub<AllocationEvent>> {
        &self.hub
    }

    /// The request service this manager cascades into.
    #[must_use]
    pub const fn requests(&self) -> &Arc<RequestLifecycle> {
        &self.requests
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use asset_lifecycle_testing::{
        InMemoryAllocationRepository, InMemoryRequestRepository, stepping_clock,
    };

    struct Fixture {
        manager: AllocationManager,
        requests: InMemoryRequestRepository,
        allocations: InMemoryAllocationRepository,
    }

    fn fixture() -> Fixture {
        let requests = InMemoryRequestRepository::new();
        let allocations = InMemoryAllocationRepository::new();
        let clock: Arc<dyn Clock> = Arc::new(stepping_clock());
        let lifecycle = Arc::new(RequestLifecycle::new(
            Arc::new(requests.clone()),
            Arc::new(allocations.clone()),
            Arc::clone(&clock),
        ));
        let manager = AllocationManager::new(Arc::new(allocations.clone()), lifecycle, clock);
        Fixture {
            manager,
            requests,
            allocations,
        }
    }

    async fn approved(f: &Fixture, device: &str) -> Request {
        let lifecycle = f.manager.requests();
        let request = lifecycle.create_request(device, "E7", None).await.unwrap();
        lifecycle.approve(request.id).await.unwrap()
    }

    #[tokio::test]
    async fn allocate_pending_request_creates_nothing() {
        let f = fixture();
        let request = f
            .manager
            .requests()
            .create_request("D1", "E7", None)
            .await
            .unwrap();

        let result = f.manager.allocate(request.id).await;

        assert!(matches!(
            result,
            Err(LifecycleError::InvalidTransition {
                from: RequestStatus::Pending,
                ..
            })
        ));
        assert!(f.allocations.is_empty());
    }

    #[tokio::test]
    async fn allocate_missing_request_is_not_found() {
        let f = fixture();
        let result = f.manager.allocate(RequestId::new(5)).await;
        assert!(matches!(result, Err(LifecycleError::NotFound { .. })));
    }

    #[tokio::test]
    async fn allocate_copies_device_and_employee() {
        let f = fixture();
        let request = approved(&f, "D1").await;

        let allocation = f.manager.allocate(request.id).await.unwrap();

        assert_eq!(allocation.request_id, request.id);
        assert_eq!(allocation.device_id, request.device_id);
        assert_eq!(allocation.employee_id, request.employee_id);
        assert!(allocation.is_active());
        assert!(f.manager.is_device_allocated("D1").await.unwrap());
    }

    #[tokio::test]
    async fn failed_mark_allocated_reports_partial_allocation_and_reconciles() {
        let f = fixture();
        let request = approved(&f, "D1").await;
        f.requests.fail_writes(true);

        let result = f.manager.allocate(request.id).await;

        let Err(LifecycleError::PartialAllocation { allocation, source }) = result else {
            panic!("expected PartialAllocation, got {result:?}");
        };
        assert_eq!(allocation.request_id, request.id);
        assert!(matches!(*source, LifecycleError::Repository(_)));
        assert_eq!(f.allocations.len(), 1);
        assert_eq!(
            f.requests.snapshot(request.id).map(|r| r.status),
            Some(RequestStatus::Approved)
        );

        f.requests.fail_writes(false);
        let repaired = f.manager.reconcile(request.id).await.unwrap();
        assert_eq!(repaired.status, RequestStatus::Allocated);
    }

    #[tokio::test]
    async fn reconcile_without_allocation_leaves_request_alone() {
        let f = fixture();
        let request = approved(&f, "D1").await;

        let unchanged = f.manager.reconcile(request.id).await.unwrap();

        assert_eq!(unchanged.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn return_clears_active_flag_and_is_final() {
        let f = fixture();
        let request = approved(&f, "D1").await;
        let allocation = f.manager.allocate(request.id).await.unwrap();

        let returned = f
            .manager
            .return_device(allocation.id, ReturnCondition::Damaged, Some(" cracked hinge "))
            .await
            .unwrap();
        assert_eq!(returned.return_condition, Some(ReturnCondition::Damaged));
        assert_eq!(returned.notes.as_deref(), Some("cracked hinge"));
        assert!(!f.manager.is_device_allocated("D1").await.unwrap());

        let again = f
            .manager
            .return_device(allocation.id, ReturnCondition::Good, None)
            .await;
        assert!(matches!(again, Err(LifecycleError::Conflict(_))));
        let stored = f.manager.get(allocation.id).await.unwrap();
        assert_eq!(stored.returned_at, returned.returned_at);
        assert_eq!(stored.return_condition, Some(ReturnCondition::Damaged));
    }

    #[tokio::test]
    async fn return_missing_allocation_is_not_found() {
        let f = fixture();
        let result = f
            .manager
            .return_device(AllocationId::new(3), ReturnCondition::Good, None)
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::NotFound {
                entity: EntityKind::Allocation,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn search_and_counters() {
        let f = fixture();
        let first = approved(&f, "D1").await;
        let second = approved(&f, "D2").await;
        let a = f.manager.allocate(first.id).await.unwrap();
        f.manager.allocate(second.id).await.unwrap();
        f.manager
            .return_device(a.id, ReturnCondition::Scratched, Some("lid dent"))
            .await
            .unwrap();

        assert_eq!(f.manager.count().await.unwrap(), 2);
        assert_eq!(f.manager.count_active().await.unwrap(), 1);
        assert_eq!(f.manager.count_returned().await.unwrap(), 1);
        assert_eq!(f.manager.search("DENT").await.unwrap().len(), 1);
        assert_eq!(f.manager.search("active").await.unwrap().len(), 1);
        assert_eq!(
            f.manager
                .find_active_by_device("D2")
                .await
                .unwrap()
                .map(|a| a.request_id),
            Some(second.id)
        );
    }
}
