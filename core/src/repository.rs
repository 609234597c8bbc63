//! Persistence and device contracts consumed by the lifecycle services.
//!
//! The lifecycle subsystem does not own storage. It reaches Request and
//! Allocation records, and the device status field, only through the traits
//! in this module.
//!
//! # Implementations
//!
//! - `InMemoryRequestRepository`, `InMemoryAllocationRepository`,
//!   `InMemoryDeviceRegistry` (in `asset-lifecycle-testing`): fast,
//!   deterministic fakes
//! - SQL-backed implementations live with the application's storage layer
//!
//! # Atomicity
//!
//! Each method is expected to be a single atomic read or write. Nothing here
//! spans two records, so `allocate` (create allocation, then update request)
//! is not transactional. Closing the concurrent-allocate race belongs to the
//! storage layer, e.g. a unique partial index on
//! `allocations(device_id) WHERE returned_at IS NULL`.
//!
//! # Dyn Compatibility
//!
//! These traits return explicit `Pin<Box<dyn Future>>` instead of using
//! `async fn` so that services can hold them as `Arc<dyn RequestRepository>`.

use crate::error::RepositoryError;
use crate::ids::{AllocationId, DeviceId, EmployeeId, RequestId};
use crate::status::{DeviceStatus, RequestStatus, ReturnCondition};
use crate::types::{Allocation, NewAllocation, NewRequest, Request};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every repository method.
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Storage for [`Request`] records.
///
/// # Errors
///
/// Every method returns [`RepositoryError`] when the backend fails. A
/// missing record is not an error: lookups return `None`, writes return
/// `false`.
pub trait RequestRepository: Send + Sync {
    /// Insert a new request, assigning its id. The stored record starts in
    /// `Pending`.
    fn create(&self, request: NewRequest) -> RepoFuture<'_, Request>;

    /// Overwrite a stored request. Returns `false` if no record has that id.
    fn update(&self, request: Request) -> RepoFuture<'_, bool>;

    /// Remove a request. Returns `false` if no record has that id.
    fn delete(&self, id: RequestId) -> RepoFuture<'_, bool>;

    /// Look a request up by id.
    fn find_by_id(&self, id: RequestId) -> RepoFuture<'_, Option<Request>>;

    /// Every request, oldest first.
    fn list_all(&self) -> RepoFuture<'_, Vec<Request>>;

    /// Requests for one device, oldest first.
    fn list_by_device(&self, device_id: DeviceId) -> RepoFuture<'_, Vec<Request>>;

    /// Requests made by one employee, oldest first.
    fn list_by_employee(&self, employee_id: EmployeeId) -> RepoFuture<'_, Vec<Request>>;

    /// Requests currently in `status`, oldest first.
    fn list_by_status(&self, status: RequestStatus) -> RepoFuture<'_, Vec<Request>>;

    /// Whether a request with this id exists.
    fn exists(&self, id: RequestId) -> RepoFuture<'_, bool>;

    /// Number of stored requests.
    fn count(&self) -> RepoFuture<'_, usize>;

    /// Number of requests currently in `status`.
    fn count_by_status(&self, status: RequestStatus) -> RepoFuture<'_, usize>;
}

/// Storage for [`Allocation`] records.
///
/// # Errors
///
/// Same conventions as [`RequestRepository`].
pub trait AllocationRepository: Send + Sync {
    /// Insert a new, active allocation, assigning its id.
    fn create(&self, allocation: NewAllocation) -> RepoFuture<'_, Allocation>;

    /// Store the return information of an allocation.
    ///
    /// Only writes a record that is still active (`returned_at IS NULL`).
    /// Returns `false` if no record has that id or it was already returned,
    /// so two concurrent returns cannot both close the same allocation.
    fn update_return_info(
        &self,
        id: AllocationId,
        returned_at: DateTime<Utc>,
        condition: ReturnCondition,
        notes: Option<String>,
    ) -> RepoFuture<'_, bool>;

    /// Look an allocation up by id.
    fn find_by_id(&self, id: AllocationId) -> RepoFuture<'_, Option<Allocation>>;

    /// Every allocation, oldest first.
    fn list_all(&self) -> RepoFuture<'_, Vec<Allocation>>;

    /// Allocation history of one request, oldest first.
    fn list_by_request(&self, request_id: RequestId) -> RepoFuture<'_, Vec<Allocation>>;

    /// Allocations with no return recorded.
    fn list_active(&self) -> RepoFuture<'_, Vec<Allocation>>;

    /// Allocations whose return has been recorded.
    fn list_returned(&self) -> RepoFuture<'_, Vec<Allocation>>;

    /// Whether the device has an active allocation.
    fn is_device_actively_allocated(&self, device_id: DeviceId) -> RepoFuture<'_, bool>;

    /// The device's active allocation, if any.
    fn find_active_by_device(&self, device_id: DeviceId) -> RepoFuture<'_, Option<Allocation>>;

    /// Number of stored allocations.
    fn count(&self) -> RepoFuture<'_, usize>;

    /// Number of active allocations.
    fn count_active(&self) -> RepoFuture<'_, usize>;

    /// Number of returned allocations.
    fn count_returned(&self) -> RepoFuture<'_, usize>;
}

/// The device inventory's status field.
///
/// Owned outside the lifecycle subsystem; only the orchestrator layer writes
/// through it.
pub trait DeviceRegistry: Send + Sync {
    /// Current status of a device, `None` if the registry does not know it.
    fn status(&self, device_id: DeviceId) -> RepoFuture<'_, Option<DeviceStatus>>;

    /// Set the status of a device. Returns `false` if the registry does not
    /// know it.
    fn set_status(&self, device_id: DeviceId, status: DeviceStatus) -> RepoFuture<'_, bool>;
}
