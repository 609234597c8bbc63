//! In-memory lifecycle storage for tests and demos
//!
//! Provides fast, deterministic implementations of the storage contracts:
//! - [`InMemoryRequestRepository`]: `BTreeMap`-backed request table
//! - [`InMemoryAllocationRepository`]: allocation table with an optional
//!   unique-active-device check and a race hook
//! - [`InMemoryDeviceRegistry`]: device status map
//!
//! All three share the same fault switches: `set_unavailable` fails every
//! call with [`RepositoryError::Unavailable`], `fail_writes` fails only
//! writes with [`RepositoryError::Storage`].

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use asset_lifecycle_core::error::RepositoryError;
use asset_lifecycle_core::ids::{AllocationId, DeviceId, EmployeeId, RequestId};
use asset_lifecycle_core::repository::{
    AllocationRepository, DeviceRegistry, RepoFuture, RequestRepository,
};
use asset_lifecycle_core::status::{DeviceStatus, RequestStatus, ReturnCondition};
use asset_lifecycle_core::types::{Allocation, NewAllocation, NewRequest, Request};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Shared fault switches.
#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
}

impl Faults {
    fn check_read(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "in-memory backend switched off".to_string(),
            ));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), RepositoryError> {
        self.check_read()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage("injected write failure".to_string()));
        }
        Ok(())
    }
}

/// Rows plus the id sequence, guarded together.
#[derive(Debug)]
struct Table<K, V> {
    last_id: u64,
    rows: BTreeMap<K, V>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            last_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<K, V: Clone> Table<K, V> {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn select(&self, predicate: impl Fn(&V) -> bool) -> Vec<V> {
        self.rows.values().filter(|&v| predicate(v)).cloned().collect()
    }

    fn count(&self, predicate: impl Fn(&V) -> bool) -> usize {
        self.rows.values().filter(|&v| predicate(v)).count()
    }
}

/// In-memory request repository for fast, deterministic testing.
///
/// Ids start at 1 and increase per instance. Listings come back in id
/// order, which is creation order.
///
/// # Example
///
/// ```
/// use asset_lifecycle_testing::{InMemoryRequestRepository, test_epoch};
/// use asset_lifecycle_core::repository::RequestRepository;
/// use asset_lifecycle_core::{DeviceId, EmployeeId, NewRequest, RequestStatus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repository = InMemoryRequestRepository::new();
/// let request = repository
///     .create(NewRequest {
///         device_id: DeviceId::new("D1"),
///         employee_id: EmployeeId::new("E7"),
///         reason: None,
///         created_at: test_epoch(),
///     })
///     .await?;
///
/// assert_eq!(request.id.value(), 1);
/// assert_eq!(request.status, RequestStatus::Pending);
/// assert_eq!(repository.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRequestRepository {
    table: Arc<RwLock<Table<RequestId, Request>>>,
    faults: Arc<Faults>,
}

impl InMemoryRequestRepository {
    /// Create a new empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with [`RepositoryError::Unavailable`] while `true`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail `create`, `update` and `delete` with [`RepositoryError::Storage`]
    /// while `true`
    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().unwrap().rows.len()
    }

    /// Check if the repository is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct read, bypassing fault injection
    #[must_use]
    pub fn snapshot(&self, id: RequestId) -> Option<Request> {
        self.table.read().unwrap().rows.get(&id).cloned()
    }

    /// Clear all rows and restart the id sequence
    pub fn clear(&self) {
        *self.table.write().unwrap() = Table::default();
    }
}

impl RequestRepository for InMemoryRequestRepository {
    fn create(&self, request: NewRequest) -> RepoFuture<'_, Request> {
        Box::pin(async move {
            self.faults.check_write()?;
            let mut table = self.table.write().unwrap();
            let id = RequestId::new(table.next_id());
            let stored = request.into_request(id);
            table.rows.insert(id, stored.clone());
            Ok(stored)
        })
    }

    fn update(&self, request: Request) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            self.faults.check_write()?;
            let mut table = self.table.write().unwrap();
            match table.rows.get_mut(&request.id) {
                Some(row) => {
                    *row = request;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn delete(&self, id: RequestId) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            self.faults.check_write()?;
            Ok(self.table.write().unwrap().rows.remove(&id).is_some())
        })
    }

    fn find_by_id(&self, id: RequestId) -> RepoFuture<'_, Option<Request>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().rows.get(&id).cloned())
        })
    }

    fn list_all(&self) -> RepoFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().select(|_| true))
        })
    }

    fn list_by_device(&self, device_id: DeviceId) -> RepoFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self
                .table
                .read()
                .unwrap()
                .select(|r| r.device_id == device_id))
        })
    }

    fn list_by_employee(&self, employee_id: EmployeeId) -> RepoFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self
                .table
                .read()
                .unwrap()
                .select(|r| r.employee_id == employee_id))
        })
    }

    fn list_by_status(&self, status: RequestStatus) -> RepoFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().select(|r| r.status == status))
        })
    }

    fn exists(&self, id: RequestId) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().rows.contains_key(&id))
        })
    }

    fn count(&self) -> RepoFuture<'_, usize> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().rows.len())
        })
    }

    fn count_by_status(&self, status: RequestStatus) -> RepoFuture<'_, usize> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().count(|r| r.status == status))
        })
    }
}

/// In-memory allocation repository.
///
/// By default it behaves like a table without constraints, so two active
/// allocations for one device can be stored. [`with_unique_active_device`]
/// turns on the check a real schema would enforce with a unique partial
/// index.
///
/// [`yield_during_active_check`] makes `is_device_actively_allocated` yield
/// to the scheduler after reading its answer. Two `allocate` calls joined on
/// one task then both observe "not allocated" before either writes, which
/// reproduces the check-then-act race deterministically.
/// [`yield_before_return_write`] does the same for two concurrent returns:
/// both read the allocation as active before either writes.
///
/// `update_return_info` only writes rows that are still active, the guard a
/// real schema expresses as `WHERE returned_at IS NULL`.
///
/// [`with_unique_active_device`]: Self::with_unique_active_device
/// [`yield_during_active_check`]: Self::yield_during_active_check
/// [`yield_before_return_write`]: Self::yield_before_return_write
#[derive(Clone, Debug, Default)]
pub struct InMemoryAllocationRepository {
    table: Arc<RwLock<Table<AllocationId, Allocation>>>,
    faults: Arc<Faults>,
    unique_active_device: bool,
    yield_on_check: Arc<AtomicBool>,
    yield_on_return: Arc<AtomicBool>,
}

impl InMemoryAllocationRepository {
    /// Create a new empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `create` when the device already has an active allocation
    #[must_use]
    pub const fn with_unique_active_device(mut self) -> Self {
        self.unique_active_device = true;
        self
    }

    /// Yield inside `is_device_actively_allocated` while `true`
    pub fn yield_during_active_check(&self, enabled: bool) {
        self.yield_on_check.store(enabled, Ordering::SeqCst);
    }

    /// Yield at the start of `update_return_info` while `true`
    pub fn yield_before_return_write(&self, enabled: bool) {
        self.yield_on_return.store(enabled, Ordering::SeqCst);
    }

    /// Fail every call with [`RepositoryError::Unavailable`] while `true`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail `create` and `update_return_info` while `true`
    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored allocations
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().unwrap().rows.len()
    }

    /// Check if the repository is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active allocations for `device_id`, bypassing fault injection
    #[must_use]
    pub fn active_for_device(&self, device_id: &DeviceId) -> Vec<Allocation> {
        self.table
            .read()
            .unwrap()
            .select(|a| a.is_active() && &a.device_id == device_id)
    }

    /// Clear all rows and restart the id sequence
    pub fn clear(&self) {
        *self.table.write().unwrap() = Table::default();
    }
}

impl AllocationRepository for InMemoryAllocationRepository {
    fn create(&self, allocation: NewAllocation) -> RepoFuture<'_, Allocation> {
        Box::pin(async move {
            self.faults.check_write()?;
            let mut table = self.table.write().unwrap();
            if self.unique_active_device
                && table
                    .rows
                    .values()
                    .any(|a| a.is_active() && a.device_id == allocation.device_id)
            {
                return Err(RepositoryError::Storage(format!(
                    "unique violation: device {} already has an active allocation",
                    allocation.device_id
                )));
            }
            let id = AllocationId::new(table.next_id());
            let stored = allocation.into_allocation(id);
            table.rows.insert(id, stored.clone());
            Ok(stored)
        })
    }

    fn update_return_info(
        &self,
        id: AllocationId,
        returned_at: DateTime<Utc>,
        condition: ReturnCondition,
        notes: Option<String>,
    ) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            self.faults.check_write()?;
            if self.yield_on_return.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            let mut table = self.table.write().unwrap();
            let Some(row) = table.rows.get_mut(&id).filter(|row| row.is_active()) else {
                return Ok(false);
            };
            row.returned_at = Some(returned_at);
            row.return_condition = Some(condition);
            row.notes = notes;
            Ok(true)
        })
    }

    fn find_by_id(&self, id: AllocationId) -> RepoFuture<'_, Option<Allocation>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().rows.get(&id).cloned())
        })
    }

    fn list_all(&self) -> RepoFuture<'_, Vec<Allocation>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().select(|_| true))
        })
    }

    fn list_by_request(&self, request_id: RequestId) -> RepoFuture<'_, Vec<Allocation>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self
                .table
                .read()
                .unwrap()
                .select(|a| a.request_id == request_id))
        })
    }

    fn list_active(&self) -> RepoFuture<'_, Vec<Allocation>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().select(Allocation::is_active))
        })
    }

    fn list_returned(&self) -> RepoFuture<'_, Vec<Allocation>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().select(|a| !a.is_active()))
        })
    }

    fn is_device_actively_allocated(&self, device_id: DeviceId) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            self.faults.check_read()?;
            let active = {
                let table = self.table.read().unwrap();
                table
                    .rows
                    .values()
                    .any(|a| a.is_active() && a.device_id == device_id)
            };
            if self.yield_on_check.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            Ok(active)
        })
    }

    fn find_active_by_device(&self, device_id: DeviceId) -> RepoFuture<'_, Option<Allocation>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self
                .table
                .read()
                .unwrap()
                .rows
                .values()
                .find(|a| a.is_active() && a.device_id == device_id)
                .cloned())
        })
    }

    fn count(&self) -> RepoFuture<'_, usize> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().rows.len())
        })
    }

    fn count_active(&self) -> RepoFuture<'_, usize> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().count(Allocation::is_active))
        })
    }

    fn count_returned(&self) -> RepoFuture<'_, usize> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.table.read().unwrap().count(|a| !a.is_active()))
        })
    }
}

/// In-memory device status registry.
///
/// # Example
///
/// ```
/// use asset_lifecycle_testing::InMemoryDeviceRegistry;
/// use asset_lifecycle_core::repository::DeviceRegistry;
/// use asset_lifecycle_core::{DeviceId, DeviceStatus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = InMemoryDeviceRegistry::new().with_device("D1", DeviceStatus::InStock);
///
/// assert!(registry.set_status(DeviceId::new("D1"), DeviceStatus::InUse).await?);
/// assert!(!registry.set_status(DeviceId::new("D9"), DeviceStatus::InUse).await?);
/// assert_eq!(registry.status_of("D1"), Some(DeviceStatus::InUse));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: Arc<RwLock<HashMap<DeviceId, DeviceStatus>>>,
    faults: Arc<Faults>,
}

impl InMemoryDeviceRegistry {
    /// Create a registry that knows no devices
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device (builder form of [`insert`](Self::insert))
    #[must_use]
    pub fn with_device(self, device_id: &str, status: DeviceStatus) -> Self {
        self.insert(device_id, status);
        self
    }

    /// Register or overwrite a device
    pub fn insert(&self, device_id: &str, status: DeviceStatus) {
        self.devices
            .write()
            .unwrap()
            .insert(DeviceId::new(device_id), status);
    }

    /// Direct read, bypassing fault injection
    #[must_use]
    pub fn status_of(&self, device_id: &str) -> Option<DeviceStatus> {
        self.devices
            .read()
            .unwrap()
            .get(&DeviceId::new(device_id))
            .copied()
    }

    /// Fail every call with [`RepositoryError::Unavailable`] while `true`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail `set_status` while `true`
    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl DeviceRegistry for InMemoryDeviceRegistry {
    fn status(&self, device_id: DeviceId) -> RepoFuture<'_, Option<DeviceStatus>> {
        Box::pin(async move {
            self.faults.check_read()?;
            Ok(self.devices.read().unwrap().get(&device_id).copied())
        })
    }

    fn set_status(&self, device_id: DeviceId, status: DeviceStatus) -> RepoFuture<'_, bool> {
        Box::pin(async move {
            self.faults.check_write()?;
            let mut devices = self.devices.write().unwrap();
            match devices.get_mut(&device_id) {
                Some(current) => {
                    *current = status;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}
