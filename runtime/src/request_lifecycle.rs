//! The Request state machine service.
//!
//! Every mutating operation follows the same three steps:
//!
//! 1. **Validate** input and the transition against
//!    [`RequestStatus::allowed_targets`]
//! 2. **Persist** through the [`RequestRepository`]
//! 3. **Publish** on the request hub
//!
//! Listeners therefore only ever hear about committed changes. A refused
//! operation writes nothing and publishes nothing.

use crate::hub::NotificationHub;
use crate::metrics::record_conflict;
use asset_lifecycle_core::environment::Clock;
use asset_lifecycle_core::error::{EntityKind, LifecycleError, Result};
use asset_lifecycle_core::event::RequestEvent;
use asset_lifecycle_core::ids::{DeviceId, EmployeeId, RequestId};
use asset_lifecycle_core::listener::Listener;
use asset_lifecycle_core::repository::{AllocationRepository, RequestRepository};
use asset_lifecycle_core::search::{Keyword, filter_by_keyword};
use asset_lifecycle_core::status::RequestStatus;
use asset_lifecycle_core::types::{
    DEFAULT_MAX_TEXT_LENGTH, NewRequest, Request, normalize_text, require_text,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Parse a device id at the service boundary.
pub(crate) fn parse_device_id(raw: &str) -> Result<DeviceId> {
    DeviceId::parse(raw).map_err(|e| LifecycleError::validation("device_id", e.to_string()))
}

/// Parse an employee id at the service boundary.
pub(crate) fn parse_employee_id(raw: &str) -> Result<EmployeeId> {
    EmployeeId::parse(raw).map_err(|e| LifecycleError::validation("employee_id", e.to_string()))
}

/// Owns the Request state machine.
///
/// # Example
///
/// ```
/// use asset_lifecycle_runtime::RequestLifecycle;
/// use asset_lifecycle_core::environment::SystemClock;
/// use asset_lifecycle_core::RequestStatus;
/// use asset_lifecycle_testing::{InMemoryAllocationRepository, InMemoryRequestRepository};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let lifecycle = RequestLifecycle::new(
///     Arc::new(InMemoryRequestRepository::new()),
///     Arc::new(InMemoryAllocationRepository::new()),
///     Arc::new(SystemClock),
/// );
///
/// let request = lifecycle.create_request("D1", "E7", Some("broken laptop")).await?;
/// let approved = lifecycle.approve(request.id).await?;
/// assert_eq!(approved.status, RequestStatus::Approved);
/// # Ok(())
/// # }
/// ```
pub struct RequestLifecycle {
    requests: Arc<dyn RequestRepository>,
    allocations: Arc<dyn AllocationRepository>,
    hub: Arc<NotificationHub<RequestEvent>>,
    clock: Arc<dyn Clock>,
    max_text_length: usize,
}

impl RequestLifecycle {
    /// Create the service with a fresh, empty hub.
    ///
    /// `allocations` is only read, to refuse deleting a request that still
    /// holds a device.
    #[must_use]
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        allocations: Arc<dyn AllocationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_hub(requests, allocations, clock, Arc::new(NotificationHub::new()))
    }

    /// Create the service publishing on an existing hub.
    #[must_use]
    pub fn with_hub(
        requests: Arc<dyn RequestRepository>,
        allocations: Arc<dyn AllocationRepository>,
        clock: Arc<dyn Clock>,
        hub: Arc<NotificationHub<RequestEvent>>,
    ) -> Self {
        Self {
            requests,
            allocations,
            hub,
            clock,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }

    /// Cap free-text `reason` at `max_text_length` characters.
    #[must_use]
    pub const fn with_max_text_length(mut self, max_text_length: usize) -> Self {
        self.max_text_length = max_text_length;
        self
    }

    // ========== Commands ==========

    /// Submit a new request in `Pending`.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if an id is blank or malformed, or
    ///   `reason` is too long
    /// - [`LifecycleError::Repository`] if the write fails
    #[instrument(skip(self, reason))]
    pub async fn create_request(
        &self,
        device_id: &str,
        employee_id: &str,
        reason: Option<&str>,
    ) -> Result<Request> {
        let device_id = parse_device_id(device_id)?;
        let employee_id = parse_employee_id(employee_id)?;
        let reason = normalize_text("reason", reason, self.max_text_length)?;

        let request = self
            .requests
            .create(NewRequest {
                device_id,
                employee_id,
                reason,
                created_at: self.clock.now(),
            })
            .await?;

        info!(
            request_id = %request.id,
            device_id = %request.device_id,
            employee_id = %request.employee_id,
            "Request created"
        );
        self.hub.publish(&RequestEvent::Added(request.clone()));
        Ok(request)
    }

    /// `Pending → Approved`.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`] if the request does not exist
    /// - [`LifecycleError::InvalidTransition`] unless it is `Pending`
    /// - [`LifecycleError::Repository`] if storage fails
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn approve(&self, id: RequestId) -> Result<Request> {
        self.transition(id, RequestStatus::Approved, None).await
    }

    /// `Pending → Rejected`, recording why.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `reason` is blank or too long
    /// - otherwise as [`approve`](Self::approve)
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn reject(&self, id: RequestId, reason: &str) -> Result<Request> {
        let reason = require_text("reason", reason, self.max_text_length)?;
        self.transition(id, RequestStatus::Rejected, Some(reason))
            .await
    }

    /// `Pending | Approved → Cancelled`, recording why.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `reason` is blank or too long
    /// - [`LifecycleError::InvalidTransition`] from a terminal status
    /// - [`LifecycleError::NotFound`] / [`LifecycleError::Repository`] as
    ///   [`approve`](Self::approve)
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn cancel(&self, id: RequestId, reason: &str) -> Result<Request> {
        let reason = require_text("reason", reason, self.max_text_length)?;
        self.transition(id, RequestStatus::Cancelled, Some(reason))
            .await
    }

    /// `Approved → Allocated`.
    ///
    /// Normally called by the allocation manager right after it has created
    /// the allocation.
    ///
    /// # Errors
    ///
    /// As [`approve`](Self::approve), with `Approved` as the only valid
    /// source status.
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn mark_allocated(&self, id: RequestId) -> Result<Request> {
        self.transition(id, RequestStatus::Allocated, None).await
    }

    /// Rewrite the free-text reason of a `Pending` request.
    ///
    /// Blank `reason` clears it. Publishes [`RequestEvent::Updated`].
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `reason` is too long
    /// - [`LifecycleError::NotFound`] if the request does not exist
    /// - [`LifecycleError::Conflict`] unless the request is `Pending`
    /// - [`LifecycleError::Repository`] if storage fails
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn update_details(&self, id: RequestId, reason: Option<&str>) -> Result<Request> {
        let reason = normalize_text("reason", reason, self.max_text_length)?;
        let before = self.get(id).await?;
        if before.status != RequestStatus::Pending {
            warn!(status = %before.status, "Refusing to edit a request that left Pending");
            record_conflict("request_not_pending");
            return Err(LifecycleError::conflict(format!(
                "Request {id} is {} and can no longer be edited",
                before.status
            )));
        }

        let mut after = before.clone();
        after.reason = reason;
        after.touch(self.clock.now());
        self.store(&after).await?;

        info!(request_id = %id, "Request details updated");
        self.hub.publish(&RequestEvent::Updated { before, after: after.clone() });
        Ok(after)
    }

    /// Remove a request that holds no device.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`] if the request does not exist
    /// - [`LifecycleError::Conflict`] if it has an active allocation
    /// - [`LifecycleError::Repository`] if storage fails
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn delete(&self, id: RequestId) -> Result<()> {
        if !self.requests.exists(id).await? {
            return Err(LifecycleError::not_found(EntityKind::Request, id));
        }
        let history = self.allocations.list_by_request(id).await?;
        if let Some(active) = history.iter().find(|a| a.is_active()) {
            warn!(allocation_id = %active.id, "Refusing to delete a request with an active allocation");
            record_conflict("request_referenced");
            return Err(LifecycleError::conflict(format!(
                "Request {id} still has active allocation {}",
                active.id
            )));
        }

        if !self.requests.delete(id).await? {
            return Err(LifecycleError::not_found(EntityKind::Request, id));
        }

        info!(request_id = %id, "Request deleted");
        self.hub.publish(&RequestEvent::Deleted(id));
        Ok(())
    }

    // ========== Queries ==========

    /// Look a request up by id.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn find_by_id(&self, id: RequestId) -> Result<Option<Request>> {
        debug!(request_id = %id, "find_by_id");
        Ok(self.requests.find_by_id(id).await?)
    }

    /// Look a request up by id, treating absence as an error.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NotFound`] if the request does not exist
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn get(&self, id: RequestId) -> Result<Request> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found(EntityKind::Request, id))
    }

    /// Every request, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn list_all(&self) -> Result<Vec<Request>> {
        debug!("list_all");
        Ok(self.requests.list_all().await?)
    }

    /// Requests for one device.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `device_id` is blank or malformed
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn list_by_device(&self, device_id: &str) -> Result<Vec<Request>> {
        let device_id = parse_device_id(device_id)?;
        debug!(device_id = %device_id, "list_by_device");
        Ok(self.requests.list_by_device(device_id).await?)
    }

    /// Requests made by one employee.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `employee_id` is blank or malformed
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn list_by_employee(&self, employee_id: &str) -> Result<Vec<Request>> {
        let employee_id = parse_employee_id(employee_id)?;
        debug!(employee_id = %employee_id, "list_by_employee");
        Ok(self.requests.list_by_employee(employee_id).await?)
    }

    /// Requests currently in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<Request>> {
        debug!(status = %status, "list_by_status");
        Ok(self.requests.list_by_status(status).await?)
    }

    /// Requests whose reason, status, device or employee contains `text`,
    /// ignoring case.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `text` is blank
    /// - [`LifecycleError::Repository`] if storage fails
    pub async fn search(&self, text: &str) -> Result<Vec<Request>> {
        let keyword = Keyword::parse(text)?;
        debug!(keyword = keyword.as_str(), "search");
        Ok(filter_by_keyword(self.requests.list_all().await?, &keyword))
    }

    /// Number of requests.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.requests.count().await?)
    }

    /// Number of requests currently in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn count_by_status(&self, status: RequestStatus) -> Result<usize> {
        Ok(self.requests.count_by_status(status).await?)
    }

    /// Whether a request with this id exists.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] if storage fails.
    pub async fn exists(&self, id: RequestId) -> Result<bool> {
        Ok(self.requests.exists(id).await?)
    }

    // ========== Listeners ==========

    /// Register a listener on the request hub.
    pub fn subscribe(&self, listener: Arc<dyn Listener<RequestEvent>>) -> bool {
        self.hub.subscribe(listener)
    }

    /// Remove a listener from the request hub.
    pub fn unsubscribe(&self, listener: &Arc<dyn Listener<RequestEvent>>) -> bool {
        self.hub.unsubscribe(listener)
    }

    /// The hub this service publishes on.
    #[must_use]
    pub const fn hub(&self) -> &Arc<NotificationHub<RequestEvent>> {
        &self.hub
    }

    // ========== Internals ==========

    async fn transition(
        &self,
        id: RequestId,
        to: RequestStatus,
        reason: Option<String>,
    ) -> Result<Request> {
        let mut request = self.get(id).await?;

        let from = match request.transition_to(to, self.clock.now()) {
            Ok(from) => from,
            Err(error) => {
                warn!(
                    request_id = %id,
                    from = request.status.as_str(),
                    to = to.as_str(),
                    "Transition refused"
                );
                return Err(error);
            }
        };
        if let Some(reason) = reason {
            request.reason = Some(reason);
        }

        self.store(&request).await?;

        info!(
            request_id = %id,
            device_id = %request.device_id,
            from = from.as_str(),
            to = to.as_str(),
            "Request transitioned"
        );
        self.hub.publish(&RequestEvent::StatusChanged {
            request: request.clone(),
            from,
            to,
        });
        if let Some(event) = RequestEvent::for_status(request.clone()) {
            self.hub.publish(&event);
        }
        Ok(request)
    }

    /// Write back; a vanished row is reported as `NotFound`.
    async fn store(&self, request: &Request) -> Result<()> {
        if self.requests.update(request.clone()).await? {
            Ok(())
        } else {
            Err(LifecycleError::not_found(EntityKind::Request, request.id))
        }
    }
}
