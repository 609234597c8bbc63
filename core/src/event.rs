//! Lifecycle events delivered to listeners.
//!
//! Events are immutable values describing a change that has already been
//! committed to the repository. They are published after the write, never
//! before, so a listener can rely on the state it is told about.
//!
//! # Event Naming Convention
//!
//! [`LifecycleEvent::event_type`] returns a stable identifier with a version
//! suffix, e.g. `"RequestApproved.v1"`. Audit sinks key on this string, so a
//! breaking payload change gets a new suffix rather than a silent edit.
//!
//! # Example
//!
//! ```
//! use asset_lifecycle_core::event::{LifecycleEvent, RequestEvent};
//! use asset_lifecycle_core::ids::RequestId;
//!
//! let event = RequestEvent::Deleted(RequestId::new(3));
//! assert_eq!(event.event_type(), "RequestDeleted.v1");
//! assert_eq!(event.entity_id(), 3);
//! ```

use crate::ids::{AllocationId, RequestId};
use crate::status::{AllocationStatus, RequestStatus};
use crate::types::{Allocation, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),
}

/// Common behaviour of request and allocation events.
///
/// Events must be `Clone + Send + Sync + 'static` so a hub can hand the same
/// value to listeners on any thread.
pub trait LifecycleEvent: Clone + Send + Sync + 'static {
    /// Stable, versioned type identifier.
    fn event_type(&self) -> &'static str;

    /// Raw id of the request or allocation the event is about.
    fn entity_id(&self) -> u64;

    /// Render the event as JSON for audit sinks.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if serialization fails.
    fn to_json(&self) -> Result<serde_json::Value, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_value(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }
}

/// Events published by the request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    /// A request was created
    Added(Request),
    /// A request was removed
    Deleted(RequestId),
    /// Non-status fields changed
    Updated {
        /// Record before the change
        before: Request,
        /// Record after the change
        after: Request,
    },
    /// Generic status change, published for every transition
    StatusChanged {
        /// Record after the change
        request: Request,
        /// Previous status
        from: RequestStatus,
        /// New status
        to: RequestStatus,
    },
    /// Request moved to APPROVED
    Approved(Request),
    /// Request moved to REJECTED
    Rejected(Request),
    /// Request moved to ALLOCATED
    Allocated(Request),
    /// Request moved to CANCELLED
    Cancelled(Request),
}

impl RequestEvent {
    /// The terminal/specific event for a status, if there is one.
    ///
    /// Every status except `Pending` has a dedicated event that follows
    /// the generic [`RequestEvent::StatusChanged`].
    #[must_use]
    pub fn for_status(request: Request) -> Option<Self> {
        match request.status {
            RequestStatus::Pending => None,
            RequestStatus::Approved => Some(Self::Approved(request)),
            RequestStatus::Rejected => Some(Self::Rejected(request)),
            RequestStatus::Allocated => Some(Self::Allocated(request)),
            RequestStatus::Cancelled => Some(Self::Cancelled(request)),
        }
    }

    /// The request snapshot carried by the event, if any.
    #[must_use]
    pub const fn request(&self) -> Option<&Request> {
        match self {
            Self::Added(request)
            | Self::Approved(request)
            | Self::Rejected(request)
            | Self::Allocated(request)
            | Self::Cancelled(request)
            | Self::StatusChanged { request, .. }
            | Self::Updated { after: request, .. } => Some(request),
            Self::Deleted(_) => None,
        }
    }
}

impl LifecycleEvent for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => "RequestAdded.v1",
            Self::Deleted(_) => "RequestDeleted.v1",
            Self::Updated { .. } => "RequestUpdated.v1",
            Self::StatusChanged { .. } => "RequestStatusChanged.v1",
            Self::Approved(_) => "RequestApproved.v1",
            Self::Rejected(_) => "RequestRejected.v1",
            Self::Allocated(_) => "RequestAllocated.v1",
            Self::Cancelled(_) => "RequestCancelled.v1",
        }
    }

    fn entity_id(&self) -> u64 {
        match self {
            Self::Deleted(id) => id.value(),
            other => other.request().map_or(0, |r| r.id.value()),
        }
    }
}

/// Events published by the allocation manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationEvent {
    /// An allocation was created
    Added(Allocation),
    /// An allocation was removed
    Deleted(AllocationId),
    /// Return information was recorded
    Updated {
        /// Record before the change
        before: Allocation,
        /// Record after the change
        after: Allocation,
    },
    /// Active → Returned
    StatusChanged {
        /// Record after the change
        allocation: Allocation,
        /// Previous status
        from: AllocationStatus,
        /// New status
        to: AllocationStatus,
    },
}

impl AllocationEvent {
    /// The allocation snapshot carried by the event, if any.
    #[must_use]
    pub const fn allocation(&self) -> Option<&Allocation> {
        match self {
            Self::Added(allocation)
            | Self::Updated {
                after: allocation, ..
            }
            | Self::StatusChanged { allocation, .. } => Some(allocation),
            Self::Deleted(_) => None,
        }
    }
}

impl LifecycleEvent for AllocationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => "AllocationAdded.v1",
            Self::Deleted(_) => "AllocationDeleted.v1",
            Self::Updated { .. } => "AllocationUpdated.v1",
            Self::StatusChanged { .. } => "AllocationStatusChanged.v1",
        }
    }

    fn entity_id(&self) -> u64 {
        match self {
            Self::Deleted(id) => id.value(),
            other => other.allocation().map_or(0, |a| a.id.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::ids::{DeviceId, EmployeeId};
    use crate::types::NewRequest;
    use chrono::Utc;

    fn request(status: RequestStatus) -> Request {
        let mut request = NewRequest {
            device_id: DeviceId::new("D1"),
            employee_id: EmployeeId::new("E7"),
            reason: None,
            created_at: Utc::now(),
        }
        .into_request(RequestId::new(9));
        request.status = status;
        request
    }

    #[test]
    fn every_non_initial_status_has_a_specific_event() {
        assert!(RequestEvent::for_status(request(RequestStatus::Pending)).is_none());
        assert!(matches!(
            RequestEvent::for_status(request(RequestStatus::Approved)),
            Some(RequestEvent::Approved(_))
        ));
        assert!(matches!(
            RequestEvent::for_status(request(RequestStatus::Rejected)),
            Some(RequestEvent::Rejected(_))
        ));
        assert!(matches!(
            RequestEvent::for_status(request(RequestStatus::Allocated)),
            Some(RequestEvent::Allocated(_))
        ));
        assert!(matches!(
            RequestEvent::for_status(request(RequestStatus::Cancelled)),
            Some(RequestEvent::Cancelled(_))
        ));
    }

    #[test]
    fn event_type_and_entity_id() {
        let event = RequestEvent::StatusChanged {
            request: request(RequestStatus::Approved),
            from: RequestStatus::Pending,
            to: RequestStatus::Approved,
        };
        assert_eq!(event.event_type(), "RequestStatusChanged.v1");
        assert_eq!(event.entity_id(), 9);
        assert_eq!(
            AllocationEvent::Deleted(AllocationId::new(5)).entity_id(),
            5
        );
    }

    #[test]
    fn to_json_includes_variant_and_status_code() {
        let event = RequestEvent::Approved(request(RequestStatus::Approved));
        let json = event.to_json().expect("serialization should succeed");
        assert_eq!(json["Approved"]["status"], "APPROVED");
        assert_eq!(json["Approved"]["device_id"], "D1");
    }
}
