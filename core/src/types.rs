//! Request and allocation records.

use crate::error::{LifecycleError, Result};
use crate::ids::{AllocationId, DeviceId, EmployeeId, RequestId};
use crate::status::{AllocationStatus, RequestStatus, ReturnCondition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on free-text fields (`reason`, `notes`).
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 1000;

/// Trim free text and turn blank input into `None`.
///
/// # Errors
///
/// Returns [`LifecycleError::Validation`] if the trimmed text is longer than
/// `max_len` characters.
///
/// # Examples
///
/// ```
/// use asset_lifecycle_core::types::normalize_text;
///
/// assert_eq!(normalize_text("reason", Some("  spare  "), 100).unwrap(), Some("spare".to_string()));
/// assert_eq!(normalize_text("reason", Some("   "), 100).unwrap(), None);
/// assert!(normalize_text("reason", Some("too long"), 3).is_err());
/// ```
pub fn normalize_text(
    field: &'static str,
    raw: Option<&str>,
    max_len: usize,
) -> Result<Option<String>> {
    let Some(trimmed) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(LifecycleError::validation(
            field,
            format!("{len} characters exceeds the limit of {max_len}"),
        ));
    }
    Ok(Some(trimmed.to_string()))
}

/// Like [`normalize_text`] but blank input is an error.
///
/// # Errors
///
/// Returns [`LifecycleError::Validation`] if the text is missing, blank, or
/// longer than `max_len`.
pub fn require_text(field: &'static str, raw: &str, max_len: usize) -> Result<String> {
    normalize_text(field, Some(raw), max_len)?
        .ok_or_else(|| LifecycleError::validation(field, "must not be blank"))
}

/// An employee's ask for a specific device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Repository-assigned id
    pub id: RequestId,
    /// Device being requested
    pub device_id: DeviceId,
    /// Employee asking for it
    pub employee_id: EmployeeId,
    /// Current position in the state machine
    pub status: RequestStatus,
    /// Why it was requested, or why it was rejected / cancelled
    pub reason: Option<String>,
    /// When the request was submitted
    pub created_at: DateTime<Utc>,
    /// Last committed change
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `to` if the transition table allows it.
    ///
    /// `updated_at` becomes `at`, never earlier than `created_at`. Returns the
    /// previous status.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] and leaves the request
    /// untouched if `status → to` is not an edge.
    pub fn transition_to(&mut self, to: RequestStatus, at: DateTime<Utc>) -> Result<RequestStatus> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                id: self.id,
                from,
                to,
            });
        }
        self.status = to;
        self.touch(at);
        Ok(from)
    }

    /// Refresh `updated_at`, keeping `updated_at >= created_at`.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at.max(self.created_at);
    }
}

/// Input for [`RequestRepository::create`](crate::repository::RequestRepository::create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Device being requested
    pub device_id: DeviceId,
    /// Employee asking for it
    pub employee_id: EmployeeId,
    /// Optional justification
    pub reason: Option<String>,
    /// Submission time; also the initial `updated_at`
    pub created_at: DateTime<Utc>,
}

impl NewRequest {
    /// Materialise the stored record once the repository has picked an id.
    #[must_use]
    pub fn into_request(self, id: RequestId) -> Request {
        Request {
            id,
            device_id: self.device_id,
            employee_id: self.employee_id,
            status: RequestStatus::Pending,
            reason: self.reason,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// The hand-off record for an approved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Repository-assigned id
    pub id: AllocationId,
    /// Owning request
    pub request_id: RequestId,
    /// Device handed over (copied from the request)
    pub device_id: DeviceId,
    /// Employee holding it (copied from the request)
    pub employee_id: EmployeeId,
    /// When the device was handed over
    pub issued_at: DateTime<Utc>,
    /// When it came back; `None` while active
    pub returned_at: Option<DateTime<Utc>>,
    /// Condition on return
    pub return_condition: Option<ReturnCondition>,
    /// Free-text return notes
    pub notes: Option<String>,
}

impl Allocation {
    /// Active allocations have no return recorded.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    /// Derived status.
    #[must_use]
    pub const fn status(&self) -> AllocationStatus {
        if self.is_active() {
            AllocationStatus::Active
        } else {
            AllocationStatus::Returned
        }
    }

    /// Record the return. `returned_at` is clamped to `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Conflict`] and leaves the record untouched
    /// if a return was already recorded.
    pub fn record_return(
        &mut self,
        at: DateTime<Utc>,
        condition: ReturnCondition,
        notes: Option<String>,
    ) -> Result<()> {
        if let Some(returned_at) = self.returned_at {
            return Err(LifecycleError::conflict(format!(
                "allocation {} was already returned at {returned_at}",
                self.id
            )));
        }
        self.returned_at = Some(at.max(self.issued_at));
        self.return_condition = Some(condition);
        self.notes = notes;
        Ok(())
    }
}

/// Input for [`AllocationRepository::create`](crate::repository::AllocationRepository::create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAllocation {
    /// Owning request
    pub request_id: RequestId,
    /// Device handed over
    pub device_id: DeviceId,
    /// Employee receiving it
    pub employee_id: EmployeeId,
    /// Hand-off time
    pub issued_at: DateTime<Utc>,
}

impl NewAllocation {
    /// Build the allocation input for an approved request.
    #[must_use]
    pub fn for_request(request: &Request, issued_at: DateTime<Utc>) -> Self {
        Self {
            request_id: request.id,
            device_id: request.device_id.clone(),
            employee_id: request.employee_id.clone(),
            issued_at,
        }
    }

    /// Materialise the stored record once the repository has picked an id.
    #[must_use]
    pub fn into_allocation(self, id: AllocationId) -> Allocation {
        Allocation {
            id,
            request_id: self.request_id,
            device_id: self.device_id,
            employee_id: self.employee_id,
            issued_at: self.issued_at,
            returned_at: None,
            return_condition: None,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0)
            .single()
            .unwrap_or_default()
    }

    fn pending() -> Request {
        NewRequest {
            device_id: DeviceId::new("D1"),
            employee_id: EmployeeId::new("E7"),
            reason: Some("broken laptop".to_string()),
            created_at: t0(),
        }
        .into_request(RequestId::new(1))
    }

    #[test]
    fn new_request_starts_pending_with_equal_timestamps() {
        let request = pending();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.created_at, request.updated_at);
    }

    #[test]
    fn transition_updates_status_and_timestamp() {
        let mut request = pending();
        let later = t0() + Duration::minutes(5);

        let from = request.transition_to(RequestStatus::Approved, later);

        assert_eq!(from.ok(), Some(RequestStatus::Pending));
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.updated_at, later);
    }

    #[test]
    fn refused_transition_leaves_request_untouched() {
        let mut request = pending();
        let before = request.clone();

        let result = request.transition_to(RequestStatus::Allocated, t0() + Duration::hours(1));

        assert!(matches!(
            result,
            Err(LifecycleError::InvalidTransition {
                from: RequestStatus::Pending,
                to: RequestStatus::Allocated,
                ..
            })
        ));
        assert_eq!(request, before);
    }

    #[test]
    fn touch_never_goes_before_creation() {
        let mut request = pending();
        request.touch(t0() - Duration::days(1));
        assert_eq!(request.updated_at, request.created_at);
    }

    #[test]
    fn record_return_only_once() {
        let request = pending();
        let mut allocation =
            NewAllocation::for_request(&request, t0()).into_allocation(AllocationId::new(1));
        assert!(allocation.is_active());

        let returned = allocation.record_return(
            t0() + Duration::days(3),
            ReturnCondition::Good,
            Some("no issues".to_string()),
        );
        assert!(returned.is_ok());
        assert_eq!(allocation.status(), AllocationStatus::Returned);

        let snapshot = allocation.clone();
        let again = allocation.record_return(t0() + Duration::days(4), ReturnCondition::Lost, None);
        assert!(matches!(again, Err(LifecycleError::Conflict(_))));
        assert_eq!(allocation, snapshot);
    }

    #[test]
    fn return_time_is_clamped_to_issue_time() {
        let request = pending();
        let mut allocation =
            NewAllocation::for_request(&request, t0()).into_allocation(AllocationId::new(2));

        let result =
            allocation.record_return(t0() - Duration::minutes(1), ReturnCondition::Scratched, None);

        assert!(result.is_ok());
        assert_eq!(allocation.returned_at, Some(t0()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        fn any_status() -> impl Strategy<Value = RequestStatus> {
            prop::sample::select(RequestStatus::ALL.to_vec())
        }

        proptest! {
            #[test]
            fn status_never_revisits_a_state(targets in prop::collection::vec(any_status(), 0..16)) {
                let mut request = pending();
                let mut visited = vec![request.status];

                for to in targets {
                    let before = request.status;
                    match request.transition_to(to, t0()) {
                        Ok(from) => {
                            prop_assert_eq!(from, before);
                            prop_assert!(before.can_transition_to(to));
                            visited.push(to);
                        }
                        Err(_) => prop_assert_eq!(request.status, before),
                    }
                }

                let mut seen = HashSet::new();
                for status in visited {
                    prop_assert!(seen.insert(status), "revisited {}", status);
                }
            }
        }
    }

    #[test]
    fn require_text_rejects_blank() {
        assert!(matches!(
            require_text("reason", "  ", 10),
            Err(LifecycleError::Validation { field: "reason", .. })
        ));
        assert_eq!(require_text("reason", " ok ", 10).ok(), Some("ok".to_string()));
    }
}
