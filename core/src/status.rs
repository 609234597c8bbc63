//! Status enums and the request transition table.
//!
//! The request state machine is encoded as data: [`RequestStatus::allowed_targets`]
//! returns the outgoing edges of each state, and every transition is checked
//! against it before anything is mutated.
//!
//! ```text
//! PENDING ──► APPROVED ──► ALLOCATED
//!    │            │
//!    ├──► REJECTED│
//!    │            ▼
//!    └──────► CANCELLED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing a status code fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} code: {code}")]
pub struct ParseStatusError {
    kind: &'static str,
    code: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, code: &str) -> Self {
        Self {
            kind,
            code: code.to_string(),
        }
    }
}

/// Status of a device request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Submitted by an employee, awaiting a decision
    Pending,
    /// Approved by an administrator, awaiting hand-off
    Approved,
    /// Turned down by an administrator
    Rejected,
    /// Device handed over; an allocation exists
    Allocated,
    /// Withdrawn before hand-off
    Cancelled,
}

impl RequestStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Allocated,
        Self::Cancelled,
    ];

    /// Statuses reachable in one step from `self`.
    #[must_use]
    pub const fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Approved, Self::Rejected, Self::Cancelled],
            Self::Approved => &[Self::Allocated, Self::Cancelled],
            Self::Rejected | Self::Allocated | Self::Cancelled => &[],
        }
    }

    /// Check whether `self → to` is an edge of the state machine.
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_lifecycle_core::status::RequestStatus;
    ///
    /// assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Approved));
    /// assert!(!RequestStatus::Allocated.can_transition_to(RequestStatus::Pending));
    /// ```
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Terminal statuses have no outgoing edges.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Stable storage code (`"PENDING"`, `"APPROVED"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Allocated => "ALLOCATED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Human-readable label, also used by keyword search.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Allocated => "Allocated",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RequestStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStatusError::new("request status", s))
    }
}

/// Condition of a device when it comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCondition {
    /// No visible wear
    Good,
    /// Cosmetic damage only
    Scratched,
    /// Needs repair
    Damaged,
    /// Not returned at all
    Lost,
}

impl ReturnCondition {
    /// Every condition.
    pub const ALL: [Self; 4] = [Self::Good, Self::Scratched, Self::Damaged, Self::Lost];

    /// Stable storage code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Scratched => "SCRATCHED",
            Self::Damaged => "DAMAGED",
            Self::Lost => "LOST",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Scratched => "Scratched",
            Self::Damaged => "Damaged",
            Self::Lost => "Lost",
        }
    }

    /// Device status a returned device should move to.
    #[must_use]
    pub const fn resulting_device_status(self) -> DeviceStatus {
        match self {
            Self::Good | Self::Scratched => DeviceStatus::InStock,
            Self::Damaged => DeviceStatus::Maintenance,
            Self::Lost => DeviceStatus::Retired,
        }
    }
}

impl fmt::Display for ReturnCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReturnCondition {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|condition| condition.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStatusError::new("return condition", s))
    }
}

/// Derived status of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    /// Device is out with the employee
    Active,
    /// Return has been recorded
    Returned,
}

impl AllocationStatus {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Returned => "Returned",
        }
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Current status of a physical device, owned by the device registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    /// On the shelf, can be issued
    InStock,
    /// Issued to an employee
    InUse,
    /// Out for repair
    Maintenance,
    /// Written off
    Retired,
}

impl DeviceStatus {
    /// Whether a device in this status may be handed out.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::InStock)
    }

    /// Stable storage code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InStock => "IN_STOCK",
            Self::InUse => "IN_USE",
            Self::Maintenance => "MAINTENANCE",
            Self::Retired => "RETIRED",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
