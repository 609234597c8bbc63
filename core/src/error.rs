//! Error taxonomy for lifecycle operations.

use crate::ids::RequestId;
use crate::status::RequestStatus;
use crate::types::Allocation;
use std::fmt;
use thiserror::Error;

/// Failures raised by repository and registry implementations.
///
/// The lifecycle services never reinterpret these; they surface as
/// [`LifecycleError::Repository`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Backend could not be reached.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    /// Query or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored row could not be mapped to a domain type.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Kind of entity referenced by an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A device request
    Request,
    /// An allocation record
    Allocation,
    /// A physical device
    Device,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "Request",
            Self::Allocation => "Allocation",
            Self::Device => "Device",
        })
    }
}

/// Errors returned by lifecycle operations.
///
/// None of these are retried internally; the caller decides how to present
/// or reconcile them.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Missing or malformed input.
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Offending argument
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Referenced request or allocation does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of the missing entity
        entity: EntityKind,
        /// Its identifier, as displayed
        id: String,
    },

    /// Status precondition violated.
    #[error("Request {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Request whose transition was refused
        id: RequestId,
        /// Status it is currently in
        from: RequestStatus,
        /// Status that was asked for
        to: RequestStatus,
    },

    /// Device already actively allocated, allocation already returned, or a
    /// record is still referenced.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence failure, surfaced as-is.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The allocation was written but the follow-up request update failed.
    ///
    /// The allocation is not rolled back; the caller must re-read state and
    /// reconcile.
    #[error("Allocation {} created but request was not marked allocated: {source}", .allocation.id)]
    PartialAllocation {
        /// The allocation that was persisted
        allocation: Box<Allocation>,
        /// Why the request update failed
        #[source]
        source: Box<LifecycleError>,
    },
}

impl LifecycleError {
    /// Build a [`LifecycleError::Validation`].
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Build a [`LifecycleError::NotFound`].
    #[must_use]
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Build a [`LifecycleError::Conflict`].
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Short, stable name of the error variant (used as a metrics label).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Conflict(_) => "conflict",
            Self::Repository(_) => "repository",
            Self::PartialAllocation { .. } => "partial_allocation",
        }
    }
}

/// Convenience alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let error = LifecycleError::InvalidTransition {
            id: RequestId::new(4),
            from: RequestStatus::Rejected,
            to: RequestStatus::Approved,
        };
        assert_eq!(
            error.to_string(),
            "Request 4 cannot move from Rejected to Approved"
        );
    }

    #[test]
    fn not_found_display() {
        let error = LifecycleError::not_found(EntityKind::Allocation, 12);
        assert_eq!(error.to_string(), "Allocation 12 not found");
        assert_eq!(error.kind(), "not_found");
    }

    #[test]
    fn repository_errors_convert_transparently() {
        let error: LifecycleError = RepositoryError::Unavailable("db down".to_string()).into();
        assert_eq!(error.to_string(), "Repository unavailable: db down");
        assert_eq!(error.kind(), "repository");
    }
}
