//! # Asset Lifecycle Core
//!
//! Domain types and contracts for the device Request/Allocation lifecycle.
//!
//! This crate holds everything that has no I/O of its own:
//!
//! - **Identifiers**: [`ids::RequestId`], [`ids::AllocationId`], validated
//!   [`ids::DeviceId`] / [`ids::EmployeeId`]
//! - **State machine**: [`status::RequestStatus`] with its transition table
//! - **Records**: [`types::Request`], [`types::Allocation`]
//! - **Events**: [`event::RequestEvent`], [`event::AllocationEvent`]
//! - **Seams**: [`listener::Listener`], [`repository::RequestRepository`],
//!   [`repository::AllocationRepository`], [`repository::DeviceRegistry`],
//!   [`environment::Clock`]
//! - **Errors**: [`error::LifecycleError`]
//!
//! The services that drive the lifecycle live in `asset-lifecycle-runtime`;
//! in-memory implementations of the seams live in `asset-lifecycle-testing`.
//!
//! ## Request state machine
//!
//! ```text
//! PENDING → {APPROVED, REJECTED, CANCELLED}
//! APPROVED → {ALLOCATED, CANCELLED}
//! REJECTED, ALLOCATED, CANCELLED are terminal
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Error taxonomy
pub mod error;
/// Lifecycle events
pub mod event;
/// Identifier newtypes
pub mod ids;
/// Listener trait and closure adapter
pub mod listener;
/// Repository and device registry contracts
pub mod repository;
/// Keyword search predicates
pub mod search;
/// Status enums and the request transition table
pub mod status;
/// Request and allocation records
pub mod types;

/// Environment module - Dependency injection traits
///
/// External dependencies that make the services non-deterministic are
/// abstracted here and injected through constructors.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_lifecycle_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use error::{LifecycleError, RepositoryError};
pub use event::{AllocationEvent, LifecycleEvent, RequestEvent};
pub use ids::{AllocationId, DeviceId, EmployeeId, RequestId};
pub use listener::{FnListener, Listener, ListenerError};
pub use status::{AllocationStatus, DeviceStatus, RequestStatus, ReturnCondition};
pub use types::{Allocation, NewAllocation, NewRequest, Request};
