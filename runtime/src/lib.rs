//! # Asset Lifecycle Runtime
//!
//! Services that drive the device Request/Allocation lifecycle.
//!
//! ## Core Components
//!
//! - **[`RequestLifecycle`]**: creates requests and walks them through the
//!   state machine
//! - **[`AllocationManager`]**: issues devices against approved requests and
//!   records returns
//! - **[`NotificationHub`]**: fans committed changes out to listeners, one
//!   failing listener never stopping the rest
//! - **[`AssetDesk`]**: keeps device inventory status in step with
//!   allocations
//! - **[`AuditTrail`]** and **[`MetricsListener`]**: stock listeners
//!
//! Every mutating operation follows the same order: validate, persist,
//! then publish. A listener only ever sees state that is already stored.
//!
//! ## Example
//!
//! ```ignore
//! use asset_lifecycle_runtime::{AllocationManager, RequestLifecycle};
//! use asset_lifecycle_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(SystemClock);
//! let lifecycle = Arc::new(RequestLifecycle::new(requests, allocations.clone(), clock.clone()));
//! let manager = AllocationManager::new(allocations, lifecycle.clone(), clock);
//!
//! let request = lifecycle.create_request("D1", "E7", Some("new hire")).await?;
//! lifecycle.approve(request.id).await?;
//! let allocation = manager.allocate(request.id).await?;
//! ```

/// Allocation manager service
pub mod allocation_manager;

/// Bounded in-memory audit trail listener
pub mod audit;

/// Configuration loaded from the environment
pub mod config;

/// Device status orchestration on top of the services
pub mod desk;

/// Listener registry and fan-out
pub mod hub;

/// Prometheus metrics for observability
pub mod metrics;

/// Request lifecycle service
pub mod request_lifecycle;

pub use allocation_manager::AllocationManager;
pub use audit::{AuditEntry, AuditTrail};
pub use config::LifecycleConfig;
pub use desk::AssetDesk;
pub use hub::{DeliveryReport, NotificationHub};
pub use metrics::{MetricsListener, MetricsServer};
pub use request_lifecycle::RequestLifecycle;
