//! Configuration for the lifecycle services.
//!
//! Loads configuration from environment variables with sensible defaults.

use asset_lifecycle_core::types::DEFAULT_MAX_TEXT_LENGTH;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;

/// Default capacity of the audit trail ring.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// Lifecycle configuration loaded from environment variables.
///
/// # Example
///
/// ```
/// use asset_lifecycle_runtime::config::LifecycleConfig;
///
/// let config = LifecycleConfig::default()
///     .with_max_text_length(200)
///     .with_audit_capacity(50);
///
/// assert_eq!(config.max_text_length, 200);
/// assert_eq!(config.audit_capacity, 50);
/// assert_eq!(config.log_level, "info");
/// assert!(config.metrics_addr.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Cap on `reason` / `notes` length, in characters
    pub max_text_length: usize,
    /// Entries kept by the audit trail before the oldest is dropped
    pub audit_capacity: usize,
    /// Log filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address for the Prometheus exporter; metrics stay off when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            log_level: "info".to_string(),
            metrics_addr: None,
        }
    }
}

impl LifecycleConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LIFECYCLE_MAX_TEXT_LENGTH` | 1000 |
    /// | `LIFECYCLE_AUDIT_CAPACITY` | 1000 |
    /// | `RUST_LOG` | `info` |
    /// | `LIFECYCLE_METRICS_ADDR` | unset |
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// [`from_env`](Self::from_env) is this with `std::env::var`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_text_length: lookup("LIFECYCLE_MAX_TEXT_LENGTH")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_text_length),
            audit_capacity: lookup("LIFECYCLE_AUDIT_CAPACITY")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.audit_capacity),
            log_level: lookup("RUST_LOG")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.log_level),
            metrics_addr: lookup("LIFECYCLE_METRICS_ADDR").and_then(|s| s.parse().ok()),
        }
    }

    /// Set the free-text length cap
    #[must_use]
    pub const fn with_max_text_length(mut self, max_text_length: usize) -> Self {
        self.max_text_length = max_text_length;
        self
    }

    /// Set the audit trail capacity
    #[must_use]
    pub const fn with_audit_capacity(mut self, audit_capacity: usize) -> Self {
        self.audit_capacity = audit_capacity;
        self
    }

    /// Set the log filter directive
    #[must_use]
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    /// Enable the Prometheus exporter on `addr`
    #[must_use]
    pub const fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }
}
