//! Prometheus metrics for the lifecycle services.
//!
//! Counters recorded across the crate:
//! - `lifecycle_requests_created_total`
//! - `lifecycle_request_transitions_total{to}`
//! - `lifecycle_allocations_created_total`
//! - `lifecycle_allocations_returned_total`
//! - `lifecycle_conflicts_total{kind}`
//! - `hub_events_published_total{event}`
//! - `hub_listener_failures_total{listener}`
//!
//! The `lifecycle_*` entity counters come from [`MetricsListener`], an
//! ordinary hub listener; conflicts are counted by the services because a
//! refused operation never reaches a hub.
//!
//! # Example
//!
//! ```rust,no_run
//! use asset_lifecycle_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(payload) = server.render() {
//!     println!("{payload}");
//! }
//! # Ok(())
//! # }
//! ```

use asset_lifecycle_core::event::{AllocationEvent, RequestEvent};
use asset_lifecycle_core::listener::{Listener, ListenerError};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::counter;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and renders the scrape payload. It never
/// binds a socket: `addr` is only carried for the host application, which
/// serves [`render`](Self::render) there.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the exporter cannot be installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// logs a warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the host should serve [`render`](Self::render) on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Lifecycle entities
    describe_counter!(
        "lifecycle_requests_created_total",
        "Total number of device requests created"
    );
    describe_counter!(
        "lifecycle_request_transitions_total",
        "Total number of committed request status transitions, by target status"
    );
    describe_counter!(
        "lifecycle_allocations_created_total",
        "Total number of allocations created"
    );
    describe_counter!(
        "lifecycle_allocations_returned_total",
        "Total number of allocations returned"
    );
    describe_counter!(
        "lifecycle_conflicts_total",
        "Total number of operations refused because of conflicting state"
    );

    // Notification hub
    describe_counter!(
        "hub_events_published_total",
        "Total number of events published, by event type"
    );
    describe_counter!(
        "hub_listener_failures_total",
        "Total number of listener deliveries that failed or panicked"
    );
}

/// Record a refused operation.
pub fn record_conflict(kind: &'static str) {
    counter!("lifecycle_conflicts_total", "kind" => kind).increment(1);
}

/// Listener that turns lifecycle events into counters.
///
/// Subscribe one instance to both hubs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsListener;

impl MetricsListener {
    /// Create the listener.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Listener<RequestEvent> for MetricsListener {
    fn name(&self) -> &str {
        "metrics"
    }

    fn on_event(&self, event: &RequestEvent) -> Result<(), ListenerError> {
        match event {
            RequestEvent::Added(_) => {
                counter!("lifecycle_requests_created_total").increment(1);
            }
            RequestEvent::StatusChanged { to, .. } => {
                counter!("lifecycle_request_transitions_total", "to" => to.as_str()).increment(1);
            }
            _ => {}
        }
        Ok(())
    }
}

impl Listener<AllocationEvent> for MetricsListener {
    fn name(&self) -> &str {
        "metrics"
    }

    fn on_event(&self, event: &AllocationEvent) -> Result<(), ListenerError> {
        match event {
            AllocationEvent::Added(_) => {
                counter!("lifecycle_allocations_created_total").increment(1);
            }
            AllocationEvent::StatusChanged { .. } => {
                counter!("lifecycle_allocations_returned_total").increment(1);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_lifecycle_core::{AllocationId, RequestId};

    #[test]
    fn metrics_server_creation() {
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[test]
    fn start_leaves_the_address_to_the_host() {
        let Ok(free) = std::net::TcpListener::bind("127.0.0.1:0") else {
            return;
        };
        let Ok(addr) = free.local_addr() else {
            return;
        };
        drop(free);

        let mut server = MetricsServer::new(addr);
        assert!(server.start().is_ok());

        assert!(std::net::TcpListener::bind(addr).is_ok());
    }

    #[test]
    fn metrics_listener_accepts_every_event() {
        // Without an installed recorder the counters are no-ops; the listener
        // must still never reject an event.
        let listener = MetricsListener::new();
        assert!(
            Listener::<RequestEvent>::on_event(&listener, &RequestEvent::Deleted(RequestId::new(1)))
                .is_ok()
        );
        assert!(
            Listener::<AllocationEvent>::on_event(
                &listener,
                &AllocationEvent::Deleted(AllocationId::new(1))
            )
            .is_ok()
        );
        record_conflict("device_allocated");
    }
}
