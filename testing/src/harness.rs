//! Services wired over in-memory collaborators.
//!
//! [`LifecycleHarness`] builds the full stack the way an application would:
//! one request repository, one allocation repository shared by both
//! services, a device registry, and a stepping clock so every timestamp is
//! distinct and ordered. A recording listener is subscribed to each hub.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use crate::listeners::RecordingListener;
use crate::mocks::{SteppingClock, stepping_clock};
use crate::repositories::{
    InMemoryAllocationRepository, InMemoryDeviceRegistry, InMemoryRequestRepository,
};
use asset_lifecycle_core::environment::Clock;
use asset_lifecycle_core::event::{AllocationEvent, RequestEvent};
use asset_lifecycle_core::ids::RequestId;
use asset_lifecycle_runtime::{AllocationManager, AssetDesk, RequestLifecycle};
use std::sync::Arc;

/// The lifecycle stack over in-memory storage.
///
/// Fields are public so tests can reach past the services to flip fault
/// switches or inspect stored rows.
pub struct LifecycleHarness {
    /// Clock shared by both services
    pub clock: Arc<SteppingClock>,
    /// Request storage
    pub requests: InMemoryRequestRepository,
    /// Allocation storage, shared by both services
    pub allocations: InMemoryAllocationRepository,
    /// Device inventory used by [`desk`](Self::desk)
    pub devices: InMemoryDeviceRegistry,
    /// Request service
    pub lifecycle: Arc<RequestLifecycle>,
    /// Allocation service
    pub manager: Arc<AllocationManager>,
    /// Device-aware front desk over the two services
    pub desk: AssetDesk,
    /// Every request event published so far
    pub request_events: Arc<RecordingListener<RequestEvent>>,
    /// Every allocation event published so far
    pub allocation_events: Arc<RecordingListener<AllocationEvent>>,
}

impl LifecycleHarness {
    /// Wire a fresh stack with empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocations(InMemoryAllocationRepository::new())
    }

    /// Wire a fresh stack over a preconfigured allocation repository,
    /// e.g. one built with
    /// [`with_unique_active_device`](InMemoryAllocationRepository::with_unique_active_device).
    #[must_use]
    pub fn with_allocations(allocations: InMemoryAllocationRepository) -> Self {
        let clock = Arc::new(stepping_clock());
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let requests = InMemoryRequestRepository::new();
        let devices = InMemoryDeviceRegistry::new();

        let lifecycle = Arc::new(RequestLifecycle::new(
            Arc::new(requests.clone()),
            Arc::new(allocations.clone()),
            Arc::clone(&shared_clock),
        ));
        let manager = Arc::new(AllocationManager::new(
            Arc::new(allocations.clone()),
            Arc::clone(&lifecycle),
            shared_clock,
        ));
        let desk = AssetDesk::new(
            Arc::clone(&lifecycle),
            Arc::clone(&manager),
            Arc::new(devices.clone()),
        );

        let request_events = RecordingListener::<RequestEvent>::shared("recorder");
        let allocation_events = RecordingListener::<AllocationEvent>::shared("recorder");
        lifecycle.subscribe(request_events.clone());
        manager.subscribe(allocation_events.clone());

        Self {
            clock,
            requests,
            allocations,
            devices,
            lifecycle,
            manager,
            desk,
            request_events,
            allocation_events,
        }
    }

    /// Create and approve a request, returning its id.
    pub async fn approved_request(&self, device_id: &str, employee_id: &str) -> RequestId {
        let request = self
            .lifecycle
            .create_request(device_id, employee_id, None)
            .await
            .unwrap();
        self.lifecycle.approve(request.id).await.unwrap();
        request.id
    }

    /// Forget every recorded event.
    pub fn clear_events(&self) {
        self.request_events.clear();
        self.allocation_events.clear();
    }
}

impl Default for LifecycleHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
