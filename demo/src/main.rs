//! Asset Desk Demo
//!
//! Runs the broken-laptop scenario end to end over in-memory storage:
//! request, approval, issue, a refused double issue, return, and a refused
//! double return. Every event lands in the audit trail, which is printed at
//! the end.
//!
//! # Running the Example
//!
//! ```bash
//! cargo run -p asset-desk-demo
//! RUST_LOG=debug LIFECYCLE_METRICS_ADDR=127.0.0.1:9000 cargo run -p asset-desk-demo
//! ```
//!
//! With `LIFECYCLE_METRICS_ADDR` set the Prometheus payload is printed too.

#![allow(missing_docs)]

use anyhow::Context;
use asset_lifecycle_core::environment::{Clock, SystemClock};
use asset_lifecycle_core::{DeviceStatus, ReturnCondition};
use asset_lifecycle_runtime::{
    AllocationManager, AssetDesk, AuditTrail, LifecycleConfig, MetricsListener, MetricsServer,
    RequestLifecycle,
};
use asset_lifecycle_testing::{
    InMemoryAllocationRepository, InMemoryDeviceRegistry, InMemoryRequestRepository,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LifecycleConfig::from_env();

    // 1. Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(?config, "Starting Asset Desk Demo");

    // 2. Optional Prometheus recorder
    let metrics = match config.metrics_addr {
        Some(addr) => {
            let mut server = MetricsServer::new(addr);
            server.start().context("installing metrics recorder")?;
            Some(server)
        }
        None => None,
    };

    // 3. Wire storage, services and listeners
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let allocations = Arc::new(InMemoryAllocationRepository::new());
    let devices = InMemoryDeviceRegistry::new()
        .with_device("D1", DeviceStatus::InStock)
        .with_device("D2", DeviceStatus::InStock);

    let lifecycle = Arc::new(
        RequestLifecycle::new(
            Arc::new(InMemoryRequestRepository::new()),
            allocations.clone(),
            Arc::clone(&clock),
        )
        .with_max_text_length(config.max_text_length),
    );
    let manager = Arc::new(
        AllocationManager::new(allocations, Arc::clone(&lifecycle), Arc::clone(&clock))
            .with_max_text_length(config.max_text_length),
    );

    let audit = Arc::new(AuditTrail::new(config.audit_capacity, clock));
    lifecycle.subscribe(audit.clone());
    manager.subscribe(audit.clone());
    lifecycle.subscribe(Arc::new(MetricsListener::new()));
    manager.subscribe(Arc::new(MetricsListener::new()));

    let desk = AssetDesk::new(lifecycle, manager, Arc::new(devices.clone()));

    // 4. Scenario
    let request = desk
        .requests()
        .create_request("D1", "E7", Some("broken laptop"))
        .await?;
    desk.requests().approve(request.id).await?;
    let allocation = desk.issue(request.id).await?;
    tracing::info!(
        allocation_id = %allocation.id,
        device = ?devices.status_of("D1"),
        "✓ D1 issued to E7"
    );

    let second = desk.requests().create_request("D1", "E8", None).await?;
    desk.requests().approve(second.id).await?;
    match desk.issue(second.id).await {
        Err(e) => tracing::info!(error = %e, kind = e.kind(), "✓ Second issue of D1 refused"),
        Ok(unexpected) => anyhow::bail!("D1 issued twice: {unexpected:?}"),
    }

    let returned = desk
        .receive_return(allocation.id, ReturnCondition::Good, Some("no issues"))
        .await?;
    tracing::info!(
        returned_at = ?returned.returned_at,
        device = ?devices.status_of("D1"),
        "✓ D1 returned"
    );

    if let Err(e) = desk
        .receive_return(allocation.id, ReturnCondition::Good, None)
        .await
    {
        tracing::info!(error = %e, kind = e.kind(), "✓ Second return refused");
    }

    // 5. Report
    for entry in audit.entries() {
        println!(
            "{} {:<28} #{} {}",
            entry.recorded_at.format("%H:%M:%S%.3f"),
            entry.event_type,
            entry.entity_id,
            serde_json::to_string(&entry.payload)?
        );
    }

    if let Some(payload) = metrics.as_ref().and_then(MetricsServer::render) {
        println!("{payload}");
    }

    tracing::info!("✓ Demo complete");
    Ok(())
}
