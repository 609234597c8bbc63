//! Orchestrator that keeps device status in step with allocations.
//!
//! The lifecycle services never touch the device inventory. `AssetDesk` is
//! the caller layer that does: it refuses to issue a device that is not on
//! the shelf, and flips the device status after the allocation write has
//! succeeded.
//!
//! Device writes come second and are not undone on failure. A failed device
//! write is logged and returned as [`LifecycleError::Repository`] while the
//! allocation change stays committed.

use crate::allocation_manager::AllocationManager;
use crate::metrics::record_conflict;
use crate::request_lifecycle::RequestLifecycle;
use asset_lifecycle_core::error::{LifecycleError, Result};
use asset_lifecycle_core::ids::{AllocationId, DeviceId, RequestId};
use asset_lifecycle_core::repository::DeviceRegistry;
use asset_lifecycle_core::status::{DeviceStatus, ReturnCondition};
use asset_lifecycle_core::types::Allocation;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Front desk for issuing and receiving devices.
pub struct AssetDesk {
    requests: Arc<RequestLifecycle>,
    allocations: Arc<AllocationManager>,
    devices: Arc<dyn DeviceRegistry>,
}

impl AssetDesk {
    /// Bundle the services with the device registry.
    #[must_use]
    pub fn new(
        requests: Arc<RequestLifecycle>,
        allocations: Arc<AllocationManager>,
        devices: Arc<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            requests,
            allocations,
            devices,
        }
    }

    /// Allocate the device of an approved request and mark it in use.
    ///
    /// A device the registry does not know is treated as available.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Conflict`] if the device is not `InStock`
    /// - any error of [`AllocationManager::allocate`]; on
    ///   [`LifecycleError::PartialAllocation`] the device is still marked
    ///   `InUse`, since its allocation is stored
    /// - [`LifecycleError::Repository`] if the device status write fails
    ///   (the allocation is kept)
    #[instrument(skip_all, fields(request_id = %request_id))]
    pub async fn issue(&self, request_id: RequestId) -> Result<Allocation> {
        let request = self.requests.get(request_id).await?;
        let status = self.devices.status(request.device_id.clone()).await?;
        if let Some(status) = status.filter(|s| !s.is_available()) {
            warn!(device_id = %request.device_id, status = status.as_str(), "Device not on the shelf");
            record_conflict("device_unavailable");
            return Err(LifecycleError::conflict(format!(
                "Device {} is {} and cannot be issued",
                request.device_id,
                status.as_str()
            )));
        }

        let allocation = match self.allocations.allocate(request_id).await {
            Ok(allocation) => allocation,
            Err(LifecycleError::PartialAllocation { allocation, source }) => {
                // The device left the shelf even though the request lags behind.
                if let Err(e) = self
                    .set_device_status(&allocation.device_id, DeviceStatus::InUse)
                    .await
                {
                    warn!(error = %e, "Device status not recorded for partial allocation");
                }
                return Err(LifecycleError::PartialAllocation { allocation, source });
            }
            Err(e) => return Err(e),
        };
        self.set_device_status(&allocation.device_id, DeviceStatus::InUse)
            .await?;
        Ok(allocation)
    }

    /// Record a return and move the device to the status its condition
    /// calls for.
    ///
    /// # Errors
    ///
    /// - any error of [`AllocationManager::return_device`]
    /// - [`LifecycleError::Repository`] if the device status write fails
    ///   (the return is kept)
    #[instrument(skip_all, fields(allocation_id = %allocation_id))]
    pub async fn receive_return(
        &self,
        allocation_id: AllocationId,
        condition: ReturnCondition,
        notes: Option<&str>,
    ) -> Result<Allocation> {
        let allocation = self
            .allocations
            .return_device(allocation_id, condition, notes)
            .await?;
        self.set_device_status(&allocation.device_id, condition.resulting_device_status())
            .await?;
        Ok(allocation)
    }

    /// The request service.
    #[must_use]
    pub const fn requests(&self) -> &Arc<RequestLifecycle> {
        &self.requests
    }

    /// The allocation manager.
    #[must_use]
    pub const fn allocations(&self) -> &Arc<AllocationManager> {
        &self.allocations
    }

    async fn set_device_status(&self, device_id: &DeviceId, status: DeviceStatus) -> Result<()> {
        match self.devices.set_status(device_id.clone(), status).await {
            Ok(true) => {
                info!(device_id = %device_id, status = status.as_str(), "Device status updated");
                Ok(())
            }
            Ok(false) => {
                warn!(device_id = %device_id, "Device unknown to the registry, status not recorded");
                Ok(())
            }
            Err(e) => {
                error!(
                    device_id = %device_id,
                    status = status.as_str(),
                    error = %e,
                    "Device status write failed after the allocation change committed"
                );
                Err(e.into())
            }
        }
    }
}
