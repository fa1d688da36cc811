//! Shared accelerator resources.
//!
//! A [`GpuResources`] bundles what every index on one device needs: the
//! device ordinal, its capability descriptor, and the memory pool that
//! backs list storage and staging buffers. Share it through
//! `Arc<GpuResources>` across indices on the same device.

use std::sync::Arc;

use crate::error::IvfPqResult;

use super::capability::DeviceCapability;
use super::context::DeviceScope;
use super::memory::{GpuMemoryConfig, GpuMemoryManager};

/// Accelerator resources handle.
///
/// # Thread Safety
///
/// `Send + Sync`: the memory pool synchronizes internally and the
/// capability descriptor is immutable.
pub struct GpuResources {
    device_id: i32,
    capability: DeviceCapability,
    memory: GpuMemoryManager,
}

impl GpuResources {
    /// Allocate resources for the specified device with default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the default memory config fails validation.
    ///
    /// # Example
    ///
    /// ```
    /// use ivfpq_gpu::device::GpuResources;
    /// use std::sync::Arc;
    ///
    /// let resources = Arc::new(GpuResources::new(0)?);
    /// assert_eq!(resources.device_id(), 0);
    /// # Ok::<(), ivfpq_gpu::error::IvfPqError>(())
    /// ```
    pub fn new(device_id: i32) -> IvfPqResult<Self> {
        Self::with_config(device_id, DeviceCapability::default(), GpuMemoryConfig::default())
    }

    /// Allocate resources with an explicit capability and memory budget.
    pub fn with_config(
        device_id: i32,
        capability: DeviceCapability,
        memory_config: GpuMemoryConfig,
    ) -> IvfPqResult<Self> {
        let memory = GpuMemoryManager::new(memory_config)?;
        tracing::debug!(
            device_id,
            device = %capability.name,
            budget = memory.budget(),
            "Accelerator resources created"
        );
        Ok(Self {
            device_id,
            capability,
            memory,
        })
    }

    /// Get the device ordinal.
    #[inline]
    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Get the device capability descriptor.
    #[inline]
    pub fn capability(&self) -> &DeviceCapability {
        &self.capability
    }

    /// Get the device memory pool.
    #[inline]
    pub fn memory(&self) -> &GpuMemoryManager {
        &self.memory
    }

    /// Make this device current until the returned scope is dropped.
    #[inline]
    pub fn enter(&self) -> DeviceScope {
        DeviceScope::enter(self.device_id)
    }
}

impl std::fmt::Debug for GpuResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuResources")
            .field("device_id", &self.device_id)
            .field("device", &self.capability.name)
            .field("memory", &self.memory)
            .finish()
    }
}

/// Create a shared resources handle.
///
/// Convenience function for creating `Arc<GpuResources>`.
pub fn create_shared_resources(device_id: i32) -> IvfPqResult<Arc<GpuResources>> {
    Ok(Arc::new(GpuResources::new(device_id)?))
}
