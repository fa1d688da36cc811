//! Host-emulated accelerator device layer.
//!
//! - `capability` - Hardware limits consulted by config validation
//! - `context` - Scoped current-device selection (RAII)
//! - `memory` - Budgeted memory pool with drop-to-free handles
//! - `resources` - Shared per-device resources (`Arc<GpuResources>`)

pub mod capability;
pub mod context;
pub mod memory;
pub mod resources;

pub use capability::DeviceCapability;
pub use context::{current_device, DeviceScope};
pub use memory::{AllocationHandle, GpuMemoryConfig, GpuMemoryManager, MemoryCategory, MemoryStats};
pub use resources::{create_shared_resources, GpuResources};
