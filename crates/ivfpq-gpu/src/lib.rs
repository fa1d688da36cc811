//! Accelerator-resident IVF-PQ approximate nearest neighbour index
//!
//! An inverted-file index whose lists hold product-quantized residuals,
//! driven through a device abstraction that owns list storage, centroid
//! tensors and per-call staging memory.
//!
//! # Architecture
//!
//! - **config**: IVF and PQ parameters plus ordered validation
//! - **device**: Capability descriptor, scoped device selection, memory pool
//! - **quantizer**: k-means, flat L2 coarse quantizer, product quantizer
//! - **engine**: Inverted lists, list codecs, classify/add and probe/scan
//! - **index**: `GpuIndexIvf` lifecycle (train, add, search, list access)
//! - **mirror**: Host-side index used for import and export
//! - **error**: `IvfPqError` / `IvfPqResult`
//!
//! # Example
//!
//! ```
//! use ivfpq_gpu::config::{IvfConfig, PqParams};
//! use ivfpq_gpu::device::create_shared_resources;
//! use ivfpq_gpu::index::{GpuIndexIvfPq, PqEncoding};
//!
//! fn example() -> ivfpq_gpu::IvfPqResult<()> {
//!     let resources = create_shared_resources(0)?;
//!     let mut index = GpuIndexIvfPq::new(
//!         resources,
//!         IvfConfig::new(8, 2),
//!         PqEncoding::new(PqParams::new(2, 4)),
//!     )?;
//!
//!     let data: Vec<f32> = (0..64 * 8).map(|i| ((i * 37) % 101) as f32 / 101.0).collect();
//!     index.train(&data)?;
//!     assert_eq!(index.add(&data)?, 64);
//!
//!     let result = index.search(&data[..8], 4)?;
//!     assert_eq!(result.len(), 1);
//!     assert!(result.has_results(0));
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod index;
pub mod mirror;
pub mod quantizer;

// Re-exports for convenience
pub use config::{IdStorage, IvfConfig, LookupPrecision, MemorySpace, MetricType, PqParams};
pub use device::{
    create_shared_resources, AllocationHandle, DeviceCapability, GpuMemoryConfig,
    GpuMemoryManager, GpuResources, MemoryCategory, MemoryStats,
};
pub use error::{IvfPqError, IvfPqResult};
pub use index::{
    EncodingStrategy, FlatEncoding, GpuIndexIvf, GpuIndexIvfFlat, GpuIndexIvfPq, ImportOptions,
    PqEncoding, SearchHit, SearchResult,
};
pub use mirror::{HostInvertedList, HostIvfPqIndex, PqMirrorParams};
pub use quantizer::{CoarseQuantizer, FlatL2Quantizer, ProductQuantizer};
