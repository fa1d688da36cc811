//! Accelerator IVF index.
//!
//! The index is an orchestrator: it validates configuration, trains the
//! coarse quantizer and the list codec, and dispatches add and search to
//! the device engine it owns once trained.
//!
//! # Module Organization
//!
//! - `index` - Core structure, construction, encoding transitions
//! - `training` - Two-stage training
//! - `operations` - Add and search
//! - `lists` - List accessors, reclaim, reset, reserve
//! - `sync` - Host mirror import and export (PQ)

mod index;
mod lists;
mod operations;
mod sync;
mod training;


pub use index::{GpuIndexIvf, GpuIndexIvfFlat, GpuIndexIvfPq, IndexState};
pub use sync::ImportOptions;
