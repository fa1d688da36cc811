//! Accelerator IVF index with pluggable list encodings.
//!
//! # Architecture
//!
//! ```text
//! encoding.rs     - EncodingStrategy: PQ and flat list encodings
//! gpu_index/      - GpuIndexIvf orchestrator (train, add, search, sync)
//! search_result/  - k-NN output types
//! ```
//!
//! # Memory Footprint
//!
//! For 1M 1536-D vectors with PQ64x8 and 64-bit ids:
//! - Codes: 1M * 64 bytes = 64MB
//! - Ids: 1M * 8 bytes = 8MB
//! - Coarse centroids: 16384 * 1536 * 4 bytes = 100MB

pub mod encoding;
pub mod gpu_index;
pub mod search_result;

pub use encoding::{EncodingStrategy, FlatEncoding, PqEncoding};
pub use gpu_index::{GpuIndexIvf, GpuIndexIvfFlat, GpuIndexIvfPq, ImportOptions, IndexState};
pub use search_result::{SearchHit, SearchResult};
