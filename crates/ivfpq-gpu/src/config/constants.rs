//! Limits of the accelerator IVF-PQ engine.
//!
//! These sets mirror the kernel instantiations available on the device.
//! A configuration outside them cannot be executed and is rejected up front.

/// Sub-quantizer counts (bytes per encoded vector) with a compiled scan kernel.
pub const SUPPORTED_SUB_QUANTIZERS: &[usize] = &[
    1, 2, 3, 4, 8, 12, 16, 20, 24, 28, 32, 40, 48, 56, 64, 96,
];

/// Sub-vector dimensions (D / M) supported when precomputed tables are off.
/// Residual lookup tables are built on the fly and need a matching kernel.
pub const SUPPORTED_NO_PRECOMPUTE_DIMS: &[usize] = &[1, 2, 3, 4, 6, 8, 10, 12, 16, 20, 24, 28, 32];

/// Widest sub-code the engine stores (one byte per sub-quantizer).
pub const MAX_BITS_PER_CODE: u32 = 8;

/// Per-block on-chip scratch available to a scan kernel (48KB).
pub const DEFAULT_SHARED_MEM_PER_BLOCK: usize = 48 * 1024;

/// Largest k / nprobe the selection kernels handle.
pub const MAX_SELECTION_K: usize = 2048;

/// Sub-quantizer training uses at most this many vectors per centroid.
pub const PQ_SAMPLES_PER_CENTROID: usize = 64;

/// Label used for empty result slots.
pub const SENTINEL_LABEL: i64 = -1;
