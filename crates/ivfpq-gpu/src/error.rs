//! Error types for IVF-PQ index operations.
//!
//! Every fallible operation in this crate returns [`IvfPqResult`]. Errors are
//! raised before any mutation of index state, so a caller may retry with
//! corrected input and the index stays consistent.
//!
//! Per-vector encode failures during `add` are not errors: those vectors are
//! excluded from the inserted count.

use thiserror::Error;

use crate::config::{IdStorage, MetricType};

/// Result type alias for index operations.
pub type IvfPqResult<T> = Result<T, IvfPqError>;

/// Error type for all index operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IvfPqError {
    // ========== Configuration Errors ==========
    /// A configuration constraint was violated. Names the first violated
    /// constraint and the offending value.
    #[error("Invalid configuration: {constraint} (got {value})")]
    Configuration {
        constraint: &'static str,
        value: String,
    },

    /// Only squared Euclidean distance is supported.
    #[error("Unsupported metric {0:?}: only L2 is supported")]
    UnsupportedMetric(MetricType),

    /// Export requires the original vector ids to be retained.
    #[error("Cannot export index: id storage mode {mode:?} does not retain user ids")]
    UnsupportedExport { mode: IdStorage },

    /// The mirror uses an encoding the device engine cannot represent.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    // ========== State Errors ==========
    /// Operation requires a trained index.
    #[error("Index not trained - must call train() before add/search/list access")]
    IndexNotTrained,

    /// Index state violated an internal invariant.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Too few vectors for a k-means training stage.
    #[error("Insufficient training data: need at least {required} vectors, got {provided}")]
    InsufficientTrainingData { required: usize, provided: usize },

    // ========== Capacity Errors ==========
    /// An inverted list would exceed the engine's per-list limit.
    #[error("Inverted list {list} exceeds per-list limit: {actual} entries > {limit}")]
    CapacityExceeded {
        list: usize,
        limit: usize,
        actual: usize,
    },

    /// Device memory allocation failed.
    #[error("GPU resource allocation failed: {0}")]
    GpuResourceAllocation(String),

    // ========== Mirror Errors ==========
    /// The host mirror is structurally invalid.
    #[error("Corrupt host mirror: {0}")]
    CorruptMirror(String),

    // ========== Input Errors ==========
    /// Dimension mismatch between input and index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid input provided to a function.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl IvfPqError {
    /// Build a configuration error from a constraint and offending value.
    pub(crate) fn config(constraint: &'static str, value: impl ToString) -> Self {
        IvfPqError::Configuration {
            constraint,
            value: value.to_string(),
        }
    }
}

static_assertions::assert_impl_all!(IvfPqError: Send, Sync, std::error::Error);
