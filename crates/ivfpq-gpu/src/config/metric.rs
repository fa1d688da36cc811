//! Enumerations shared by index configuration and the host mirror.

use serde::{Deserialize, Serialize};

// ========== Metric Type ==========

/// Metric type for distance computation.
///
/// Only `L2` (squared Euclidean) is accepted by the validator; the other
/// variant exists so that mirrors produced elsewhere can be rejected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MetricType {
    /// Inner product. Higher values = more similar.
    InnerProduct,

    /// Squared L2 distance. Lower values = more similar.
    #[default]
    L2,
}

// ========== Id Storage ==========

/// How user-supplied vector ids are kept alongside the inverted lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IdStorage {
    /// 64-bit ids stored on the device next to the codes.
    #[default]
    Int64,
    /// Ids narrowed to 32 bits on the device. Ids outside the i32 range are
    /// rejected by `add`.
    Int32,
    /// Ids kept in host memory only; the device holds codes.
    Host,
    /// User ids are discarded. Search labels encode `(list << 32) | offset`.
    ListOffset,
}

impl IdStorage {
    /// Whether the original user ids can be recovered from the index.
    #[inline]
    pub const fn retains_ids(&self) -> bool {
        !matches!(self, IdStorage::ListOffset)
    }

    /// Device bytes used per stored id.
    #[inline]
    pub const fn device_bytes(&self) -> usize {
        match self {
            IdStorage::Int64 => 8,
            IdStorage::Int32 => 4,
            IdStorage::Host | IdStorage::ListOffset => 0,
        }
    }
}

// ========== Lookup Precision ==========

/// Numeric precision of the per-query lookup tables held in on-chip scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LookupPrecision {
    Float32,
    #[default]
    Float16,
}

impl LookupPrecision {
    /// Bytes per lookup table element.
    #[inline]
    pub const fn elem_size(&self) -> usize {
        match self {
            LookupPrecision::Float32 => 4,
            LookupPrecision::Float16 => 2,
        }
    }
}

// ========== Memory Space ==========

/// Placement hint for inverted list storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemorySpace {
    /// Plain device memory.
    #[default]
    Device,
    /// Unified (host-pageable) memory. List storage is accounted in the
    /// pool but may over-subscribe its budgets.
    Unified,
}
