//! IVF and PQ index configuration.

use serde::{Deserialize, Serialize};

use super::constants::PQ_SAMPLES_PER_CENTROID;
use super::metric::{IdStorage, LookupPrecision, MemorySpace, MetricType};

/// Configuration shared by every IVF index regardless of list encoding.
///
/// # Defaults
/// - `dimension`: 1536
/// - `nlist`: 16384 (4 * sqrt(16M))
/// - `nprobe`: 128
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IvfConfig {
    /// Vector dimension.
    pub dimension: usize,

    /// Number of inverted lists (coarse cells).
    pub nlist: usize,

    /// Number of cells probed per query.
    pub nprobe: usize,

    /// Distance metric. Only `L2` passes validation.
    pub metric: MetricType,

    /// How user ids are stored.
    pub id_storage: IdStorage,

    /// Placement hint for list storage.
    pub memory_space: MemorySpace,

    /// Accelerator device ordinal.
    pub device_id: i32,

    /// k-means iterations for coarse and sub-quantizer training.
    pub kmeans_iterations: usize,

    /// Seed for k-means initialisation.
    pub seed: u64,
}

impl Default for IvfConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            nlist: 16384,
            nprobe: 128,
            metric: MetricType::L2,
            id_storage: IdStorage::Int64,
            memory_space: MemorySpace::Device,
            device_id: 0,
            kmeans_iterations: 25,
            seed: 1234,
        }
    }
}

impl IvfConfig {
    /// Create a config with the given shape and default everything else.
    pub fn new(dimension: usize, nlist: usize) -> Self {
        Self {
            dimension,
            nlist,
            nprobe: nlist.clamp(1, 128),
            ..Default::default()
        }
    }

    /// Set nprobe (builder pattern).
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }

    /// Set the id storage mode (builder pattern).
    pub fn with_id_storage(mut self, id_storage: IdStorage) -> Self {
        self.id_storage = id_storage;
        self
    }

    /// Set the seed (builder pattern).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Minimum training vectors for the coarse quantizer (one per list).
    #[inline]
    pub fn min_train_vectors(&self) -> usize {
        self.nlist
    }
}

/// Product quantizer parameters.
///
/// # Defaults
/// - `sub_quantizers`: 64 (1536 / 64 = 24 dims per sub-vector)
/// - `bits_per_code`: 8
/// - `use_precomputed_tables`: false
/// - `lookup_precision`: Float16
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PqParams {
    /// Number of sub-quantizers (M). Bytes per encoded vector.
    pub sub_quantizers: usize,

    /// Bits per sub-code (B). At most 8.
    pub bits_per_code: u32,

    /// Use precomputed coarse/sub-centroid term tables at query time.
    pub use_precomputed_tables: bool,

    /// Lookup table precision in on-chip scratch.
    pub lookup_precision: LookupPrecision,
}

impl Default for PqParams {
    fn default() -> Self {
        Self {
            sub_quantizers: 64,
            bits_per_code: 8,
            use_precomputed_tables: false,
            lookup_precision: LookupPrecision::Float16,
        }
    }
}

impl PqParams {
    /// Create PQ params with M sub-quantizers of B bits each.
    pub fn new(sub_quantizers: usize, bits_per_code: u32) -> Self {
        Self {
            sub_quantizers,
            bits_per_code,
            ..Default::default()
        }
    }

    /// Set the precomputed table flag (builder pattern).
    pub fn with_precomputed_tables(mut self, enabled: bool) -> Self {
        self.use_precomputed_tables = enabled;
        self
    }

    /// Set the lookup precision (builder pattern).
    pub fn with_lookup_precision(mut self, precision: LookupPrecision) -> Self {
        self.lookup_precision = precision;
        self
    }

    /// Number of centroids per sub-quantizer (2^B).
    ///
    /// Saturates instead of overflowing so that an unvalidated B can still
    /// be reported in an error.
    #[inline]
    pub fn ksub(&self) -> usize {
        1usize.checked_shl(self.bits_per_code).unwrap_or(usize::MAX)
    }

    /// On-chip scratch bytes needed for one query's lookup table.
    #[inline]
    pub fn scratch_bytes(&self) -> usize {
        self.lookup_precision
            .elem_size()
            .saturating_mul(self.sub_quantizers)
            .saturating_mul(self.ksub())
    }

    /// Maximum vectors used to train the sub-quantizers (64 per centroid).
    #[inline]
    pub fn max_training_samples(&self) -> usize {
        self.ksub().saturating_mul(PQ_SAMPLES_PER_CENTROID)
    }

    /// Generate the factory string for this encoding over `nlist` cells.
    ///
    /// Returns format: "IVF{nlist},PQ{M}x{B}"
    ///
    /// # Example
    /// ```
    /// use ivfpq_gpu::config::PqParams;
    /// assert_eq!(PqParams::default().factory_string(16384), "IVF16384,PQ64x8");
    /// ```
    pub fn factory_string(&self, nlist: usize) -> String {
        format!("IVF{},PQ{}x{}", nlist, self.sub_quantizers, self.bits_per_code)
    }
}
