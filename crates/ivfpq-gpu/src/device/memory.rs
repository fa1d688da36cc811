//! Budgeted device memory pool.
//!
//! Every device-side buffer the index owns (list storage, centroid tensors,
//! precomputed tables, per-call staging) is obtained as an
//! [`AllocationHandle`] from a [`GpuMemoryManager`]. Dropping the handle
//! returns the bytes to the pool, so staging buffers are released at the end
//! of each call regardless of outcome.
//!
//! # Default Budget
//!
//! ```text
//! +--------------------+--------+
//! | Inverted Lists     | 4GB    |
//! | Centroids          | 1GB    |
//! | Precomputed Tables | 1GB    |
//! | Staging            | 1.5GB  |
//! | Other              | 512MB  |
//! +--------------------+--------+
//! | Device total       | 8GB    |
//! +--------------------+--------+
//! ```
//!
//! Category budgets may sum past the device total; a request must fit both.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{IvfPqError, IvfPqResult};

const MB: usize = 1024 * 1024;

/// What a device allocation holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryCategory {
    /// Encoded vectors and ids of the inverted lists.
    InvertedLists,
    /// Coarse and PQ centroid tensors.
    Centroids,
    /// Precomputed coarse/sub-centroid term tables.
    PrecomputedTables,
    /// Per-call staging of inputs and results.
    Staging,
    Other,
}

impl MemoryCategory {
    /// All categories, in reporting order.
    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::InvertedLists,
        MemoryCategory::Centroids,
        MemoryCategory::PrecomputedTables,
        MemoryCategory::Staging,
        MemoryCategory::Other,
    ];

    /// Slot in [`ALL`](Self::ALL).
    #[inline]
    const fn slot(self) -> usize {
        match self {
            MemoryCategory::InvertedLists => 0,
            MemoryCategory::Centroids => 1,
            MemoryCategory::PrecomputedTables => 2,
            MemoryCategory::Staging => 3,
            MemoryCategory::Other => 4,
        }
    }

    /// Budget applied when the config has no override.
    pub const fn default_budget(&self) -> usize {
        match self {
            MemoryCategory::InvertedLists => 4096 * MB,
            MemoryCategory::Centroids | MemoryCategory::PrecomputedTables => 1024 * MB,
            MemoryCategory::Staging => 1536 * MB,
            MemoryCategory::Other => 512 * MB,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            MemoryCategory::InvertedLists => "Inverted Lists",
            MemoryCategory::Centroids => "Centroids",
            MemoryCategory::PrecomputedTables => "Precomputed Tables",
            MemoryCategory::Staging => "Staging",
            MemoryCategory::Other => "Other",
        }
    }
}

/// Device memory owned until dropped.
pub struct AllocationHandle {
    id: u64,
    size: usize,
    category: MemoryCategory,
    pool: Arc<Mutex<PoolState>>,
}

impl AllocationHandle {
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn category(&self) -> MemoryCategory {
        self.category
    }

    /// Pool-unique allocation id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shrink the allocation in place to `size` bytes. Never fails; a
    /// `size` at or above the current size is a no-op.
    pub fn shrink_to(&mut self, size: usize) {
        if size < self.size {
            self.pool.lock().shrink(self.id, self.size - size);
            self.size = size;
        }
    }
}

impl Drop for AllocationHandle {
    fn drop(&mut self) {
        self.pool.lock().release(self.id);
    }
}

impl std::fmt::Debug for AllocationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationHandle")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("category", &self.category)
            .finish()
    }
}

/// Pool limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuMemoryConfig {
    /// Device total in bytes. Default: 8GB
    pub total_budget: usize,

    /// Per-category overrides in bytes.
    pub category_budgets: HashMap<MemoryCategory, usize>,

    /// Let requests exceed the budgets, as unified memory pages to the host
    /// instead of failing. Default: false
    pub oversubscribe: bool,

    /// Usage fraction in (0, 1] above which the pool reports low memory.
    /// Default: 0.9
    pub low_memory_threshold: f32,
}

impl Default for GpuMemoryConfig {
    fn default() -> Self {
        Self {
            total_budget: 8192 * MB,
            category_budgets: HashMap::new(),
            oversubscribe: false,
            low_memory_threshold: 0.9,
        }
    }
}

impl GpuMemoryConfig {
    /// Default config with a different device total.
    pub fn with_budget(total_bytes: usize) -> Self {
        Self {
            total_budget: total_bytes,
            ..Default::default()
        }
    }

    /// Override one category's budget (builder pattern).
    pub fn category_budget(mut self, category: MemoryCategory, bytes: usize) -> Self {
        self.category_budgets.insert(category, bytes);
        self
    }

    /// Allow oversubscription (builder pattern).
    pub fn with_oversubscription(mut self, enabled: bool) -> Self {
        self.oversubscribe = enabled;
        self
    }

    /// Effective budget of `category`.
    pub fn budget_for(&self, category: MemoryCategory) -> usize {
        self.category_budgets
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_budget())
    }

    pub fn validate(&self) -> IvfPqResult<()> {
        if self.total_budget == 0 {
            return Err(IvfPqError::config("total_budget > 0", self.total_budget));
        }
        if !(self.low_memory_threshold > 0.0 && self.low_memory_threshold <= 1.0) {
            return Err(IvfPqError::config(
                "low_memory_threshold in (0, 1]",
                self.low_memory_threshold,
            ));
        }
        Ok(())
    }
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_allocated: usize,
    pub total_budget: usize,
    /// Live allocations.
    pub allocation_count: usize,
    /// High-water mark of `total_allocated`.
    pub peak_usage: usize,
    pub category_usage: HashMap<MemoryCategory, usize>,
    pub category_budget: HashMap<MemoryCategory, usize>,
}

impl MemoryStats {
    /// Usage as a percentage of the device total (0-100).
    pub fn usage_percent(&self) -> f32 {
        if self.total_budget == 0 {
            return 0.0;
        }
        self.total_allocated as f32 / self.total_budget as f32 * 100.0
    }

    /// Whether usage is above `threshold` (a fraction).
    pub fn is_low_memory(&self, threshold: f32) -> bool {
        self.usage_percent() / 100.0 > threshold
    }

    pub fn available(&self) -> usize {
        self.total_budget.saturating_sub(self.total_allocated)
    }

    /// Bytes in use for `category`.
    pub fn usage_of(&self, category: MemoryCategory) -> usize {
        self.category_usage.get(&category).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    size: usize,
    category: MemoryCategory,
}

struct PoolState {
    config: GpuMemoryConfig,
    live: HashMap<u64, Allocation>,
    usage: [usize; MemoryCategory::ALL.len()],
    total: usize,
    peak: usize,
    next_id: u64,
}

impl PoolState {
    fn new(config: GpuMemoryConfig) -> Self {
        Self {
            config,
            live: HashMap::new(),
            usage: [0; MemoryCategory::ALL.len()],
            total: 0,
            peak: 0,
            next_id: 0,
        }
    }

    /// Check `size` more bytes of `category` against both budgets.
    fn admit(&self, size: usize, category: MemoryCategory) -> IvfPqResult<()> {
        if self.config.oversubscribe {
            return Ok(());
        }
        let total_after = self.total.saturating_add(size);
        if total_after > self.config.total_budget {
            return Err(IvfPqError::GpuResourceAllocation(format!(
                "{} bytes of {} would exceed total budget ({}/{} bytes used)",
                size,
                category.name(),
                self.total,
                self.config.total_budget
            )));
        }
        let used = self.usage[category.slot()];
        let budget = self.config.budget_for(category);
        if used.saturating_add(size) > budget {
            return Err(IvfPqError::GpuResourceAllocation(format!(
                "{} bytes of {} would exceed category budget ({}/{} bytes used)",
                size,
                category.name(),
                used,
                budget
            )));
        }
        Ok(())
    }

    fn reserve(&mut self, size: usize, category: MemoryCategory) -> IvfPqResult<u64> {
        self.admit(size, category)?;
        Ok(self.record(size, category))
    }

    /// Account `size` bytes of `category` with no budget check.
    fn record(&mut self, size: usize, category: MemoryCategory) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.live.insert(id, Allocation { size, category });
        self.usage[category.slot()] += size;
        self.total += size;
        self.peak = self.peak.max(self.total);
        id
    }

    fn shrink(&mut self, id: u64, by: usize) {
        if let Some(a) = self.live.get_mut(&id) {
            let by = by.min(a.size);
            a.size -= by;
            self.total = self.total.saturating_sub(by);
            let slot = &mut self.usage[a.category.slot()];
            *slot = slot.saturating_sub(by);
        }
    }

    fn release(&mut self, id: u64) {
        if let Some(a) = self.live.remove(&id) {
            self.total = self.total.saturating_sub(a.size);
            let slot = &mut self.usage[a.category.slot()];
            *slot = slot.saturating_sub(a.size);
        }
    }

    fn stats(&self) -> MemoryStats {
        MemoryStats {
            total_allocated: self.total,
            total_budget: self.config.total_budget,
            allocation_count: self.live.len(),
            peak_usage: self.peak,
            category_usage: MemoryCategory::ALL
                .iter()
                .filter(|c| self.usage[c.slot()] > 0)
                .map(|&c| (c, self.usage[c.slot()]))
                .collect(),
            category_budget: MemoryCategory::ALL
                .iter()
                .map(|&c| (c, self.config.budget_for(c)))
                .collect(),
        }
    }
}

/// Device memory pool.
///
/// Cloning yields another handle to the same pool. All methods lock an
/// internal mutex, so the pool can be shared across threads.
///
/// # Example
///
/// ```rust
/// use ivfpq_gpu::device::memory::{GpuMemoryConfig, GpuMemoryManager, MemoryCategory};
///
/// let manager = GpuMemoryManager::new(GpuMemoryConfig::with_budget(1 << 20)).unwrap();
/// let handle = manager.allocate(4096, MemoryCategory::Staging).unwrap();
/// assert_eq!(manager.used(), 4096);
/// drop(handle);
/// assert_eq!(manager.used(), 0);
/// ```
#[derive(Clone)]
pub struct GpuMemoryManager {
    pool: Arc<Mutex<PoolState>>,
}

impl GpuMemoryManager {
    /// # Errors
    ///
    /// `Configuration` if the config fails validation.
    pub fn new(config: GpuMemoryConfig) -> IvfPqResult<Self> {
        config.validate()?;
        Ok(Self {
            pool: Arc::new(Mutex::new(PoolState::new(config))),
        })
    }

    /// Reserve `size` bytes for `category`.
    ///
    /// # Errors
    ///
    /// `GpuResourceAllocation` if the request exceeds the device total or
    /// the category budget (unless oversubscription is enabled).
    pub fn allocate(&self, size: usize, category: MemoryCategory) -> IvfPqResult<AllocationHandle> {
        let id = self.pool.lock().reserve(size, category)?;
        Ok(self.handle(id, size, category))
    }

    /// Reserve `size` bytes for `category` without checking either budget.
    ///
    /// Models unified memory: the bytes are accounted (and count toward
    /// later budget checks) but may over-subscribe the device.
    pub fn allocate_unbudgeted(&self, size: usize, category: MemoryCategory) -> AllocationHandle {
        let id = self.pool.lock().record(size, category);
        self.handle(id, size, category)
    }

    fn handle(&self, id: u64, size: usize, category: MemoryCategory) -> AllocationHandle {
        AllocationHandle {
            id,
            size,
            category,
            pool: Arc::clone(&self.pool),
        }
    }

    /// Like [`allocate`](Self::allocate), `None` on failure.
    pub fn try_allocate(&self, size: usize, category: MemoryCategory) -> Option<AllocationHandle> {
        self.allocate(size, category).ok()
    }

    /// Unallocated bytes of the device total.
    pub fn available(&self) -> usize {
        let pool = self.pool.lock();
        pool.config.total_budget.saturating_sub(pool.total)
    }

    pub fn used(&self) -> usize {
        self.pool.lock().total
    }

    pub fn budget(&self) -> usize {
        self.pool.lock().config.total_budget
    }

    pub fn stats(&self) -> MemoryStats {
        self.pool.lock().stats()
    }

    /// Usage above the configured low-memory threshold.
    pub fn is_low_memory(&self) -> bool {
        let pool = self.pool.lock();
        pool.total as f32 / pool.config.total_budget as f32 > pool.config.low_memory_threshold
    }

    /// Unallocated bytes of `category`'s budget.
    pub fn category_available(&self, category: MemoryCategory) -> usize {
        let pool = self.pool.lock();
        pool.config
            .budget_for(category)
            .saturating_sub(pool.usage[category.slot()])
    }
}

impl std::fmt::Debug for GpuMemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("GpuMemoryManager")
            .field("used", &stats.total_allocated)
            .field("budget", &stats.total_budget)
            .field("allocations", &stats.allocation_count)
            .field("peak", &stats.peak_usage)
            .finish()
    }
}
