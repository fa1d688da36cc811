//! Host-emulated device IVF engine.
//!
//! [`IvfEngine`] owns the inverted lists and runs the add and search
//! kernels. Kernels are data-parallel over rayon (per vector on add, per
//! query on search) and complete before the call returns.
//!
//! List encodings plug in through [`ListCodec`]:
//! - `pq_codec` - M one-byte PQ sub-codes, LUT distances
//! - `flat_codec` - raw `f32` residuals
//!
//! Every byte of list storage and precomputed tables is accounted in the
//! shared [`GpuMemoryManager`](crate::device::GpuMemoryManager). Reservations
//! are always obtained before lists are mutated, so an allocation failure
//! leaves the engine exactly as it was.

mod flat_codec;
mod list;
mod pq_codec;


use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::constants::SENTINEL_LABEL;
use crate::config::{IdStorage, MemorySpace};
use crate::device::{AllocationHandle, GpuResources, MemoryCategory};
use crate::error::{IvfPqError, IvfPqResult};
use crate::quantizer::CentroidTable;

pub use flat_codec::FlatCodec;
pub use pq_codec::{PqCodec, PqScratch};

pub(crate) use list::offset_label;
use list::InvertedList;

/// Encoding of list entries and the matching distance kernel.
pub trait ListCodec: Send + Sync + std::fmt::Debug {
    /// Per-query working memory, reused across the probed lists of a query.
    type Scratch: Send;

    /// Bytes per encoded vector.
    fn code_size(&self) -> usize;

    /// Device bytes for codec parameters (e.g. PQ centroids).
    fn device_bytes(&self) -> usize;

    /// Encode a residual into `code` (`code_size` bytes).
    fn encode(&self, residual: &[f32], code: &mut [u8]);

    fn scratch(&self) -> Self::Scratch;

    /// Query-level setup done once before any list is scanned.
    fn prepare_query(&self, query: &[f32], scratch: &mut Self::Scratch);

    /// Push the squared L2 distance of every code in `codes` to `out`.
    ///
    /// `coarse_dist` is `||query - centroid||^2` for cell `list`.
    #[allow(clippy::too_many_arguments)]
    fn scan_list(
        &self,
        scratch: &mut Self::Scratch,
        query: &[f32],
        list: usize,
        coarse_dist: f32,
        centroid: &[f32],
        codes: &[u8],
        out: &mut Vec<f32>,
    );

    /// Bytes of the precomputed term table for `nlist` cells.
    fn precomputed_table_bytes(&self, _nlist: usize) -> usize {
        0
    }

    /// Build or drop precomputed term tables.
    fn set_precomputed(&mut self, _enabled: bool, _coarse: &CentroidTable) {}

    fn uses_precomputed(&self) -> bool {
        false
    }
}

/// Scored search candidate. Orders by distance, then label.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    label: i64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.label.cmp(&other.label))
    }
}

/// Inverted-file engine over one coarse centroid table.
pub struct IvfEngine<C: ListCodec> {
    resources: Arc<GpuResources>,
    coarse: CentroidTable,
    codec: C,
    id_storage: IdStorage,
    memory_space: MemorySpace,
    max_list_len: usize,
    lists: Vec<InvertedList>,
    _centroid_storage: AllocationHandle,
    precomputed_storage: Option<AllocationHandle>,
}

impl<C: ListCodec> IvfEngine<C> {
    /// Build an engine with empty lists.
    ///
    /// # Errors
    ///
    /// - `GpuResourceAllocation` if centroid storage cannot be reserved
    /// - `InternalInconsistency` if the codec has a zero code size
    pub fn new(
        resources: Arc<GpuResources>,
        coarse: CentroidTable,
        codec: C,
        id_storage: IdStorage,
        max_list_len: usize,
    ) -> IvfPqResult<Self> {
        if codec.code_size() == 0 {
            return Err(IvfPqError::InternalInconsistency(
                "list codec reports a zero code size".to_string(),
            ));
        }
        let centroid_storage = resources.memory().allocate(
            coarse.device_bytes() + codec.device_bytes(),
            MemoryCategory::Centroids,
        )?;
        let lists = (0..coarse.nlist()).map(|_| InvertedList::new(id_storage)).collect();
        tracing::debug!(
            nlist = coarse.nlist(),
            code_size = codec.code_size(),
            ?id_storage,
            "IVF engine created"
        );
        Ok(Self {
            resources,
            coarse,
            codec,
            id_storage,
            memory_space: MemorySpace::Device,
            max_list_len,
            lists,
            _centroid_storage: centroid_storage,
            precomputed_storage: None,
        })
    }

    /// Place list storage in `space`. `Unified` list storage is accounted
    /// in the pool but not held to its budgets.
    pub fn with_memory_space(mut self, space: MemorySpace) -> Self {
        self.memory_space = space;
        self
    }

    #[inline]
    pub fn nlist(&self) -> usize {
        self.lists.len()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.coarse.dimension()
    }

    #[inline]
    pub fn code_size(&self) -> usize {
        self.codec.code_size()
    }

    #[inline]
    pub fn id_storage(&self) -> IdStorage {
        self.id_storage
    }

    #[inline]
    pub fn memory_space(&self) -> MemorySpace {
        self.memory_space
    }

    #[inline]
    pub fn coarse(&self) -> &CentroidTable {
        &self.coarse
    }

    #[inline]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Total entries across all lists.
    pub fn ntotal(&self) -> usize {
        self.lists.iter().map(InvertedList::len).sum()
    }

    /// Bytes currently reserved for list storage.
    pub fn reserved_bytes(&self) -> usize {
        self.lists.iter().map(InvertedList::reserved_bytes).sum()
    }

    #[inline]
    fn bytes_per_entry(&self) -> usize {
        self.codec.code_size() + self.id_storage.device_bytes()
    }

    fn check_list(&self, list: usize) -> IvfPqResult<&InvertedList> {
        self.lists.get(list).ok_or_else(|| {
            IvfPqError::InvalidInput(format!("list {} out of range (nlist {})", list, self.nlist()))
        })
    }

    /// Ids must be representable in the storage mode, and `-1` is reserved
    /// for empty result slots in every mode that keeps ids.
    fn check_ids(&self, ids: &[i64]) -> IvfPqResult<()> {
        if self.id_storage.retains_ids() && ids.contains(&SENTINEL_LABEL) {
            return Err(IvfPqError::InvalidInput(format!(
                "id {} is reserved for empty result slots",
                SENTINEL_LABEL
            )));
        }
        if self.id_storage == IdStorage::Int32 {
            if let Some(bad) = ids.iter().find(|&&id| i32::try_from(id).is_err()) {
                return Err(IvfPqError::InvalidInput(format!(
                    "id {} does not fit 32-bit id storage",
                    bad
                )));
            }
        }
        Ok(())
    }

    /// Reserve pool storage for the growth in `plan` (list, new capacity).
    /// Nothing is installed; dropping the result releases everything.
    fn allocate_growth(&self, plan: &[(usize, usize)]) -> IvfPqResult<Vec<(usize, usize, AllocationHandle)>> {
        let bpe = self.bytes_per_entry();
        plan.iter()
            .map(|&(list, capacity)| {
                let handle = self.allocate_list_storage(capacity * bpe)?;
                Ok((list, capacity, handle))
            })
            .collect()
    }

    fn allocate_list_storage(&self, bytes: usize) -> IvfPqResult<AllocationHandle> {
        let memory = self.resources.memory();
        match self.memory_space {
            MemorySpace::Device => memory.allocate(bytes, MemoryCategory::InvertedLists),
            MemorySpace::Unified => {
                Ok(memory.allocate_unbudgeted(bytes, MemoryCategory::InvertedLists))
            }
        }
    }

    fn install_growth(&mut self, grown: Vec<(usize, usize, AllocationHandle)>) {
        let code_size = self.codec.code_size();
        for (list, capacity, handle) in grown {
            self.lists[list].install(capacity, Some(handle), code_size);
        }
    }

    /// Reserve room for `n` more vectors spread evenly, `n / nlist` per list.
    pub fn reserve_memory(&mut self, n: usize) -> IvfPqResult<()> {
        let per_list = n / self.nlist().max(1);
        if per_list == 0 {
            return Ok(());
        }
        let plan: Vec<(usize, usize)> = self
            .lists
            .iter()
            .enumerate()
            .filter(|(_, l)| l.capacity() < per_list)
            .map(|(i, _)| (i, per_list))
            .collect();
        let grown = self.allocate_growth(&plan)?;
        self.install_growth(grown);
        tracing::debug!(per_list, lists = plan.len(), "Reserved list storage");
        Ok(())
    }

    /// Enable or disable precomputed term tables.
    pub fn set_precomputed(&mut self, enabled: bool) -> IvfPqResult<()> {
        if enabled == self.codec.uses_precomputed() {
            return Ok(());
        }
        let storage = if enabled {
            let bytes = self.codec.precomputed_table_bytes(self.nlist());
            Some(
                self.resources
                    .memory()
                    .allocate(bytes, MemoryCategory::PrecomputedTables)?,
            )
        } else {
            None
        };
        self.codec.set_precomputed(enabled, &self.coarse);
        self.precomputed_storage = storage;
        tracing::debug!(enabled, "Precomputed tables updated");
        Ok(())
    }

    /// Classify, encode and append `vectors` with their `ids`.
    ///
    /// Returns the number of vectors inserted. Vectors with non-finite
    /// components cannot be classified and are skipped without error.
    ///
    /// # Errors
    ///
    /// All raised before any list is modified:
    /// - `InvalidInput` for ids outside the storage mode's range
    /// - `CapacityExceeded` if a list would pass the per-list limit
    /// - `GpuResourceAllocation` if grown storage cannot be reserved
    pub fn classify_and_add_vectors(&mut self, vectors: &[f32], ids: &[i64]) -> IvfPqResult<usize> {
        let dim = self.dimension();
        let code_size = self.code_size();
        let n = vectors.len() / dim;
        if n != ids.len() || vectors.len() % dim != 0 {
            return Err(IvfPqError::InvalidInput(format!(
                "{} values for {} ids at dimension {}",
                vectors.len(),
                ids.len(),
                dim
            )));
        }
        self.check_ids(ids)?;

        // Phase 1: classify and encode, no mutation.
        let mut codes = vec![0u8; n * code_size];
        let coarse = &self.coarse;
        let codec = &self.codec;
        let assignments: Vec<Option<usize>> = vectors
            .par_chunks_exact(dim)
            .zip(codes.par_chunks_exact_mut(code_size))
            .map_init(
                || vec![0.0f32; dim],
                |residual, (v, code)| {
                    if !v.iter().all(|x| x.is_finite()) {
                        return None;
                    }
                    let (list, _) = coarse.nearest(v);
                    coarse.residual_into(v, list, residual);
                    codec.encode(residual, code);
                    Some(list)
                },
            )
            .collect();

        let mut per_list = vec![0usize; self.nlist()];
        for &list in assignments.iter().flatten() {
            per_list[list] += 1;
        }
        let inserted: usize = per_list.iter().sum();
        if inserted < n {
            tracing::warn!(skipped = n - inserted, "Skipped vectors with non-finite components");
        }

        // Phase 2: capacity checks and reservations.
        let mut plan = Vec::new();
        for (list, &extra) in per_list.iter().enumerate() {
            if extra == 0 {
                continue;
            }
            let actual = self.lists[list].len() + extra;
            if actual > self.max_list_len {
                return Err(IvfPqError::CapacityExceeded {
                    list,
                    limit: self.max_list_len,
                    actual,
                });
            }
            if let Some(capacity) = self.lists[list].grown_capacity(extra) {
                plan.push((list, capacity.min(self.max_list_len)));
            }
        }
        let grown = self.allocate_growth(&plan)?;

        // Phase 3: commit.
        self.install_growth(grown);
        for ((assignment, code), &id) in assignments
            .iter()
            .zip(codes.chunks_exact(code_size))
            .zip(ids)
        {
            if let Some(list) = *assignment {
                self.lists[list].push(code, id);
            }
        }

        Ok(inserted)
    }

    /// k-nearest search into caller-provided `n * k` buffers.
    ///
    /// Probes `min(nprobe, nlist)` cells per query. Results are ascending by
    /// distance with ties broken by lower label; unfilled slots hold
    /// `(+inf, -1)`.
    pub fn query_into(
        &self,
        queries: &[f32],
        nprobe: usize,
        k: usize,
        distances: &mut [f32],
        labels: &mut [i64],
    ) -> IvfPqResult<()> {
        let dim = self.dimension();
        let n = queries.len() / dim;
        if k == 0 || queries.len() % dim != 0 || distances.len() != n * k || labels.len() != n * k {
            return Err(IvfPqError::InvalidInput(format!(
                "query buffers do not match {} queries x k={}",
                n, k
            )));
        }
        let nprobe = nprobe.min(self.nlist());

        distances
            .par_chunks_mut(k)
            .zip(labels.par_chunks_mut(k))
            .zip(queries.par_chunks_exact(dim))
            .for_each_init(
                || (self.codec.scratch(), Vec::new()),
                |(scratch, scores), ((dist_out, label_out), query)| {
                    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
                    self.codec.prepare_query(query, scratch);

                    for (coarse_dist, list_no) in self.coarse.probe(query, nprobe) {
                        let list = &self.lists[list_no];
                        if list.len() == 0 {
                            continue;
                        }
                        scores.clear();
                        self.codec.scan_list(
                            scratch,
                            query,
                            list_no,
                            coarse_dist,
                            self.coarse.centroid(list_no),
                            list.codes(),
                            scores,
                        );
                        for (offset, &distance) in scores.iter().enumerate() {
                            let candidate = Candidate {
                                distance,
                                label: list.label(list_no, offset),
                            };
                            if heap.len() < k {
                                heap.push(candidate);
                            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                                heap.pop();
                                heap.push(candidate);
                            }
                        }
                    }

                    let found = heap.into_sorted_vec();
                    for (slot, (d, l)) in dist_out.iter_mut().zip(label_out.iter_mut()).enumerate() {
                        match found.get(slot) {
                            Some(c) => {
                                *d = c.distance;
                                *l = c.label;
                            }
                            None => {
                                *d = f32::INFINITY;
                                *l = SENTINEL_LABEL;
                            }
                        }
                    }
                },
            );
        Ok(())
    }

    pub fn list_length(&self, list: usize) -> IvfPqResult<usize> {
        Ok(self.check_list(list)?.len())
    }

    /// Copy of list `list`'s codes, `len * code_size` bytes.
    pub fn list_codes(&self, list: usize) -> IvfPqResult<Vec<u8>> {
        Ok(self.check_list(list)?.codes().to_vec())
    }

    /// Copy of list `list`'s labels.
    pub fn list_indices(&self, list: usize) -> IvfPqResult<Vec<i64>> {
        Ok(self.check_list(list)?.indices(list))
    }

    /// Append pre-encoded entries to one list (used by import).
    pub fn append_list(&mut self, list: usize, codes: &[u8], ids: &[i64]) -> IvfPqResult<()> {
        let current = self.check_list(list)?.len();
        let code_size = self.code_size();
        if codes.len() != ids.len() * code_size {
            return Err(IvfPqError::InvalidInput(format!(
                "list {}: {} code bytes for {} ids (code size {})",
                list,
                codes.len(),
                ids.len(),
                code_size
            )));
        }
        if current + ids.len() > self.max_list_len {
            return Err(IvfPqError::CapacityExceeded {
                list,
                limit: self.max_list_len,
                actual: current + ids.len(),
            });
        }
        self.check_ids(ids)?;

        if let Some(capacity) = self.lists[list].grown_capacity(ids.len()) {
            let grown = self.allocate_growth(&[(list, capacity.min(self.max_list_len))])?;
            self.install_growth(grown);
        }
        let target = &mut self.lists[list];
        for (code, &id) in codes.chunks_exact(code_size).zip(ids) {
            target.push(code, id);
        }
        Ok(())
    }

    /// Shrink every list's reservation to its length. Returns bytes freed.
    ///
    /// Reservations shrink in place, so reclaiming needs no pool headroom
    /// and cannot fail part-way.
    pub fn reclaim_memory(&mut self) -> IvfPqResult<usize> {
        let bpe = self.bytes_per_entry();
        let freed: usize = self
            .lists
            .iter_mut()
            .filter(|l| l.capacity() > l.len())
            .map(|l| l.shrink_to_fit(bpe))
            .sum();
        tracing::debug!(freed, "Reclaimed list storage");
        Ok(freed)
    }

    /// Remove every entry. Centroids and codec state are kept.
    pub fn reset(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }
}

impl<C: ListCodec> std::fmt::Debug for IvfEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IvfEngine")
            .field("nlist", &self.nlist())
            .field("dimension", &self.dimension())
            .field("code_size", &self.code_size())
            .field("id_storage", &self.id_storage)
            .field("ntotal", &self.ntotal())
            .field("precomputed", &self.codec.uses_precomputed())
            .finish()
    }
}
