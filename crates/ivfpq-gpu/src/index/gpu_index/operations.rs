//! Data path: add and search.
//!
//! Every call makes the index's device current for its duration and stages
//! its inputs and outputs in pool memory. Staging handles are dropped on
//! every return path, so pool usage returns to its prior level afterwards.

use crate::config::constants::SENTINEL_LABEL;
use crate::device::MemoryCategory;
use crate::error::{IvfPqError, IvfPqResult};
use crate::index::encoding::EncodingStrategy;
use crate::index::search_result::SearchResult;

use super::index::GpuIndexIvf;

impl<S: EncodingStrategy> GpuIndexIvf<S> {
    /// Number of rows in a flat vector slice.
    fn rows(&self, vectors: &[f32]) -> IvfPqResult<usize> {
        let dim = self.config.dimension;
        if vectors.len() % dim != 0 {
            return Err(IvfPqError::DimensionMismatch {
                expected: dim,
                actual: vectors.len() % dim,
            });
        }
        Ok(vectors.len() / dim)
    }

    /// Add vectors with sequential ids.
    ///
    /// Ids continue from the previous `add` (from [`ntotal`](Self::ntotal)
    /// on a fresh, reset, or imported index). Every row consumes an id, so
    /// a skipped non-finite vector leaves a gap rather than letting a later
    /// vector reuse a stored id.
    ///
    /// Returns the number of vectors inserted.
    pub fn add(&mut self, vectors: &[f32]) -> IvfPqResult<usize> {
        if !self.is_trained() {
            return Err(IvfPqError::IndexNotTrained);
        }
        let n = self.rows(vectors)?;
        let start = self.next_id;
        let ids: Vec<i64> = (start..start + n as i64).collect();
        let inserted = self.add_with_ids(vectors, &ids)?;
        self.next_id = start + n as i64;
        Ok(inserted)
    }

    /// Add vectors with caller-provided ids.
    ///
    /// Vectors with non-finite components cannot be encoded; they are
    /// skipped and not counted. Any error leaves the index unchanged.
    ///
    /// # Arguments
    ///
    /// * `vectors` - Vectors to add (flattened, row-major: n * dimension)
    /// * `ids` - One id per vector
    ///
    /// # Errors
    ///
    /// - `IndexNotTrained` if the index is not trained
    /// - `DimensionMismatch` if `vectors.len()` is not a multiple of dimension
    /// - `InvalidInput` if the id count differs from the vector count, or an
    ///   id does not fit 32-bit id storage
    /// - `CapacityExceeded` if a list would exceed the device limit
    /// - `GpuResourceAllocation` if staging or list storage cannot be reserved
    #[tracing::instrument(skip_all, fields(n = ids.len()))]
    pub fn add_with_ids(&mut self, vectors: &[f32], ids: &[i64]) -> IvfPqResult<usize> {
        let _scope = self.resources.enter();
        if !self.is_trained() {
            return Err(IvfPqError::IndexNotTrained);
        }
        if vectors.is_empty() {
            return Ok(0);
        }
        let n = self.rows(vectors)?;
        if n != ids.len() {
            return Err(IvfPqError::InvalidInput(format!(
                "vector count ({}) doesn't match id count ({})",
                n,
                ids.len()
            )));
        }

        let memory = self.resources.memory();
        let _vector_staging =
            memory.allocate(std::mem::size_of_val(vectors), MemoryCategory::Staging)?;
        let _id_staging = memory.allocate(std::mem::size_of_val(ids), MemoryCategory::Staging)?;

        let inserted = self.engine_mut()?.classify_and_add_vectors(vectors, ids)?;
        self.ntotal += inserted;

        tracing::debug!(inserted, ntotal = self.ntotal, "Vectors added");
        Ok(inserted)
    }

    /// Validate a search call and return the query count.
    fn check_search(&self, queries: &[f32], k: usize) -> IvfPqResult<usize> {
        if !self.is_trained() {
            return Err(IvfPqError::IndexNotTrained);
        }
        let max_k = self.resources.capability().max_k;
        if k == 0 || k > max_k {
            return Err(IvfPqError::InvalidInput(format!(
                "k must be in 1..={}, got {}",
                max_k, k
            )));
        }
        self.rows(queries)
    }

    /// Search for the k nearest neighbors of each query.
    ///
    /// # Arguments
    ///
    /// * `queries` - Query vectors (flattened, row-major: n * dimension)
    /// * `k` - Neighbors per query, `1..=max_k`
    ///
    /// # Returns
    ///
    /// Exactly `k` entries per query, ascending by squared L2 distance.
    /// Ties are ordered by lower label. Slots without a match hold label
    /// `-1` and distance `+inf`.
    ///
    /// # Errors
    ///
    /// - `IndexNotTrained` if the index is not trained
    /// - `InvalidInput` if `k` is 0 or above the device limit
    /// - `DimensionMismatch` if `queries.len()` is not a multiple of dimension
    #[tracing::instrument(skip_all, fields(k, nprobe = self.config.nprobe))]
    pub fn search(&self, queries: &[f32], k: usize) -> IvfPqResult<SearchResult> {
        let _scope = self.resources.enter();
        let n = self.check_search(queries, k)?;
        let mut distances = vec![f32::INFINITY; n * k];
        let mut labels = vec![SENTINEL_LABEL; n * k];
        self.search_into(queries, k, &mut distances, &mut labels)?;
        Ok(SearchResult::new(labels, distances, k, n))
    }

    /// Search into caller-provided buffers of `n * k` elements each.
    pub fn search_into(
        &self,
        queries: &[f32],
        k: usize,
        distances: &mut [f32],
        labels: &mut [i64],
    ) -> IvfPqResult<()> {
        let _scope = self.resources.enter();
        let n = self.check_search(queries, k)?;
        if n == 0 {
            return Ok(());
        }
        if distances.len() != n * k || labels.len() != n * k {
            return Err(IvfPqError::InvalidInput(format!(
                "output buffers hold {} distances and {} labels, need {}",
                distances.len(),
                labels.len(),
                n * k
            )));
        }

        let memory = self.resources.memory();
        let _query_staging =
            memory.allocate(std::mem::size_of_val(queries), MemoryCategory::Staging)?;
        let _output_staging = memory.allocate(
            std::mem::size_of_val(distances) + std::mem::size_of_val(labels),
            MemoryCategory::Staging,
        )?;

        self.engine()?
            .query_into(queries, self.config.nprobe, k, distances, labels)?;
        tracing::debug!(n, k, "Search complete");
        Ok(())
    }
}
