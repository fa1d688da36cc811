//! Inverted list introspection and storage maintenance.

use crate::error::IvfPqResult;
use crate::index::encoding::EncodingStrategy;

use super::index::GpuIndexIvf;

impl<S: EncodingStrategy> GpuIndexIvf<S> {
    /// Number of entries in list `list`.
    ///
    /// # Errors
    ///
    /// `IndexNotTrained` before training; `InvalidInput` if `list >= nlist`.
    pub fn get_list_length(&self, list: usize) -> IvfPqResult<usize> {
        let _scope = self.resources.enter();
        self.engine()?.list_length(list)
    }

    /// Copy of the encoded vectors of list `list` (`len * code_size` bytes).
    pub fn get_list_codes(&self, list: usize) -> IvfPqResult<Vec<u8>> {
        let _scope = self.resources.enter();
        self.engine()?.list_codes(list)
    }

    /// Copy of the ids of list `list`.
    ///
    /// With `IdStorage::ListOffset` these are the `(list << 32) | offset`
    /// labels that search reports.
    pub fn get_list_indices(&self, list: usize) -> IvfPqResult<Vec<i64>> {
        let _scope = self.resources.enter();
        self.engine()?.list_indices(list)
    }

    /// Shrink list storage to fit. Returns bytes freed (0 when untrained).
    pub fn reclaim_memory(&mut self) -> IvfPqResult<usize> {
        let _scope = self.resources.enter();
        match self.state.engine_mut() {
            Some(engine) => engine.reclaim_memory(),
            None => Ok(0),
        }
    }

    /// Remove all vectors. The index stays trained.
    pub fn reset(&mut self) {
        let _scope = self.resources.enter();
        if let Some(engine) = self.state.engine_mut() {
            engine.reset();
        }
        self.ntotal = 0;
        self.next_id = 0;
        tracing::debug!("Index reset");
    }

    /// Reserve list storage for `n` vectors, `n / nlist` per list.
    ///
    /// On an untrained index the request is applied when training builds
    /// the engine.
    pub fn reserve_memory(&mut self, n: usize) -> IvfPqResult<()> {
        let _scope = self.resources.enter();
        match self.state.engine_mut() {
            Some(engine) => engine.reserve_memory(n),
            None => {
                self.pending_reserve = n;
                Ok(())
            }
        }
    }
}
