//! Two-stage training: coarse quantizer, then the list codec on residuals.

use std::sync::Arc;

use crate::engine::IvfEngine;
use crate::error::{IvfPqError, IvfPqResult};
use crate::index::encoding::EncodingStrategy;

use super::index::{GpuIndexIvf, IndexState};

impl<S: EncodingStrategy> GpuIndexIvf<S> {
    /// Train the index on representative vectors.
    ///
    /// Trains the coarse quantizer unless it is already trained, then
    /// trains the codec on the residuals of at most
    /// [`max_training_samples`](EncodingStrategy::max_training_samples)
    /// leading vectors, then builds the engine. Calling `train` on a trained
    /// index is a no-op.
    ///
    /// # Arguments
    ///
    /// * `vectors` - Training vectors (flattened, row-major: n * dimension)
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if `vectors.len()` is not a multiple of dimension
    /// - `InsufficientTrainingData` if a k-means stage has fewer vectors than centroids
    /// - `InternalInconsistency` if a trained index has lost its quantizer
    /// - `GpuResourceAllocation` if engine storage cannot be reserved
    #[tracing::instrument(skip_all, fields(n = vectors.len() / self.config.dimension, factory = %self.factory_string()))]
    pub fn train(&mut self, vectors: &[f32]) -> IvfPqResult<()> {
        let _scope = self.resources.enter();
        let dim = self.config.dimension;
        if vectors.len() % dim != 0 {
            return Err(IvfPqError::DimensionMismatch {
                expected: dim,
                actual: vectors.len() % dim,
            });
        }

        if self.state.is_trained() {
            if !self.quantizer.is_trained() || self.quantizer.nlist() != self.config.nlist {
                tracing::error!(
                    quantizer_trained = self.quantizer.is_trained(),
                    quantizer_nlist = self.quantizer.nlist(),
                    nlist = self.config.nlist,
                    "Trained index with inconsistent coarse quantizer"
                );
                return Err(IvfPqError::InternalInconsistency(format!(
                    "trained index has quantizer (trained={}, nlist={}) for nlist {}",
                    self.quantizer.is_trained(),
                    self.quantizer.nlist(),
                    self.config.nlist
                )));
            }
            tracing::debug!("Index already trained");
            return Ok(());
        }

        let n = vectors.len() / dim;

        if self.quantizer.is_trained() {
            tracing::debug!("Reusing trained coarse quantizer");
        } else {
            self.quantizer.train(vectors)?;
            tracing::debug!(nlist = self.config.nlist, "Coarse quantizer trained");
        }

        let n_sample = n.min(self.strategy.max_training_samples());
        let sample = &vectors[..n_sample * dim];
        let mut residuals = Vec::with_capacity(sample.len());
        if n_sample > 0 {
            let assignments = self.quantizer.assign(sample)?;
            for (v, &list) in sample.chunks_exact(dim).zip(&assignments) {
                residuals.extend(self.quantizer.compute_residual(v, list)?);
            }
        }
        let codec = self.strategy.train_codec(&self.config, &residuals)?;
        tracing::debug!(n_sample, "Codec trained on residuals");

        let coarse = self.quantizer.device_handle()?;
        if coarse.nlist() != self.config.nlist || coarse.dimension() != dim {
            return Err(IvfPqError::InternalInconsistency(format!(
                "coarse quantizer produced {}x{} centroids for a {}x{} index",
                coarse.nlist(),
                coarse.dimension(),
                self.config.nlist,
                dim
            )));
        }

        let mut engine = IvfEngine::new(
            Arc::clone(&self.resources),
            coarse,
            codec,
            self.config.id_storage,
            self.resources.capability().max_list_len,
        )?
        .with_memory_space(self.config.memory_space);
        if self.pending_reserve > 0 {
            engine.reserve_memory(self.pending_reserve)?;
        }
        engine.set_precomputed(self.strategy.uses_precomputed_tables())?;

        self.state = IndexState::Trained(Box::new(engine));
        self.pending_reserve = 0;

        tracing::info!(
            n,
            n_sample,
            factory = %self.factory_string(),
            "IVF index trained"
        );
        Ok(())
    }
}
