//! IVF index core: structure, construction, configuration transitions.

use std::sync::Arc;

use crate::config::{validate::verify_nprobe, IvfConfig, PqParams};
use crate::device::GpuResources;
use crate::engine::IvfEngine;
use crate::error::{IvfPqError, IvfPqResult};
use crate::index::encoding::{EncodingStrategy, FlatEncoding, PqEncoding};
use crate::quantizer::{CoarseQuantizer, FlatL2Quantizer};

/// Lifecycle of the device engine.
///
/// The engine exists exactly when the index is trained.
#[derive(Debug)]
pub enum IndexState<C: crate::engine::ListCodec> {
    /// Configured but not trained. Lists are inaccessible.
    Unconfigured,
    /// Trained; the engine owns the coarse table, codec, and lists.
    Trained(Box<IvfEngine<C>>),
}

impl<C: crate::engine::ListCodec> IndexState<C> {
    #[inline]
    pub fn is_trained(&self) -> bool {
        matches!(self, IndexState::Trained(_))
    }

    #[inline]
    pub fn engine(&self) -> Option<&IvfEngine<C>> {
        match self {
            IndexState::Trained(engine) => Some(&**engine),
            IndexState::Unconfigured => None,
        }
    }

    #[inline]
    pub fn engine_mut(&mut self) -> Option<&mut IvfEngine<C>> {
        match self {
            IndexState::Trained(engine) => Some(&mut **engine),
            IndexState::Unconfigured => None,
        }
    }
}

/// Accelerator IVF index with a pluggable list encoding.
///
/// # Thread Safety
///
/// Mutating operations take `&mut self`; share an index across threads
/// only behind external synchronization. `Arc<GpuResources>` may be shared
/// freely between indices.
pub struct GpuIndexIvf<S: EncodingStrategy> {
    pub(crate) resources: Arc<GpuResources>,
    pub(crate) config: IvfConfig,
    pub(crate) strategy: S,
    pub(crate) quantizer: Box<dyn CoarseQuantizer>,
    pub(crate) state: IndexState<S::Codec>,
    pub(crate) ntotal: usize,
    /// Next id handed out by `add`. Advances by the batch size, skipped
    /// vectors included, so sequential ids are never reused.
    pub(crate) next_id: i64,
    /// Vectors to reserve for once the engine exists.
    pub(crate) pending_reserve: usize,
}

/// IVF index with product-quantized lists.
pub type GpuIndexIvfPq = GpuIndexIvf<PqEncoding>;

/// IVF index with uncompressed lists.
pub type GpuIndexIvfFlat = GpuIndexIvf<FlatEncoding>;

impl<S: EncodingStrategy> GpuIndexIvf<S> {
    /// Create an untrained index with a fresh flat L2 coarse quantizer.
    ///
    /// # Errors
    ///
    /// `Configuration` naming the first violated constraint.
    ///
    /// # Example
    ///
    /// ```
    /// use ivfpq_gpu::config::{IvfConfig, PqParams};
    /// use ivfpq_gpu::device::create_shared_resources;
    /// use ivfpq_gpu::index::{GpuIndexIvfPq, PqEncoding};
    ///
    /// let resources = create_shared_resources(0)?;
    /// let index = GpuIndexIvfPq::new(
    ///     resources,
    ///     IvfConfig::new(16, 8),
    ///     PqEncoding::new(PqParams::new(4, 4)),
    /// )?;
    /// assert!(!index.is_trained());
    /// # Ok::<(), ivfpq_gpu::error::IvfPqError>(())
    /// ```
    pub fn new(resources: Arc<GpuResources>, config: IvfConfig, strategy: S) -> IvfPqResult<Self> {
        let quantizer = FlatL2Quantizer::new(config.dimension, config.nlist)
            .with_training(config.kmeans_iterations, config.seed);
        Self::with_quantizer(resources, config, strategy, Box::new(quantizer))
    }

    /// Create an index around a caller-supplied coarse quantizer.
    ///
    /// A quantizer that is already trained is reused as-is by `train`.
    pub fn with_quantizer(
        resources: Arc<GpuResources>,
        config: IvfConfig,
        strategy: S,
        quantizer: Box<dyn CoarseQuantizer>,
    ) -> IvfPqResult<Self> {
        strategy.verify(&config, resources.capability())?;
        verify_nprobe(&config, resources.capability())?;
        if config.device_id != resources.device_id() {
            return Err(IvfPqError::config(
                "device_id matches resources",
                format!("{} vs {}", config.device_id, resources.device_id()),
            ));
        }
        if quantizer.dimension() != config.dimension || quantizer.nlist() != config.nlist {
            return Err(IvfPqError::config(
                "quantizer shape matches config",
                format!(
                    "quantizer {}x{}, config {}x{}",
                    quantizer.nlist(),
                    quantizer.dimension(),
                    config.nlist,
                    config.dimension
                ),
            ));
        }

        tracing::debug!(
            factory = %strategy.factory_string(config.nlist),
            dimension = config.dimension,
            device_id = config.device_id,
            "Created IVF index"
        );

        Ok(Self {
            resources,
            config,
            strategy,
            quantizer,
            state: IndexState::Unconfigured,
            ntotal: 0,
            next_id: 0,
            pending_reserve: 0,
        })
    }

    /// Number of vectors in the index.
    #[inline]
    pub fn ntotal(&self) -> usize {
        self.ntotal
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ntotal == 0
    }

    #[inline]
    pub fn is_trained(&self) -> bool {
        self.state.is_trained()
    }

    #[inline]
    pub fn config(&self) -> &IvfConfig {
        &self.config
    }

    #[inline]
    pub fn encoding(&self) -> &S {
        &self.strategy
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    #[inline]
    pub fn nlist(&self) -> usize {
        self.config.nlist
    }

    #[inline]
    pub fn nprobe(&self) -> usize {
        self.config.nprobe
    }

    /// Bytes per encoded vector.
    #[inline]
    pub fn code_size(&self) -> usize {
        self.strategy.code_size(self.config.dimension)
    }

    #[inline]
    pub fn resources(&self) -> &Arc<GpuResources> {
        &self.resources
    }

    #[inline]
    pub fn quantizer(&self) -> &dyn CoarseQuantizer {
        self.quantizer.as_ref()
    }

    /// Factory-style description of this index.
    pub fn factory_string(&self) -> String {
        self.strategy.factory_string(self.config.nlist)
    }

    pub(crate) fn engine(&self) -> IvfPqResult<&IvfEngine<S::Codec>> {
        self.state.engine().ok_or(IvfPqError::IndexNotTrained)
    }

    pub(crate) fn engine_mut(&mut self) -> IvfPqResult<&mut IvfEngine<S::Codec>> {
        self.state.engine_mut().ok_or(IvfPqError::IndexNotTrained)
    }

    /// Change the number of probed cells.
    pub fn set_nprobe(&mut self, nprobe: usize) -> IvfPqResult<()> {
        let _scope = self.resources.enter();
        let candidate = self.config.clone().with_nprobe(nprobe);
        verify_nprobe(&candidate, self.resources.capability())?;
        if nprobe > self.config.nlist {
            tracing::warn!(
                nprobe,
                nlist = self.config.nlist,
                "nprobe exceeds nlist; searches probe every cell"
            );
        }
        self.config = candidate;
        Ok(())
    }

    /// Switch to another encoding configuration.
    ///
    /// The whole candidate (config + `next`) is validated before anything
    /// changes. On a trained index only transitions that keep the list
    /// layout are allowed, and the engine is updated to match (e.g. building
    /// or dropping precomputed tables).
    pub fn transition(&mut self, next: S) -> IvfPqResult<()> {
        let _scope = self.resources.enter();
        next.verify(&self.config, self.resources.capability())?;

        if let IndexState::Trained(engine) = &mut self.state {
            if !self.strategy.same_layout(&next) {
                return Err(IvfPqError::config(
                    "list layout unchanged on a trained index",
                    format!(
                        "{} -> {}",
                        self.strategy.factory_string(self.config.nlist),
                        next.factory_string(self.config.nlist)
                    ),
                ));
            }
            engine.set_precomputed(next.uses_precomputed_tables())?;
        }

        tracing::debug!(from = ?self.strategy, to = ?next, "Encoding transition");
        self.strategy = next;
        Ok(())
    }
}

impl GpuIndexIvfPq {
    #[inline]
    pub fn pq_params(&self) -> &PqParams {
        &self.strategy.params
    }

    /// Enable or disable precomputed term tables.
    ///
    /// Goes through [`transition`](Self::transition), so the flag only
    /// changes if the resulting configuration validates.
    pub fn set_use_precomputed_tables(&mut self, enabled: bool) -> IvfPqResult<()> {
        let next = PqEncoding::new(self.strategy.params.with_precomputed_tables(enabled));
        self.transition(next)
    }

    /// Copy of the trained PQ centroid tensor `[M][2^B][D/M]`.
    pub fn pq_centroids(&self) -> IvfPqResult<Vec<f32>> {
        let _scope = self.resources.enter();
        Ok(self.engine()?.codec().centroids())
    }
}

impl<S: EncodingStrategy> std::fmt::Debug for GpuIndexIvf<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuIndexIvf")
            .field("factory", &self.factory_string())
            .field("ntotal", &self.ntotal)
            .field("is_trained", &self.is_trained())
            .field("dimension", &self.config.dimension)
            .field("nprobe", &self.config.nprobe)
            .field("device_id", &self.config.device_id)
            .finish()
    }
}
