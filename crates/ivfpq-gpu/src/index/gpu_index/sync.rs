//! Host mirror synchronization: import from and export to [`HostIvfPqIndex`].
//!
//! Import validates the whole mirror and builds the replacement engine
//! before touching the index; the commit is a single swap of state. Export
//! writes a complete mirror and then replaces the caller's copy.

use std::sync::Arc;

use crate::config::constants::MAX_BITS_PER_CODE;
use crate::config::{IdStorage, IvfConfig, LookupPrecision, MemorySpace, MetricType, PqParams};
use crate::device::GpuResources;
use crate::engine::{IvfEngine, PqCodec};
use crate::error::{IvfPqError, IvfPqResult};
use crate::index::encoding::{EncodingStrategy, PqEncoding};
use crate::mirror::{HostInvertedList, HostIvfPqIndex, PqMirrorParams, MIRROR_FORMAT_VERSION};
use crate::quantizer::{CoarseQuantizer, FlatL2Quantizer, ProductQuantizer};

use super::index::{GpuIndexIvfPq, IndexState};

/// Device-local settings that a mirror does not carry.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    pub id_storage: IdStorage,
    pub lookup_precision: LookupPrecision,
    pub memory_space: MemorySpace,
    pub kmeans_iterations: usize,
    pub seed: u64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        let ivf = IvfConfig::default();
        Self {
            id_storage: ivf.id_storage,
            lookup_precision: PqParams::default().lookup_precision,
            memory_space: ivf.memory_space,
            kmeans_iterations: ivf.kmeans_iterations,
            seed: ivf.seed,
        }
    }
}

impl ImportOptions {
    fn of(index: &GpuIndexIvfPq) -> Self {
        Self {
            id_storage: index.config.id_storage,
            lookup_precision: index.strategy.params.lookup_precision,
            memory_space: index.config.memory_space,
            kmeans_iterations: index.config.kmeans_iterations,
            seed: index.config.seed,
        }
    }
}

/// Fully validated replacement state built from a mirror.
struct Imported {
    config: IvfConfig,
    strategy: PqEncoding,
    quantizer: Box<dyn CoarseQuantizer>,
    state: IndexState<PqCodec>,
    ntotal: usize,
    next_id: i64,
}

fn prepare_import(
    resources: &Arc<GpuResources>,
    mirror: &HostIvfPqIndex,
    options: &ImportOptions,
) -> IvfPqResult<Imported> {
    if mirror.metric != MetricType::L2 {
        return Err(IvfPqError::UnsupportedMetric(mirror.metric));
    }
    if mirror.pq.nbits > MAX_BITS_PER_CODE {
        return Err(IvfPqError::UnsupportedEncoding(format!(
            "{} bits per sub-code (at most {})",
            mirror.pq.nbits, MAX_BITS_PER_CODE
        )));
    }
    if !mirror.by_residual {
        return Err(IvfPqError::UnsupportedEncoding(
            "PQ codes of raw vectors (by_residual = false)".to_string(),
        ));
    }
    if mirror.polysemous {
        return Err(IvfPqError::UnsupportedEncoding(
            "polysemous codes".to_string(),
        ));
    }
    mirror.check_structure()?;

    let max_nprobe = resources.capability().max_nprobe;
    let nprobe = mirror.nprobe.min(max_nprobe).max(1);
    if nprobe != mirror.nprobe {
        tracing::warn!(
            mirror_nprobe = mirror.nprobe,
            nprobe,
            max_nprobe,
            "Clamped mirror nprobe to device limits"
        );
    }

    let config = IvfConfig {
        dimension: mirror.dimension,
        nlist: mirror.nlist,
        nprobe,
        metric: mirror.metric,
        id_storage: options.id_storage,
        memory_space: options.memory_space,
        device_id: resources.device_id(),
        kmeans_iterations: options.kmeans_iterations,
        seed: options.seed,
    };
    let strategy = PqEncoding::new(PqParams {
        sub_quantizers: mirror.pq.m,
        bits_per_code: mirror.pq.nbits,
        use_precomputed_tables: mirror.use_precomputed_table,
        lookup_precision: options.lookup_precision,
    });
    strategy.verify(&config, resources.capability())?;

    let quantizer = if mirror.coarse_centroids.is_empty() {
        FlatL2Quantizer::new(config.dimension, config.nlist)
    } else {
        FlatL2Quantizer::from_centroids(config.dimension, mirror.coarse_centroids.clone())?
    }
    .with_training(config.kmeans_iterations, config.seed);

    if !mirror.is_trained {
        return Ok(Imported {
            config,
            strategy,
            quantizer: Box::new(quantizer),
            state: IndexState::Unconfigured,
            ntotal: 0,
            next_id: 0,
        });
    }

    if mirror.pq.centroids.is_empty() {
        return Err(IvfPqError::CorruptMirror(
            "trained mirror has empty PQ centroids".to_string(),
        ));
    }
    if mirror.coarse_centroids.is_empty() {
        return Err(IvfPqError::CorruptMirror(
            "trained mirror has empty coarse centroids".to_string(),
        ));
    }
    let limit = resources.capability().max_list_len;
    if let Some((list, actual)) = mirror
        .lists
        .iter()
        .map(HostInvertedList::len)
        .enumerate()
        .find(|&(_, len)| len > limit)
    {
        return Err(IvfPqError::CapacityExceeded { list, limit, actual });
    }

    let pq = ProductQuantizer::from_centroids(
        mirror.dimension,
        mirror.pq.m,
        mirror.pq.nbits,
        mirror.pq.centroids.clone(),
    )
    .map_err(|e| IvfPqError::CorruptMirror(e.to_string()))?;

    let mut engine = IvfEngine::new(
        Arc::clone(resources),
        quantizer.device_handle()?,
        PqCodec::new(pq),
        config.id_storage,
        limit,
    )?
    .with_memory_space(config.memory_space);
    engine.set_precomputed(strategy.uses_precomputed_tables())?;
    for (i, list) in mirror.lists.iter().enumerate() {
        engine.append_list(i, &list.codes, &list.ids)?;
    }
    let ntotal = engine.ntotal();
    // Sequential adds continue past every imported id.
    let next_id = mirror
        .lists
        .iter()
        .flat_map(|list| list.ids.iter().copied())
        .max()
        .map_or(0, |id| id.saturating_add(1))
        .max(ntotal as i64);

    Ok(Imported {
        config,
        strategy,
        quantizer: Box::new(quantizer),
        state: IndexState::Trained(Box::new(engine)),
        ntotal,
        next_id,
    })
}

impl GpuIndexIvfPq {
    /// Build a device index from a host mirror.
    ///
    /// M, B, the precomputed-table flag, and the IVF shape come from the
    /// mirror; device-local settings come from `options`.
    pub fn from_host(
        resources: Arc<GpuResources>,
        mirror: &HostIvfPqIndex,
        options: ImportOptions,
    ) -> IvfPqResult<Self> {
        let _scope = resources.enter();
        let imported = prepare_import(&resources, mirror, &options)?;
        tracing::info!(
            nlist = imported.config.nlist,
            ntotal = imported.ntotal,
            trained = imported.state.is_trained(),
            "Index created from host mirror"
        );
        Ok(Self {
            resources,
            config: imported.config,
            strategy: imported.strategy,
            quantizer: imported.quantizer,
            state: imported.state,
            ntotal: imported.ntotal,
            next_id: imported.next_id,
            pending_reserve: 0,
        })
    }

    /// Replace this index's contents with the mirror's.
    ///
    /// Keeps the local id storage mode, lookup precision, memory space, and
    /// device. On error the index is unchanged.
    ///
    /// # Errors
    ///
    /// - `UnsupportedMetric` for a non-L2 mirror
    /// - `UnsupportedEncoding` for more than 8 bits per code, non-residual
    ///   or polysemous codes
    /// - `CorruptMirror` for inconsistent sizes or a trained mirror without
    ///   centroids
    /// - `Configuration` if the derived configuration is invalid
    /// - `CapacityExceeded` if a list exceeds the per-list limit
    #[tracing::instrument(skip_all, fields(nlist = mirror.nlist, trained = mirror.is_trained))]
    pub fn import_from(&mut self, mirror: &HostIvfPqIndex) -> IvfPqResult<()> {
        let _scope = self.resources.enter();
        let imported = prepare_import(&self.resources, mirror, &ImportOptions::of(self))?;

        self.config = imported.config;
        self.strategy = imported.strategy;
        self.quantizer = imported.quantizer;
        self.state = imported.state;
        self.ntotal = imported.ntotal;
        self.next_id = imported.next_id;
        self.pending_reserve = 0;

        tracing::info!(ntotal = self.ntotal, "Imported host mirror");
        Ok(())
    }

    /// Write this index into `mirror`, replacing its contents.
    ///
    /// # Errors
    ///
    /// `UnsupportedExport` when ids are not retained (`IdStorage::ListOffset`).
    #[tracing::instrument(skip_all, fields(ntotal = self.ntotal))]
    pub fn export_to(&self, mirror: &mut HostIvfPqIndex) -> IvfPqResult<()> {
        let _scope = self.resources.enter();
        if !self.config.id_storage.retains_ids() {
            return Err(IvfPqError::UnsupportedExport {
                mode: self.config.id_storage,
            });
        }

        let params = &self.strategy.params;
        let mut out = HostIvfPqIndex {
            version: MIRROR_FORMAT_VERSION,
            dimension: self.config.dimension,
            nlist: self.config.nlist,
            nprobe: self.config.nprobe,
            metric: self.config.metric,
            is_trained: self.is_trained(),
            by_residual: true,
            use_precomputed_table: false,
            polysemous: false,
            code_size: params.sub_quantizers,
            pq: PqMirrorParams {
                m: params.sub_quantizers,
                nbits: params.bits_per_code,
                centroids: Vec::new(),
            },
            coarse_centroids: self.quantizer.centroids(),
            lists: vec![HostInvertedList::default(); self.config.nlist],
            precomputed_table: Vec::new(),
            ntotal: self.ntotal,
        };

        if let Some(engine) = self.state.engine() {
            for (i, list) in out.lists.iter_mut().enumerate() {
                list.codes = engine.list_codes(i)?;
                list.ids = engine.list_indices(i)?;
            }
            out.pq.centroids = engine.codec().centroids();
            if params.use_precomputed_tables {
                out.use_precomputed_table = true;
                out.precompute_table()?;
            }
        }

        *mirror = out;
        tracing::debug!("Exported to host mirror");
        Ok(())
    }

    /// Export into a fresh mirror.
    pub fn to_host(&self) -> IvfPqResult<HostIvfPqIndex> {
        let mut mirror = HostIvfPqIndex::new(
            self.config.dimension,
            self.config.nlist,
            self.strategy.params.sub_quantizers,
            self.strategy.params.bits_per_code,
        );
        self.export_to(&mut mirror)?;
        Ok(mirror)
    }
}
