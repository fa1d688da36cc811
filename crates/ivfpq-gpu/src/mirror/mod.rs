//! Host-portable mirror of an IVF-PQ index.
//!
//! [`HostIvfPqIndex`] is the canonical exchange format between the device
//! index and host code. It is plain data: the device index exports into it
//! and imports from it (see `GpuIndexIvfPq::export_to` / `import_from`), and
//! it derives `serde` traits so callers may persist it however they like.
//!
//! The mirror carries a format [`version`](HostIvfPqIndex::version); import
//! rejects versions it does not understand.

use serde::{Deserialize, Serialize};

use crate::config::MetricType;
use crate::error::{IvfPqError, IvfPqResult};
use crate::quantizer::ProductQuantizer;

/// Mirror layout version written by this crate.
pub const MIRROR_FORMAT_VERSION: u32 = 1;

/// PQ parameters and centroids as stored in the mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PqMirrorParams {
    /// Sub-quantizer count (M).
    pub m: usize,
    /// Bits per sub-code (B).
    pub nbits: u32,
    /// `[M][2^B][D/M]` centroid tensor; empty until trained.
    pub centroids: Vec<f32>,
}

/// Codes and ids of one inverted list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostInvertedList {
    /// `ids.len() * code_size` bytes.
    pub codes: Vec<u8>,
    pub ids: Vec<i64>,
}

impl HostInvertedList {
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Host-side IVF-PQ index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostIvfPqIndex {
    pub version: u32,
    pub dimension: usize,
    pub nlist: usize,
    pub nprobe: usize,
    pub metric: MetricType,
    pub is_trained: bool,
    /// PQ encodes residuals rather than raw vectors.
    pub by_residual: bool,
    pub use_precomputed_table: bool,
    /// Polysemous hamming filtering (never produced by this crate).
    pub polysemous: bool,
    /// Bytes per code; equals `pq.m`.
    pub code_size: usize,
    pub pq: PqMirrorParams,
    /// `nlist * dimension` coarse centroids; empty if the quantizer is untrained.
    pub coarse_centroids: Vec<f32>,
    pub lists: Vec<HostInvertedList>,
    /// `[nlist][M][ksub]` term table, filled by [`precompute_table`](Self::precompute_table).
    pub precomputed_table: Vec<f32>,
    pub ntotal: usize,
}

impl HostIvfPqIndex {
    /// Empty, untrained mirror with `nlist` empty lists.
    pub fn new(dimension: usize, nlist: usize, m: usize, nbits: u32) -> Self {
        Self {
            version: MIRROR_FORMAT_VERSION,
            dimension,
            nlist,
            nprobe: 1,
            metric: MetricType::L2,
            is_trained: false,
            by_residual: true,
            use_precomputed_table: false,
            polysemous: false,
            code_size: m,
            pq: PqMirrorParams {
                m,
                nbits,
                centroids: Vec::new(),
            },
            coarse_centroids: Vec::new(),
            lists: vec![HostInvertedList::default(); nlist],
            precomputed_table: Vec::new(),
            ntotal: 0,
        }
    }

    /// Sum of list lengths.
    pub fn list_total(&self) -> usize {
        self.lists.iter().map(HostInvertedList::len).sum()
    }

    /// Check the mirror's internal consistency.
    ///
    /// Verifies the version, list count, per-list code/id lengths, and the
    /// sizes of non-empty centroid tensors. Does not judge whether the
    /// encoding is supported by the device.
    pub fn check_structure(&self) -> IvfPqResult<()> {
        if self.version != MIRROR_FORMAT_VERSION {
            return Err(IvfPqError::CorruptMirror(format!(
                "unsupported mirror version {} (expected {})",
                self.version, MIRROR_FORMAT_VERSION
            )));
        }
        if self.code_size != self.pq.m {
            return Err(IvfPqError::CorruptMirror(format!(
                "code size {} does not match {} sub-quantizers",
                self.code_size, self.pq.m
            )));
        }
        if self.lists.len() != self.nlist {
            return Err(IvfPqError::CorruptMirror(format!(
                "{} inverted lists for nlist {}",
                self.lists.len(),
                self.nlist
            )));
        }
        for (i, list) in self.lists.iter().enumerate() {
            if list.codes.len() != list.ids.len() * self.code_size {
                return Err(IvfPqError::CorruptMirror(format!(
                    "list {} has {} code bytes for {} ids (code size {})",
                    i,
                    list.codes.len(),
                    list.ids.len(),
                    self.code_size
                )));
            }
        }
        if !self.coarse_centroids.is_empty()
            && self.coarse_centroids.len() != self.nlist * self.dimension
        {
            return Err(IvfPqError::CorruptMirror(format!(
                "{} coarse centroid values, expected {} x {}",
                self.coarse_centroids.len(),
                self.nlist,
                self.dimension
            )));
        }
        if !self.pq.centroids.is_empty() {
            let expected = 1usize
                .checked_shl(self.pq.nbits)
                .and_then(|ksub| ksub.checked_mul(self.dimension));
            if expected != Some(self.pq.centroids.len()) {
                return Err(IvfPqError::CorruptMirror(format!(
                    "{} PQ centroid values do not match M={} B={} D={}",
                    self.pq.centroids.len(),
                    self.pq.m,
                    self.pq.nbits,
                    self.dimension
                )));
            }
        }
        Ok(())
    }

    /// Rebuild the host precomputed term table from the current centroids.
    ///
    /// Clears the table when either centroid set is missing.
    pub fn precompute_table(&mut self) -> IvfPqResult<()> {
        if self.pq.centroids.is_empty() || self.coarse_centroids.is_empty() {
            self.precomputed_table.clear();
            return Ok(());
        }
        let pq = ProductQuantizer::from_centroids(
            self.dimension,
            self.pq.m,
            self.pq.nbits,
            self.pq.centroids.clone(),
        )
        .map_err(|e| IvfPqError::CorruptMirror(e.to_string()))?;
        self.precomputed_table = pq.coarse_term_table(&self.coarse_centroids);
        Ok(())
    }
}
