//! Coarse and product quantizers.
//!
//! - `kmeans` - Seeded Lloyd iterations shared by both quantizers
//! - `flat` - Exhaustive L2 coarse quantizer ([`FlatL2Quantizer`])
//! - `pq` - Product quantizer over residual sub-spaces ([`ProductQuantizer`])
//!
//! The index talks to its coarse quantizer only through [`CoarseQuantizer`],
//! so a caller may hand in a pre-trained quantizer of its own.

pub mod flat;
pub mod kmeans;
pub mod pq;

use std::sync::Arc;

use crate::error::{IvfPqError, IvfPqResult};

pub use flat::FlatL2Quantizer;
pub use kmeans::KMeans;
pub use pq::ProductQuantizer;

/// Coarse quantizer interface consumed by the index.
///
/// Vectors are flat row-major `f32` slices of `n * dimension` values.
pub trait CoarseQuantizer: Send + Sync + std::fmt::Debug {
    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Number of cells.
    fn nlist(&self) -> usize;

    /// Whether centroids are available.
    fn is_trained(&self) -> bool;

    /// Learn `nlist` centroids from training vectors.
    fn train(&mut self, vectors: &[f32]) -> IvfPqResult<()>;

    /// Nearest cell per vector.
    fn assign(&self, vectors: &[f32]) -> IvfPqResult<Vec<usize>>;

    /// `vector - centroid[list]`.
    fn compute_residual(&self, vector: &[f32], list: usize) -> IvfPqResult<Vec<f32>>;

    /// Copy of the centroid matrix (`nlist * dimension`), empty if untrained.
    fn centroids(&self) -> Vec<f32>;

    /// Shared centroid table handed to the device engine.
    fn device_handle(&self) -> IvfPqResult<CentroidTable>;
}

/// Immutable, reference-counted coarse centroid matrix.
///
/// Cloning shares the underlying buffer. This is what the engine keeps, so
/// the quantizer and the engine never alias mutable state.
#[derive(Clone, Debug, PartialEq)]
pub struct CentroidTable {
    dimension: usize,
    nlist: usize,
    data: Arc<[f32]>,
}

impl CentroidTable {
    /// Wrap a row-major `nlist * dimension` matrix.
    pub fn new(dimension: usize, data: Vec<f32>) -> IvfPqResult<Self> {
        if dimension == 0 || data.is_empty() || data.len() % dimension != 0 {
            return Err(IvfPqError::InvalidInput(format!(
                "centroid matrix of {} values is not a non-empty multiple of dimension {}",
                data.len(),
                dimension
            )));
        }
        Ok(Self {
            dimension,
            nlist: data.len() / dimension,
            data: data.into(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn nlist(&self) -> usize {
        self.nlist
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Centroid of cell `list`. Caller guarantees `list < nlist`.
    #[inline]
    pub fn centroid(&self, list: usize) -> &[f32] {
        let start = list * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Nearest cell and its squared distance. Ties go to the lower cell.
    pub fn nearest(&self, vector: &[f32]) -> (usize, f32) {
        nearest_row(&self.data, self.dimension, vector)
    }

    /// The `nprobe` nearest cells, ascending by distance then cell index.
    pub fn probe(&self, query: &[f32], nprobe: usize) -> Vec<(f32, usize)> {
        let mut cells: Vec<(f32, usize)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(list, c)| (squared_l2(query, c), list))
            .collect();
        let nprobe = nprobe.min(cells.len());
        if nprobe < cells.len() {
            cells.select_nth_unstable_by(nprobe, cmp_scored);
            cells.truncate(nprobe);
        }
        cells.sort_unstable_by(cmp_scored);
        cells
    }

    /// Write `vector - centroid[list]` into `out`.
    #[inline]
    pub fn residual_into(&self, vector: &[f32], list: usize, out: &mut [f32]) {
        for ((o, &v), &c) in out.iter_mut().zip(vector).zip(self.centroid(list)) {
            *o = v - c;
        }
    }

    /// Bytes this table occupies on the device.
    #[inline]
    pub fn device_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

fn cmp_scored(a: &(f32, usize), b: &(f32, usize)) -> std::cmp::Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Squared Euclidean distance.
#[inline]
pub(crate) fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Index of the nearest row of `rows` (row-major, `dim` wide) to `vector`.
/// Strict comparison keeps the first row on ties.
pub(crate) fn nearest_row(rows: &[f32], dim: usize, vector: &[f32]) -> (usize, f32) {
    let mut best = (0usize, f32::INFINITY);
    for (i, row) in rows.chunks_exact(dim).enumerate() {
        let d = squared_l2(vector, row);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}
