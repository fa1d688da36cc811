//! Product quantizer.
//!
//! A D-dimensional vector is split into M contiguous sub-vectors of
//! `dsub = D / M` values; each is replaced by the index of its nearest
//! centroid among `ksub = 2^B`. Codes are one byte per sub-quantizer.
//!
//! Centroids are stored as one flat tensor `[M][ksub][dsub]`.

use rayon::prelude::*;

use crate::config::constants::MAX_BITS_PER_CODE;
use crate::error::{IvfPqError, IvfPqResult};

use super::kmeans::KMeans;
use super::{dot, nearest_row, squared_l2};

/// Product quantizer with byte-wide sub-codes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuantizer {
    dimension: usize,
    m: usize,
    nbits: u32,
    dsub: usize,
    ksub: usize,
    centroids: Vec<f32>,
}

impl ProductQuantizer {
    /// Untrained quantizer.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `m` does not divide `dimension` or `nbits` is
    /// outside `1..=8`.
    pub fn new(dimension: usize, m: usize, nbits: u32) -> IvfPqResult<Self> {
        if m == 0 || dimension == 0 || dimension % m != 0 {
            return Err(IvfPqError::InvalidInput(format!(
                "{} sub-quantizers do not divide dimension {}",
                m, dimension
            )));
        }
        if nbits == 0 || nbits > MAX_BITS_PER_CODE {
            return Err(IvfPqError::InvalidInput(format!(
                "bits per code must be in 1..=8, got {}",
                nbits
            )));
        }
        Ok(Self {
            dimension,
            m,
            nbits,
            dsub: dimension / m,
            ksub: 1 << nbits,
            centroids: Vec::new(),
        })
    }

    /// Trained quantizer over an existing `[M][ksub][dsub]` tensor.
    pub fn from_centroids(
        dimension: usize,
        m: usize,
        nbits: u32,
        centroids: Vec<f32>,
    ) -> IvfPqResult<Self> {
        let mut pq = Self::new(dimension, m, nbits)?;
        if centroids.len() != pq.ksub * dimension {
            return Err(IvfPqError::InvalidInput(format!(
                "PQ centroid tensor has {} values, expected {} x {} x {}",
                centroids.len(),
                m,
                pq.ksub,
                pq.dsub
            )));
        }
        pq.centroids = centroids;
        Ok(pq)
    }

    /// Train the M sub-quantizers on `vectors` (typically residuals).
    ///
    /// Sub-spaces are independent and train in parallel, each with its own
    /// seed derived from `seed`.
    pub fn train(&mut self, vectors: &[f32], iterations: usize, seed: u64) -> IvfPqResult<()> {
        if vectors.len() % self.dimension != 0 {
            return Err(IvfPqError::DimensionMismatch {
                expected: self.dimension,
                actual: vectors.len() % self.dimension,
            });
        }
        let n = vectors.len() / self.dimension;
        let (dim, dsub, ksub) = (self.dimension, self.dsub, self.ksub);

        let per_subspace: Vec<Vec<f32>> = (0..self.m)
            .into_par_iter()
            .map(|sub| {
                let mut slice = Vec::with_capacity(n * dsub);
                for v in vectors.chunks_exact(dim) {
                    slice.extend_from_slice(&v[sub * dsub..(sub + 1) * dsub]);
                }
                KMeans::new(dsub, ksub)?
                    .with_iterations(iterations)
                    .with_seed(seed.wrapping_add(sub as u64))
                    .fit(&slice)
            })
            .collect::<IvfPqResult<_>>()?;

        self.centroids = per_subspace.concat();
        Ok(())
    }

    #[inline]
    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of sub-quantizers (M), also the code size in bytes.
    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    #[inline]
    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    #[inline]
    pub fn dsub(&self) -> usize {
        self.dsub
    }

    #[inline]
    pub fn ksub(&self) -> usize {
        self.ksub
    }

    /// The `[M][ksub][dsub]` centroid tensor. Empty if untrained.
    #[inline]
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Centroids of sub-quantizer `sub`, `ksub * dsub` values.
    #[inline]
    fn sub_centroids(&self, sub: usize) -> &[f32] {
        let stride = self.ksub * self.dsub;
        &self.centroids[sub * stride..(sub + 1) * stride]
    }

    /// Encode one vector into `code` (`m` bytes).
    pub fn encode(&self, vector: &[f32], code: &mut [u8]) {
        for (sub, (byte, x)) in code.iter_mut().zip(vector.chunks_exact(self.dsub)).enumerate() {
            // ksub <= 256, so the index fits a byte.
            *byte = nearest_row(self.sub_centroids(sub), self.dsub, x).0 as u8;
        }
    }

    /// Reconstruct the approximation of a code into `out` (`dimension` values).
    pub fn decode(&self, code: &[u8], out: &mut [f32]) {
        for (sub, (&byte, dst)) in code.iter().zip(out.chunks_exact_mut(self.dsub)).enumerate() {
            let start = byte as usize * self.dsub;
            dst.copy_from_slice(&self.sub_centroids(sub)[start..start + self.dsub]);
        }
    }

    /// Fill `table` (`m * ksub`) with `||x_m - c_mj||^2`.
    pub fn compute_distance_table(&self, x: &[f32], table: &mut [f32]) {
        self.fill_table(x, table, squared_l2);
    }

    /// Fill `table` (`m * ksub`) with `<x_m, c_mj>`.
    pub fn compute_inner_prod_table(&self, x: &[f32], table: &mut [f32]) {
        self.fill_table(x, table, dot);
    }

    fn fill_table(&self, x: &[f32], table: &mut [f32], f: fn(&[f32], &[f32]) -> f32) {
        for (sub, (row, xs)) in table
            .chunks_exact_mut(self.ksub)
            .zip(x.chunks_exact(self.dsub))
            .enumerate()
        {
            for (slot, c) in row.iter_mut().zip(self.sub_centroids(sub).chunks_exact(self.dsub)) {
                *slot = f(xs, c);
            }
        }
    }

    /// Query-independent term of the precomputed-table distance.
    ///
    /// For cell `i`, sub-quantizer `m` and centroid `j`:
    /// `||c_mj||^2 + 2 <coarse_i[m], c_mj>`, laid out `[nlist][M][ksub]`.
    /// With it, `||q - coarse_i - r||^2 = ||q - coarse_i||^2 + sum_m (term - 2 <q_m, c_mj>)`.
    pub fn coarse_term_table(&self, coarse_centroids: &[f32]) -> Vec<f32> {
        let per_list = self.m * self.ksub;
        let nlist = coarse_centroids.len() / self.dimension;
        let mut table = vec![0.0f32; nlist * per_list];
        table
            .par_chunks_exact_mut(per_list)
            .zip(coarse_centroids.par_chunks_exact(self.dimension))
            .for_each(|(dst, coarse)| {
                for (sub, row) in dst.chunks_exact_mut(self.ksub).enumerate() {
                    let cs = &coarse[sub * self.dsub..(sub + 1) * self.dsub];
                    for (slot, r) in row.iter_mut().zip(self.sub_centroids(sub).chunks_exact(self.dsub)) {
                        *slot = dot(r, r) + 2.0 * dot(cs, r);
                    }
                }
            });
        table
    }
}
