//! Seeded k-means (Lloyd iterations) over flat row-major data.
//!
//! Initialisation samples `k` distinct training vectors. Assignment runs
//! data-parallel on the rayon pool; the centroid update is sequential so
//! results are reproducible for a given seed regardless of thread count.
//! Empty clusters are re-seeded by splitting the most populated one.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::error::{IvfPqError, IvfPqResult};

use super::nearest_row;

/// Relative perturbation applied when splitting a cluster.
const SPLIT_EPS: f32 = 1.0 / 1024.0;

/// k-means trainer.
#[derive(Debug, Clone)]
pub struct KMeans {
    dimension: usize,
    k: usize,
    iterations: usize,
    seed: u64,
}

impl KMeans {
    /// Create a trainer for `k` clusters of `dimension`-wide vectors.
    pub fn new(dimension: usize, k: usize) -> IvfPqResult<Self> {
        if dimension == 0 || k == 0 {
            return Err(IvfPqError::InvalidInput(format!(
                "k-means needs dimension > 0 and k > 0 (got dimension={}, k={})",
                dimension, k
            )));
        }
        Ok(Self {
            dimension,
            k,
            iterations: 25,
            seed: 1234,
        })
    }

    /// Set the iteration count (builder pattern).
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the initialisation seed (builder pattern).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train on `vectors` and return the `k * dimension` centroid matrix.
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` if `vectors.len()` is not a multiple of dimension
    /// - `InsufficientTrainingData` if fewer than `k` vectors are given
    pub fn fit(&self, vectors: &[f32]) -> IvfPqResult<Vec<f32>> {
        let dim = self.dimension;
        if vectors.len() % dim != 0 {
            return Err(IvfPqError::DimensionMismatch {
                expected: dim,
                actual: vectors.len() % dim,
            });
        }
        let n = vectors.len() / dim;
        if n < self.k {
            return Err(IvfPqError::InsufficientTrainingData {
                required: self.k,
                provided: n,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = Vec::with_capacity(self.k * dim);
        for idx in rand::seq::index::sample(&mut rng, n, self.k).into_iter() {
            centroids.extend_from_slice(&vectors[idx * dim..(idx + 1) * dim]);
        }

        let mut assignments: Vec<usize> = vec![usize::MAX; n];
        for iteration in 0..self.iterations {
            let next: Vec<usize> = vectors
                .par_chunks_exact(dim)
                .map(|v| nearest_row(&centroids, dim, v).0)
                .collect();

            let changed = next
                .iter()
                .zip(&assignments)
                .filter(|(a, b)| a != b)
                .count();
            assignments = next;

            let splits = self.update(vectors, &assignments, &mut centroids);
            tracing::trace!(iteration, changed, splits, "k-means iteration");

            if changed == 0 && splits == 0 {
                break;
            }
        }

        Ok(centroids)
    }

    /// Recompute centroids as cluster means. Returns how many empty
    /// clusters were re-seeded.
    fn update(&self, vectors: &[f32], assignments: &[usize], centroids: &mut [f32]) -> usize {
        let dim = self.dimension;
        let mut sums = vec![0.0f64; self.k * dim];
        let mut counts = vec![0usize; self.k];

        for (v, &c) in vectors.chunks_exact(dim).zip(assignments) {
            counts[c] += 1;
            for (s, &x) in sums[c * dim..(c + 1) * dim].iter_mut().zip(v) {
                *s += x as f64;
            }
        }

        for (c, &count) in counts.iter().enumerate() {
            if count > 0 {
                let inv = 1.0 / count as f64;
                for (dst, &s) in centroids[c * dim..(c + 1) * dim]
                    .iter_mut()
                    .zip(&sums[c * dim..(c + 1) * dim])
                {
                    *dst = (s * inv) as f32;
                }
            }
        }

        let mut splits = 0;
        for empty in 0..self.k {
            if counts[empty] != 0 {
                continue;
            }
            let Some(donor) = (0..self.k).max_by_key(|&c| (counts[c], std::cmp::Reverse(c))) else {
                break;
            };
            if counts[donor] < 2 {
                break;
            }
            for j in 0..dim {
                let base = centroids[donor * dim + j];
                let (up, down) = (base * (1.0 + SPLIT_EPS), base * (1.0 - SPLIT_EPS));
                if j % 2 == 0 {
                    centroids[empty * dim + j] = up;
                    centroids[donor * dim + j] = down;
                } else {
                    centroids[empty * dim + j] = down;
                    centroids[donor * dim + j] = up;
                }
            }
            counts[empty] = counts[donor] / 2;
            counts[donor] -= counts[empty];
            splits += 1;
        }
        splits
    }
}
