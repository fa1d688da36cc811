//! Exhaustive L2 coarse quantizer.

use rayon::prelude::*;

use crate::error::{IvfPqError, IvfPqResult};

use super::kmeans::KMeans;
use super::{CentroidTable, CoarseQuantizer};

/// Coarse quantizer that scans every centroid.
///
/// Trained with [`KMeans`]; after training the centroids live in a shared
/// [`CentroidTable`] that the engine reuses without copying.
#[derive(Debug, Clone)]
pub struct FlatL2Quantizer {
    dimension: usize,
    nlist: usize,
    iterations: usize,
    seed: u64,
    table: Option<CentroidTable>,
}

impl FlatL2Quantizer {
    /// Untrained quantizer with `nlist` cells.
    pub fn new(dimension: usize, nlist: usize) -> Self {
        Self {
            dimension,
            nlist,
            iterations: 25,
            seed: 1234,
            table: None,
        }
    }

    /// Set k-means iterations and seed (builder pattern).
    #[must_use]
    pub fn with_training(mut self, iterations: usize, seed: u64) -> Self {
        self.iterations = iterations;
        self.seed = seed;
        self
    }

    /// Trained quantizer over an existing centroid matrix.
    pub fn from_centroids(dimension: usize, centroids: Vec<f32>) -> IvfPqResult<Self> {
        let table = CentroidTable::new(dimension, centroids)?;
        Ok(Self {
            dimension,
            nlist: table.nlist(),
            iterations: 25,
            seed: 1234,
            table: Some(table),
        })
    }

    fn trained_table(&self) -> IvfPqResult<&CentroidTable> {
        self.table.as_ref().ok_or(IvfPqError::IndexNotTrained)
    }

    fn check_rows(&self, vectors: &[f32]) -> IvfPqResult<()> {
        if vectors.len() % self.dimension != 0 {
            return Err(IvfPqError::DimensionMismatch {
                expected: self.dimension,
                actual: vectors.len() % self.dimension,
            });
        }
        Ok(())
    }
}

impl CoarseQuantizer for FlatL2Quantizer {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn nlist(&self) -> usize {
        self.nlist
    }

    fn is_trained(&self) -> bool {
        self.table.is_some()
    }

    fn train(&mut self, vectors: &[f32]) -> IvfPqResult<()> {
        self.check_rows(vectors)?;
        let centroids = KMeans::new(self.dimension, self.nlist)?
            .with_iterations(self.iterations)
            .with_seed(self.seed)
            .fit(vectors)?;
        self.table = Some(CentroidTable::new(self.dimension, centroids)?);
        Ok(())
    }

    fn assign(&self, vectors: &[f32]) -> IvfPqResult<Vec<usize>> {
        let table = self.trained_table()?;
        self.check_rows(vectors)?;
        Ok(vectors
            .par_chunks_exact(self.dimension)
            .map(|v| table.nearest(v).0)
            .collect())
    }

    fn compute_residual(&self, vector: &[f32], list: usize) -> IvfPqResult<Vec<f32>> {
        let table = self.trained_table()?;
        if vector.len() != self.dimension {
            return Err(IvfPqError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if list >= self.nlist {
            return Err(IvfPqError::InvalidInput(format!(
                "list {} out of range (nlist {})",
                list, self.nlist
            )));
        }
        let mut residual = vec![0.0; self.dimension];
        table.residual_into(vector, list, &mut residual);
        Ok(residual)
    }

    fn centroids(&self) -> Vec<f32> {
        self.table
            .as_ref()
            .map(|t| t.as_slice().to_vec())
            .unwrap_or_default()
    }

    fn device_handle(&self) -> IvfPqResult<CentroidTable> {
        self.trained_table().cloned()
    }
}
