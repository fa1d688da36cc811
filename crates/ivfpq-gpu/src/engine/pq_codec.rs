//! Product-quantized list codec with LUT-based asymmetric distances.

use crate::quantizer::{CentroidTable, ProductQuantizer};

use super::ListCodec;

/// Per-query lookup tables.
#[derive(Debug, Default)]
pub struct PqScratch {
    residual: Vec<f32>,
    /// `||r_q,m - c_mj||^2`, rebuilt per probed list.
    distances: Vec<f32>,
    /// `<q_m, c_mj>`, built once per query when precomputed tables are on.
    inner: Vec<f32>,
}

/// Codec storing M one-byte sub-codes per vector.
///
/// Without precomputed tables each probed list rebuilds an `M x ksub`
/// distance table from the query residual. With them the query-independent
/// part (`||r||^2 + 2<c_i, r>`) is read from a `[nlist][M][ksub]` table and
/// only `<q, r>` is computed per query.
#[derive(Debug, Clone)]
pub struct PqCodec {
    pq: ProductQuantizer,
    precomputed: Option<Vec<f32>>,
}

impl PqCodec {
    pub fn new(pq: ProductQuantizer) -> Self {
        Self {
            pq,
            precomputed: None,
        }
    }

    #[inline]
    pub fn quantizer(&self) -> &ProductQuantizer {
        &self.pq
    }

    /// Copy of the `[M][ksub][dsub]` centroid tensor.
    pub fn centroids(&self) -> Vec<f32> {
        self.pq.centroids().to_vec()
    }

    #[inline]
    fn table_len(&self) -> usize {
        self.pq.m() * self.pq.ksub()
    }
}

impl ListCodec for PqCodec {
    type Scratch = PqScratch;

    fn code_size(&self) -> usize {
        self.pq.m()
    }

    fn device_bytes(&self) -> usize {
        self.pq.centroids().len() * std::mem::size_of::<f32>()
    }

    fn encode(&self, residual: &[f32], code: &mut [u8]) {
        self.pq.encode(residual, code);
    }

    fn scratch(&self) -> PqScratch {
        PqScratch {
            residual: vec![0.0; self.pq.dimension()],
            distances: vec![0.0; self.table_len()],
            inner: Vec::new(),
        }
    }

    fn prepare_query(&self, query: &[f32], scratch: &mut PqScratch) {
        if self.precomputed.is_some() {
            scratch.inner.resize(self.table_len(), 0.0);
            self.pq.compute_inner_prod_table(query, &mut scratch.inner);
        }
    }

    fn scan_list(
        &self,
        scratch: &mut PqScratch,
        query: &[f32],
        list: usize,
        coarse_dist: f32,
        centroid: &[f32],
        codes: &[u8],
        out: &mut Vec<f32>,
    ) {
        let m = self.pq.m();
        let ksub = self.pq.ksub();

        match &self.precomputed {
            Some(terms) => {
                let per_list = m * ksub;
                let terms = &terms[list * per_list..(list + 1) * per_list];
                out.extend(codes.chunks_exact(m).map(|code| {
                    coarse_dist
                        + code
                            .iter()
                            .enumerate()
                            .map(|(sub, &c)| {
                                let j = sub * ksub + c as usize;
                                terms[j] - 2.0 * scratch.inner[j]
                            })
                            .sum::<f32>()
                }));
            }
            None => {
                for ((r, &q), &c) in scratch.residual.iter_mut().zip(query).zip(centroid) {
                    *r = q - c;
                }
                self.pq
                    .compute_distance_table(&scratch.residual, &mut scratch.distances);
                let table = &scratch.distances;
                out.extend(codes.chunks_exact(m).map(|code| {
                    code.iter()
                        .enumerate()
                        .map(|(sub, &c)| table[sub * ksub + c as usize])
                        .sum::<f32>()
                }));
            }
        }
    }

    fn precomputed_table_bytes(&self, nlist: usize) -> usize {
        nlist * self.table_len() * std::mem::size_of::<f32>()
    }

    fn set_precomputed(&mut self, enabled: bool, coarse: &CentroidTable) {
        self.precomputed = enabled.then(|| self.pq.coarse_term_table(coarse.as_slice()));
    }

    fn uses_precomputed(&self) -> bool {
        self.precomputed.is_some()
    }
}
