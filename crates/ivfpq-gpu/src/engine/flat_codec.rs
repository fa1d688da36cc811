//! Uncompressed list codec: residuals stored as little-endian `f32` bytes.

use crate::quantizer::squared_l2;

use super::ListCodec;

#[derive(Debug, Clone)]
pub struct FlatCodec {
    dimension: usize,
}

impl FlatCodec {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl ListCodec for FlatCodec {
    type Scratch = (Vec<f32>, Vec<f32>);

    fn code_size(&self) -> usize {
        self.dimension * std::mem::size_of::<f32>()
    }

    fn device_bytes(&self) -> usize {
        0
    }

    fn encode(&self, residual: &[f32], code: &mut [u8]) {
        for (dst, x) in code.chunks_exact_mut(4).zip(residual) {
            dst.copy_from_slice(&x.to_le_bytes());
        }
    }

    fn scratch(&self) -> Self::Scratch {
        (vec![0.0; self.dimension], vec![0.0; self.dimension])
    }

    fn prepare_query(&self, _query: &[f32], _scratch: &mut Self::Scratch) {}

    fn scan_list(
        &self,
        scratch: &mut Self::Scratch,
        query: &[f32],
        _list: usize,
        _coarse_dist: f32,
        centroid: &[f32],
        codes: &[u8],
        out: &mut Vec<f32>,
    ) {
        let (residual, decoded) = scratch;
        for ((r, &q), &c) in residual.iter_mut().zip(query).zip(centroid) {
            *r = q - c;
        }
        for code in codes.chunks_exact(self.code_size()) {
            for (d, bytes) in decoded.iter_mut().zip(code.chunks_exact(4)) {
                *d = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            out.push(squared_l2(residual, decoded));
        }
    }
}
