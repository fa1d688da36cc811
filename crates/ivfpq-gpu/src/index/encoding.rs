//! Pluggable list encodings for [`GpuIndexIvf`](super::GpuIndexIvf).
//!
//! The IVF orchestrator is generic over an [`EncodingStrategy`]; the
//! strategy validates its own parameters, trains a codec from residuals,
//! and hands the codec to the engine. Two strategies ship:
//!
//! | Strategy | Codec | Code size |
//! |---|---|---|
//! | [`PqEncoding`] | [`PqCodec`] | M bytes |
//! | [`FlatEncoding`] | [`FlatCodec`] | 4 * D bytes |

use serde::{Deserialize, Serialize};

use crate::config::{verify_ivf, verify_pq, IvfConfig, PqParams};
use crate::device::DeviceCapability;
use crate::engine::{FlatCodec, ListCodec, PqCodec};
use crate::error::IvfPqResult;
use crate::quantizer::ProductQuantizer;

/// How list entries are encoded.
pub trait EncodingStrategy: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Codec the engine runs for this encoding.
    type Codec: ListCodec;

    /// Validate this encoding together with the IVF config.
    fn verify(&self, ivf: &IvfConfig, caps: &DeviceCapability) -> IvfPqResult<()>;

    /// Bytes per encoded vector at `dimension`.
    fn code_size(&self, dimension: usize) -> usize;

    /// Upper bound on residuals used to train the codec. Zero means the
    /// codec needs no training data.
    fn max_training_samples(&self) -> usize;

    /// Build a codec from training residuals.
    fn train_codec(&self, ivf: &IvfConfig, residuals: &[f32]) -> IvfPqResult<Self::Codec>;

    /// Whether the engine should run with precomputed term tables.
    fn uses_precomputed_tables(&self) -> bool {
        false
    }

    /// Whether `other` stores lists with the same layout, so a trained
    /// engine can switch to it without re-encoding.
    fn same_layout(&self, other: &Self) -> bool;

    /// Factory-style description, e.g. `IVF1024,PQ16x8`.
    fn factory_string(&self, nlist: usize) -> String;
}

/// Product quantization of residuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PqEncoding {
    pub params: PqParams,
}

impl PqEncoding {
    pub fn new(params: PqParams) -> Self {
        Self { params }
    }
}

impl From<PqParams> for PqEncoding {
    fn from(params: PqParams) -> Self {
        Self { params }
    }
}

impl EncodingStrategy for PqEncoding {
    type Codec = PqCodec;

    fn verify(&self, ivf: &IvfConfig, caps: &DeviceCapability) -> IvfPqResult<()> {
        verify_pq(ivf, &self.params, caps)
    }

    fn code_size(&self, _dimension: usize) -> usize {
        self.params.sub_quantizers
    }

    fn max_training_samples(&self) -> usize {
        self.params.max_training_samples()
    }

    fn train_codec(&self, ivf: &IvfConfig, residuals: &[f32]) -> IvfPqResult<PqCodec> {
        let mut pq = ProductQuantizer::new(
            ivf.dimension,
            self.params.sub_quantizers,
            self.params.bits_per_code,
        )?;
        pq.train(residuals, ivf.kmeans_iterations, ivf.seed)?;
        Ok(PqCodec::new(pq))
    }

    fn uses_precomputed_tables(&self) -> bool {
        self.params.use_precomputed_tables
    }

    fn same_layout(&self, other: &Self) -> bool {
        self.params.sub_quantizers == other.params.sub_quantizers
            && self.params.bits_per_code == other.params.bits_per_code
    }

    fn factory_string(&self, nlist: usize) -> String {
        self.params.factory_string(nlist)
    }
}

/// Uncompressed residuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlatEncoding;

impl EncodingStrategy for FlatEncoding {
    type Codec = FlatCodec;

    fn verify(&self, ivf: &IvfConfig, _caps: &DeviceCapability) -> IvfPqResult<()> {
        verify_ivf(ivf)
    }

    fn code_size(&self, dimension: usize) -> usize {
        dimension * std::mem::size_of::<f32>()
    }

    fn max_training_samples(&self) -> usize {
        0
    }

    fn train_codec(&self, ivf: &IvfConfig, _residuals: &[f32]) -> IvfPqResult<FlatCodec> {
        Ok(FlatCodec::new(ivf.dimension))
    }

    fn same_layout(&self, _other: &Self) -> bool {
        true
    }

    fn factory_string(&self, nlist: usize) -> String {
        format!("IVF{},Flat", nlist)
    }
}
