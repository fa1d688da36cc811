//! Configuration validation against algorithmic and device limits.
//!
//! Checks run in a fixed order and stop at the first violation, so the
//! returned [`IvfPqError::Configuration`] always names a single constraint
//! and the value that broke it. Validation is pure: callers build a complete
//! candidate config, validate it, and only then swap it in.

use crate::device::DeviceCapability;
use crate::error::{IvfPqError, IvfPqResult};

use super::constants::{
    MAX_BITS_PER_CODE, SUPPORTED_NO_PRECOMPUTE_DIMS, SUPPORTED_SUB_QUANTIZERS,
};
use super::index::{IvfConfig, PqParams};
use super::metric::MetricType;

/// Validate the structural IVF fields (list count, dimension).
pub fn verify_ivf_shape(ivf: &IvfConfig) -> IvfPqResult<()> {
    if ivf.nlist == 0 {
        return Err(IvfPqError::config("nlist > 0", ivf.nlist));
    }
    if ivf.dimension == 0 {
        return Err(IvfPqError::config("dimension > 0", ivf.dimension));
    }
    Ok(())
}

/// Validate nprobe against the device selection limit.
///
/// Not part of [`verify_ivf`] / [`verify_pq`]: nprobe is a search-time knob
/// that never makes an encoding invalid. Construction and `set_nprobe`
/// check it; import clamps it.
pub fn verify_nprobe(ivf: &IvfConfig, caps: &DeviceCapability) -> IvfPqResult<()> {
    if ivf.nprobe == 0 || ivf.nprobe > caps.max_nprobe {
        return Err(IvfPqError::config(
            "0 < nprobe <= device max_nprobe",
            format!("{} (max {})", ivf.nprobe, caps.max_nprobe),
        ));
    }
    Ok(())
}

/// Validate the metric. Only squared L2 is supported.
pub fn verify_metric(ivf: &IvfConfig) -> IvfPqResult<()> {
    if ivf.metric != MetricType::L2 {
        return Err(IvfPqError::config("metric == L2", format!("{:?}", ivf.metric)));
    }
    Ok(())
}

/// Validate an IVF config with an encoding that has no extra constraints.
pub fn verify_ivf(ivf: &IvfConfig) -> IvfPqResult<()> {
    verify_ivf_shape(ivf)?;
    verify_metric(ivf)
}

/// Validate an IVF-PQ configuration.
///
/// Order: nlist, bits per code, divisibility, supported sub-quantizer
/// count, scratch fit, no-precompute sub-dimension, metric.
pub fn verify_pq(ivf: &IvfConfig, pq: &PqParams, caps: &DeviceCapability) -> IvfPqResult<()> {
    verify_ivf_shape(ivf)?;

    if pq.bits_per_code == 0 || pq.bits_per_code > MAX_BITS_PER_CODE {
        return Err(IvfPqError::config("1 <= bits_per_code <= 8", pq.bits_per_code));
    }

    if pq.sub_quantizers == 0 || ivf.dimension % pq.sub_quantizers != 0 {
        return Err(IvfPqError::config(
            "dimension % sub_quantizers == 0",
            format!("{} % {}", ivf.dimension, pq.sub_quantizers),
        ));
    }

    if !SUPPORTED_SUB_QUANTIZERS.contains(&pq.sub_quantizers) {
        return Err(IvfPqError::config(
            "sub_quantizers in supported set",
            pq.sub_quantizers,
        ));
    }

    let scratch = pq.scratch_bytes();
    if scratch > caps.shared_mem_per_block {
        return Err(IvfPqError::config(
            "lookup table fits per-block scratch",
            format!(
                "{} bytes needed ({} x {} x {}), {} available",
                scratch,
                pq.lookup_precision.elem_size(),
                pq.sub_quantizers,
                pq.ksub(),
                caps.shared_mem_per_block
            ),
        ));
    }

    let sub_dim = ivf.dimension / pq.sub_quantizers;
    if !pq.use_precomputed_tables && !SUPPORTED_NO_PRECOMPUTE_DIMS.contains(&sub_dim) {
        return Err(IvfPqError::config(
            "dimension / sub_quantizers in no-precompute set (or enable precomputed tables)",
            sub_dim,
        ));
    }

    verify_metric(ivf)
}
