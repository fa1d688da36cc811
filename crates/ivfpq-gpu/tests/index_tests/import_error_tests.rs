//! Mirrors the device index refuses, and exports it cannot produce.
//!
//! Every rejected import must leave the target index exactly as it was.

use ivfpq_gpu::config::{IdStorage, MetricType};
use ivfpq_gpu::device::DeviceCapability;
use ivfpq_gpu::error::IvfPqError;
use ivfpq_gpu::index::{GpuIndexIvfPq, ImportOptions};
use ivfpq_gpu::mirror::HostIvfPqIndex;

use crate::common::fixtures::{clustered_vectors, DIM, NLIST};
use crate::common::helpers::{list_total, pq_index, resources_with, trained_pq_index};

fn populated() -> (GpuIndexIvfPq, HostIvfPqIndex) {
    let data = clustered_vectors(500, DIM, 16, 201);
    let mut index = trained_pq_index(&data).expect("train failed");
    index.add(&data).expect("add failed");
    let mirror = index.to_host().expect("export failed");
    (index, mirror)
}

/// Import `mirror` into a populated index, assert the error, and check the
/// index kept its contents.
fn assert_rejected(mirror: &HostIvfPqIndex) -> IvfPqError {
    let (mut index, _) = populated();
    let before = index.ntotal();
    println!("BEFORE import: ntotal={}", before);
    let err = index.import_from(mirror).expect_err("import should fail");
    println!("AFTER import: err={}, ntotal={}", err, index.ntotal());

    assert!(index.is_trained());
    assert_eq!(index.ntotal(), before);
    assert_eq!(list_total(&index), before);
    err
}

#[test]
fn test_reject_inner_product() {
    let (_, mut mirror) = populated();
    mirror.metric = MetricType::InnerProduct;
    assert_eq!(
        assert_rejected(&mirror),
        IvfPqError::UnsupportedMetric(MetricType::InnerProduct)
    );
}

#[test]
fn test_reject_polysemous() {
    let (_, mut mirror) = populated();
    mirror.polysemous = true;
    assert!(matches!(assert_rejected(&mirror), IvfPqError::UnsupportedEncoding(_)));
}

#[test]
fn test_reject_nine_bit_codes() {
    let (_, mut mirror) = populated();
    mirror.pq.nbits = 9;
    let err = assert_rejected(&mirror);
    assert!(matches!(err, IvfPqError::UnsupportedEncoding(ref msg) if msg.contains('9')));
}

#[test]
fn test_reject_raw_vector_codes() {
    let (_, mut mirror) = populated();
    mirror.by_residual = false;
    assert!(matches!(assert_rejected(&mirror), IvfPqError::UnsupportedEncoding(_)));
}

#[test]
fn test_reject_corrupt_lists() {
    let (_, mut mirror) = populated();
    let list = mirror
        .lists
        .iter()
        .position(|l| !l.is_empty())
        .expect("some list is populated");
    mirror.lists[list].codes.pop();
    assert!(matches!(assert_rejected(&mirror), IvfPqError::CorruptMirror(_)));

    let (_, mut mirror) = populated();
    mirror.lists.pop();
    assert!(matches!(assert_rejected(&mirror), IvfPqError::CorruptMirror(_)));
}

#[test]
fn test_reject_trained_mirror_without_pq_centroids() {
    let (_, mut mirror) = populated();
    mirror.pq.centroids.clear();
    assert!(matches!(assert_rejected(&mirror), IvfPqError::CorruptMirror(_)));
}

#[test]
fn test_reject_invalid_shape() {
    // 32 is not divisible by 3 sub-quantizers.
    let mirror = HostIvfPqIndex::new(DIM, NLIST, 3, 8);
    let err = assert_rejected(&mirror);
    assert!(
        matches!(err, IvfPqError::Configuration { constraint, .. } if constraint.contains('%')),
        "got {:?}",
        err
    );
}

#[test]
fn test_reject_list_over_device_limit() {
    let (_, mirror) = populated();
    let longest = mirror.lists.iter().map(|l| l.len()).max().unwrap_or(0);
    assert!(longest > 1);

    let resources = resources_with(DeviceCapability::default().with_max_list_len(longest - 1));
    let err = GpuIndexIvfPq::from_host(resources, &mirror, ImportOptions::default())
        .expect_err("list exceeds limit");
    println!("AFTER from_host: err={}", err);
    match err {
        IvfPqError::CapacityExceeded { limit, actual, .. } => {
            assert_eq!(limit, longest - 1);
            assert!(actual > limit);
        }
        other => panic!("expected CapacityExceeded, got {:?}", other),
    }
}

#[test]
fn test_list_offset_export_unsupported() {
    let data = clustered_vectors(400, DIM, 16, 211);
    let mut index = pq_index(IdStorage::ListOffset).expect("index");
    index.train(&data).expect("train failed");
    index.add(&data).expect("add failed");

    let mut mirror = HostIvfPqIndex::new(DIM, NLIST, 8, 5);
    let before = mirror.clone();
    let err = index.export_to(&mut mirror).expect_err("export should fail");
    assert_eq!(
        err,
        IvfPqError::UnsupportedExport {
            mode: IdStorage::ListOffset
        }
    );
    assert_eq!(mirror, before, "failed export leaves the mirror untouched");
}
