//! Host mirror export/import.

use ivfpq_gpu::config::IdStorage;
use ivfpq_gpu::index::{GpuIndexIvfPq, ImportOptions};
use ivfpq_gpu::mirror::{HostIvfPqIndex, MIRROR_FORMAT_VERSION};

use crate::common::fixtures::{clustered_vectors, uniform_vectors, BITS, DIM, NLIST, SUB_QUANTIZERS};
use crate::common::helpers::{list_total, pq_index, test_resources, trained_pq_index, verify_index_state};

fn populated_index(seed: u64) -> GpuIndexIvfPq {
    let data = clustered_vectors(700, DIM, 16, seed);
    let mut index = trained_pq_index(&data).expect("train failed");
    index.add(&data).expect("add failed");
    index
}

#[test]
fn test_export_import_round_trip() {
    println!("\n=== TEST: Export/Import Round Trip ===");
    let source = populated_index(101);

    let mut mirror = HostIvfPqIndex::new(DIM, NLIST, SUB_QUANTIZERS, BITS);
    println!("BEFORE export: mirror ntotal={}", mirror.ntotal);
    source.export_to(&mut mirror).expect("export failed");
    println!("AFTER export: mirror ntotal={}, lists={}", mirror.ntotal, mirror.lists.len());

    assert_eq!(mirror.version, MIRROR_FORMAT_VERSION);
    assert!(mirror.is_trained);
    assert_eq!(mirror.nlist, NLIST);
    assert_eq!(mirror.dimension, DIM);
    assert_eq!(mirror.ntotal, 700);
    assert_eq!(mirror.list_total(), 700);
    assert_eq!(mirror.coarse_centroids, source.quantizer().centroids());
    assert_eq!(mirror.pq.centroids, source.pq_centroids().expect("pq centroids"));

    let mut target = pq_index(IdStorage::Int64).expect("index");
    target.import_from(&mirror).expect("import failed");
    println!("AFTER import: target ntotal={}", target.ntotal());

    assert!(target.is_trained());
    assert_eq!(target.ntotal(), source.ntotal());
    assert_eq!(target.nlist(), source.nlist());
    assert_eq!(target.dimension(), source.dimension());
    for i in 0..NLIST {
        assert_eq!(target.get_list_codes(i).unwrap(), source.get_list_codes(i).unwrap());
        assert_eq!(target.get_list_indices(i).unwrap(), source.get_list_indices(i).unwrap());
    }
    assert_eq!(target.quantizer().centroids(), source.quantizer().centroids());
    verify_index_state(&target);

    let queries = uniform_vectors(8, DIM, 102);
    let a = source.search(&queries, 6).expect("search");
    let b = target.search(&queries, 6).expect("search");
    assert_eq!(a.labels, b.labels, "imported index answers identically");

    println!("=== PASSED ===\n");
}

#[test]
fn test_mirror_survives_json() {
    let source = populated_index(111);
    let mirror = source.to_host().expect("export failed");

    let json = serde_json::to_string(&mirror).expect("serialize");
    let restored: HostIvfPqIndex = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(restored, mirror);

    let rebuilt = GpuIndexIvfPq::from_host(test_resources(), &restored, ImportOptions::default())
        .expect("from_host failed");
    assert_eq!(rebuilt.ntotal(), source.ntotal());
    assert_eq!(list_total(&rebuilt), source.ntotal());
}

#[test]
fn test_from_host_takes_shape_from_mirror() {
    let source = populated_index(121);
    let mirror = source.to_host().expect("export failed");

    let options = ImportOptions {
        id_storage: IdStorage::Host,
        ..ImportOptions::default()
    };
    let index = GpuIndexIvfPq::from_host(test_resources(), &mirror, options).expect("from_host");

    assert_eq!(index.nlist(), NLIST);
    assert_eq!(index.dimension(), DIM);
    assert_eq!(index.nprobe(), mirror.nprobe);
    assert_eq!(index.pq_params().sub_quantizers, SUB_QUANTIZERS);
    assert_eq!(index.pq_params().bits_per_code, BITS);
    assert_eq!(index.config().id_storage, IdStorage::Host);
    verify_index_state(&index);
}

#[test]
fn test_untrained_export_and_import() {
    println!("\n=== TEST: Untrained Export/Import ===");
    let untrained = pq_index(IdStorage::Int64).expect("index");
    let mirror = untrained.to_host().expect("export failed");
    println!("AFTER export: is_trained={}", mirror.is_trained);

    assert!(!mirror.is_trained);
    assert!(mirror.coarse_centroids.is_empty());
    assert!(mirror.pq.centroids.is_empty());
    assert_eq!(mirror.lists.len(), NLIST);
    assert_eq!(mirror.list_total(), 0);

    // Importing an untrained mirror into a trained index untrains it.
    let mut trained = populated_index(131);
    println!("BEFORE import: trained={}, ntotal={}", trained.is_trained(), trained.ntotal());
    trained.import_from(&mirror).expect("import failed");
    println!("AFTER import: trained={}, ntotal={}", trained.is_trained(), trained.ntotal());

    assert!(!trained.is_trained());
    assert_eq!(trained.ntotal(), 0);

    // And it can be trained again afterwards.
    let data = clustered_vectors(400, DIM, 16, 132);
    trained.train(&data).expect("retrain failed");
    assert!(trained.is_trained());

    println!("=== PASSED ===\n");
}

#[test]
fn test_precomputed_flag_round_trips() {
    let mut source = populated_index(141);
    source.set_use_precomputed_tables(true).expect("enable precomputed");

    let mirror = source.to_host().expect("export failed");
    assert!(mirror.use_precomputed_table);
    assert_eq!(
        mirror.precomputed_table.len(),
        NLIST * SUB_QUANTIZERS * (1 << BITS)
    );

    let imported = GpuIndexIvfPq::from_host(test_resources(), &mirror, ImportOptions::default())
        .expect("from_host");
    assert!(imported.pq_params().use_precomputed_tables);

    let queries = uniform_vectors(4, DIM, 142);
    let a = source.search(&queries, 5).expect("search");
    let b = imported.search(&queries, 5).expect("search");
    assert_eq!(a.labels, b.labels);
}

#[test]
fn test_export_replaces_mirror_contents() {
    let source = populated_index(151);
    // A mirror of a different shape is fully overwritten.
    let mut mirror = HostIvfPqIndex::new(8, 3, 2, 8);
    mirror.ntotal = 999;
    source.export_to(&mut mirror).expect("export failed");

    assert_eq!(mirror.dimension, DIM);
    assert_eq!(mirror.nlist, NLIST);
    assert_eq!(mirror.pq.m, SUB_QUANTIZERS);
    assert_eq!(mirror.ntotal, 700);
    assert!(mirror.check_structure().is_ok());
}

#[test]
fn test_import_clamps_nprobe_to_device_limit() {
    let source = populated_index(161);
    let mut mirror = source.to_host().expect("export failed");
    let max_nprobe = source.resources().capability().max_nprobe;

    mirror.nprobe = max_nprobe * 2;
    let mut target = pq_index(IdStorage::Int64).expect("index");
    target.import_from(&mirror).expect("oversized nprobe is clamped");
    assert_eq!(target.nprobe(), max_nprobe);
    assert_eq!(target.ntotal(), 700);

    mirror.nprobe = 0;
    target.import_from(&mirror).expect("zero nprobe is clamped");
    assert_eq!(target.nprobe(), 1);
}

#[test]
fn test_add_after_import_continues_past_imported_ids() {
    let source = populated_index(171);
    let mirror = source.to_host().expect("export failed");
    let mut target = pq_index(IdStorage::Int64).expect("index");
    target.import_from(&mirror).expect("import failed");

    let extra = uniform_vectors(3, DIM, 172);
    assert_eq!(target.add(&extra).expect("add failed"), 3);

    let mut ids: Vec<i64> = (0..NLIST)
        .flat_map(|i| target.get_list_indices(i).expect("ids"))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 703, "no id is shared between imported and added vectors");
    assert_eq!(ids[700..], [700, 701, 702]);
}
