//! Train/add/search lifecycle.

use ivfpq_gpu::config::IdStorage;
use ivfpq_gpu::error::IvfPqError;

use crate::common::fixtures::{clustered_vectors, strided_ids, uniform_vectors, DIM, NLIST};
use crate::common::helpers::{
    list_total, pq_index, trained_flat_index, trained_pq_index, verify_index_state,
    verify_result_order,
};

const CLUSTERS: usize = 16;

#[test]
fn test_add_1000_vectors() {
    println!("\n=== TEST: Add 1000 Vectors ===");
    let data = clustered_vectors(1000, DIM, CLUSTERS, 7);
    let mut index = trained_pq_index(&data).expect("train failed");

    println!("BEFORE: ntotal={}", index.ntotal());
    let inserted = index.add(&data).expect("add failed");
    println!("AFTER: inserted={}, ntotal={}", inserted, index.ntotal());

    assert_eq!(inserted, 1000);
    assert_eq!(index.ntotal(), 1000);
    assert_eq!(list_total(&index), 1000);
    verify_index_state(&index);

    let mut ids: Vec<i64> = (0..NLIST)
        .flat_map(|i| index.get_list_indices(i).expect("ids"))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..1000).collect::<Vec<i64>>());

    let freed = index.reclaim_memory().expect("reclaim failed");
    println!("AFTER reclaim: freed={} bytes", freed);
    assert_eq!(list_total(&index), 1000, "reclaim must not drop entries");

    println!("=== PASSED ===\n");
}

#[test]
fn test_search_returns_k_sorted_with_sentinels() {
    println!("\n=== TEST: Search k With Sentinels ===");
    let train = clustered_vectors(512, DIM, CLUSTERS, 11);
    let mut index = trained_pq_index(&train).expect("train failed");

    // Only 5 vectors stored: k = 10 must pad with sentinels.
    let stored = clustered_vectors(5, DIM, CLUSTERS, 12);
    index
        .add_with_ids(&stored, &strided_ids(5, 100, 1))
        .expect("add failed");
    index.set_nprobe(NLIST).expect("nprobe");

    let queries = uniform_vectors(3, DIM, 13);
    let result = index.search(&queries, 10).expect("search failed");
    println!("AFTER: labels={:?}", result.labels);

    assert_eq!(result.len(), 3);
    assert_eq!(result.labels.len(), 30);
    verify_result_order(&result.labels, &result.distances, 10);
    for q in 0..3 {
        assert_eq!(result.num_valid_results(q), 5, "all lists probed");
        assert!(result
            .query_results(q)
            .all(|(label, _)| (100..105).contains(&label)));
    }
    assert_eq!(result.total_valid_results(), 15);

    println!("=== PASSED ===\n");
}

#[test]
fn test_search_finds_own_cluster() {
    println!("\n=== TEST: Search Finds Own Cluster ===");
    let data = clustered_vectors(800, DIM, CLUSTERS, 21);
    let mut index = trained_pq_index(&data).expect("train failed");
    index.add(&data).expect("add failed");

    let queries = &data[..20 * DIM];
    let result = index.search(queries, 5).expect("search failed");
    verify_result_order(&result.labels, &result.distances, 5);

    for q in 0..20 {
        let (top, distance) = result.top_result(q).expect("query has a match");
        println!("  query {} -> label {} at {:.4}", q, top, distance);
        assert_eq!(top as usize % CLUSTERS, q % CLUSTERS, "nearest is in the query's cluster");
    }

    println!("=== PASSED ===\n");
}

#[test]
fn test_flat_encoding_exact_self_match() {
    println!("\n=== TEST: Flat Encoding Exact Self Match ===");
    let data = clustered_vectors(400, DIM, CLUSTERS, 31);
    let mut index = trained_flat_index(&data).expect("train failed");
    assert_eq!(index.factory_string(), format!("IVF{},Flat", NLIST));
    assert_eq!(index.code_size(), DIM * 4);

    index.add(&data).expect("add failed");
    verify_index_state(&index);

    let result = index.search(&data[..10 * DIM], 3).expect("search failed");
    for q in 0..10 {
        let (label, distance) = result.top_result(q).expect("match");
        assert_eq!(label, q as i64);
        assert!(distance < 1e-3, "self distance {} should be ~0", distance);
    }

    println!("=== PASSED ===\n");
}

#[test]
fn test_reset_then_add() {
    println!("\n=== TEST: Reset Then Add ===");
    let data = clustered_vectors(600, DIM, CLUSTERS, 41);
    let mut index = trained_pq_index(&data).expect("train failed");
    index.add(&data).expect("add failed");

    println!("BEFORE reset: ntotal={}", index.ntotal());
    index.reset();
    println!("AFTER reset: ntotal={}", index.ntotal());

    assert!(index.is_trained(), "reset keeps training");
    assert!(index.is_empty());
    assert_eq!(list_total(&index), 0);
    let result = index.search(&data[..DIM], 4).expect("search failed");
    assert!(result.is_empty());

    let inserted = index.add(&data[..100 * DIM]).expect("add failed");
    assert_eq!(inserted, 100);
    assert_eq!(list_total(&index), 100);
    verify_index_state(&index);

    println!("=== PASSED ===\n");
}

#[test]
fn test_operations_before_training() {
    let index = pq_index(IdStorage::Int64).expect("index");
    let queries = uniform_vectors(1, DIM, 1);

    assert_eq!(index.search(&queries, 1).unwrap_err(), IvfPqError::IndexNotTrained);
    assert_eq!(index.get_list_length(0).unwrap_err(), IvfPqError::IndexNotTrained);
    assert_eq!(index.get_list_codes(0).unwrap_err(), IvfPqError::IndexNotTrained);
    assert_eq!(index.get_list_indices(0).unwrap_err(), IvfPqError::IndexNotTrained);

    let mut index = index;
    assert_eq!(index.add(&queries).unwrap_err(), IvfPqError::IndexNotTrained);
    assert_eq!(index.reclaim_memory().unwrap(), 0);
}

#[test]
fn test_reserve_before_training_applies_after() {
    let data = clustered_vectors(512, DIM, CLUSTERS, 51);
    let mut index = pq_index(IdStorage::Int64).expect("index");
    index.reserve_memory(NLIST * 8).expect("reserve");

    println!("BEFORE train: pool used={}", index.resources().memory().stats().total_allocated);
    index.train(&data).expect("train failed");
    let stats = index.resources().memory().stats();
    println!("AFTER train: stats={:?}", stats);
    assert!(stats.usage_of(ivfpq_gpu::MemoryCategory::InvertedLists) > 0);
}

#[test]
fn test_int32_ids_out_of_range_rejected_atomically() {
    let data = clustered_vectors(512, DIM, CLUSTERS, 61);
    let mut index = pq_index(IdStorage::Int32).expect("index");
    index.train(&data).expect("train failed");
    index.add(&data[..10 * DIM]).expect("add failed");

    let mut ids = strided_ids(4, 1000, 1);
    ids[3] = i64::from(i32::MAX) + 1;
    let err = index.add_with_ids(&data[..4 * DIM], &ids).unwrap_err();
    assert!(matches!(err, IvfPqError::InvalidInput(_)), "got {:?}", err);
    assert_eq!(index.ntotal(), 10, "failed add leaves index unchanged");
    assert_eq!(list_total(&index), 10);

    let ids = strided_ids(4, -5, 1);
    assert_eq!(index.add_with_ids(&data[..4 * DIM], &ids).expect("add"), 4);
    verify_index_state(&index);
}

#[test]
fn test_list_offset_labels_encode_position() {
    let data = clustered_vectors(512, DIM, CLUSTERS, 71);
    let mut index = pq_index(IdStorage::ListOffset).expect("index");
    index.train(&data).expect("train failed");
    index.add(&data).expect("add failed");

    let result = index.search(&data[..4 * DIM], 3).expect("search failed");
    for (_, label, _) in result.all_results() {
        let list = (label >> 32) as usize;
        let offset = (label & 0xFFFF_FFFF) as usize;
        assert!(list < NLIST);
        assert!(offset < index.get_list_length(list).expect("len"));
    }
}

#[test]
fn test_non_finite_vectors_skipped() {
    let data = clustered_vectors(512, DIM, CLUSTERS, 81);
    let mut index = trained_pq_index(&data).expect("train failed");

    let mut batch = data[..3 * DIM].to_vec();
    batch[DIM + 2] = f32::NAN;
    let inserted = index
        .add_with_ids(&batch, &strided_ids(3, 0, 1))
        .expect("add failed");
    assert_eq!(inserted, 2);
    assert_eq!(index.ntotal(), 2);
    verify_index_state(&index);
}

#[test]
fn test_sequential_ids_skip_rejected_rows() {
    println!("\n=== TEST: Sequential Ids After Skipped Rows ===");
    let data = clustered_vectors(512, DIM, CLUSTERS, 91);
    let mut index = trained_pq_index(&data).expect("train failed");

    let mut batch = data[..3 * DIM].to_vec();
    batch[DIM] = f32::NAN;
    assert_eq!(index.add(&batch).expect("add failed"), 2);
    assert_eq!(index.add(&data[3 * DIM..4 * DIM]).expect("add failed"), 1);

    let mut ids: Vec<i64> = (0..NLIST)
        .flat_map(|i| index.get_list_indices(i).expect("ids"))
        .collect();
    ids.sort_unstable();
    println!("AFTER: ids={:?}", ids);
    assert_eq!(ids, vec![0, 2, 3], "id of the skipped row must not be reused");

    index.reset();
    assert_eq!(index.add(&data[..DIM]).expect("add failed"), 1);
    let ids: Vec<i64> = (0..NLIST)
        .flat_map(|i| index.get_list_indices(i).expect("ids"))
        .collect();
    assert_eq!(ids, vec![0], "reset restarts sequential ids");

    println!("=== PASSED ===\n");
}

#[test]
fn test_sentinel_id_rejected() {
    let data = clustered_vectors(512, DIM, CLUSTERS, 95);
    let mut index = trained_pq_index(&data).expect("train failed");

    let err = index
        .add_with_ids(&data[..2 * DIM], &[7, -1])
        .expect_err("-1 marks empty result slots");
    assert!(matches!(err, IvfPqError::InvalidInput(_)));
    assert_eq!(index.ntotal(), 0);
    assert_eq!(list_total(&index), 0);
}
