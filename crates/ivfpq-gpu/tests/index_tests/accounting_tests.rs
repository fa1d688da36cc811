//! Device pool usage across index operations.

use ivfpq_gpu::config::{IdStorage, IvfConfig, MemorySpace};
use ivfpq_gpu::device::{GpuMemoryConfig, GpuResources, DeviceCapability, MemoryCategory};
use ivfpq_gpu::error::IvfPqError;
use ivfpq_gpu::index::{GpuIndexIvfPq, PqEncoding};
use std::sync::Arc;

use crate::common::fixtures::{clustered_vectors, uniform_vectors, DIM};
use crate::common::helpers::{ivf_config, pq_params, trained_pq_index};

#[test]
fn test_staging_released_after_each_call() {
    println!("\n=== TEST: Staging Released ===");
    let data = clustered_vectors(600, DIM, 16, 301);
    let mut index = trained_pq_index(&data).expect("train failed");
    let memory = index.resources().memory().clone();

    println!("BEFORE add: {:?}", memory.stats());
    index.add(&data).expect("add failed");
    println!("AFTER add: {:?}", memory.stats());
    assert_eq!(memory.stats().usage_of(MemoryCategory::Staging), 0);
    assert!(memory.stats().usage_of(MemoryCategory::InvertedLists) > 0);
    assert!(memory.stats().usage_of(MemoryCategory::Centroids) > 0);

    let peak_before = memory.stats().peak_usage;
    index
        .search(&uniform_vectors(50, DIM, 302), 10)
        .expect("search failed");
    assert_eq!(memory.stats().usage_of(MemoryCategory::Staging), 0);
    assert!(memory.stats().peak_usage >= peak_before);

    println!("=== PASSED ===\n");
}

#[test]
fn test_reset_and_reclaim_release_list_storage() {
    let data = clustered_vectors(600, DIM, 16, 311);
    let mut index = trained_pq_index(&data).expect("train failed");
    let memory = index.resources().memory().clone();

    index.add(&data).expect("add failed");
    let lists_after_add = memory.stats().usage_of(MemoryCategory::InvertedLists);
    let freed = index.reclaim_memory().expect("reclaim failed");
    let lists_after_reclaim = memory.stats().usage_of(MemoryCategory::InvertedLists);
    println!(
        "lists: after add={}, after reclaim={}, freed={}",
        lists_after_add, lists_after_reclaim, freed
    );
    assert_eq!(lists_after_add - lists_after_reclaim, freed);

    index.reset();
    assert_eq!(memory.stats().usage_of(MemoryCategory::InvertedLists), 0);
    assert!(memory.stats().usage_of(MemoryCategory::Centroids) > 0, "training survives reset");
}

#[test]
fn test_precomputed_tables_accounted() {
    let data = clustered_vectors(600, DIM, 16, 321);
    let mut index = trained_pq_index(&data).expect("train failed");
    let memory = index.resources().memory().clone();
    assert_eq!(memory.stats().usage_of(MemoryCategory::PrecomputedTables), 0);

    index.set_use_precomputed_tables(true).expect("enable");
    assert!(memory.stats().usage_of(MemoryCategory::PrecomputedTables) > 0);

    index.set_use_precomputed_tables(false).expect("disable");
    assert_eq!(memory.stats().usage_of(MemoryCategory::PrecomputedTables), 0);
}

#[test]
fn test_list_budget_exhaustion_leaves_index_unchanged() {
    let data = clustered_vectors(600, DIM, 16, 331);
    // Enough for centroids, far too little for 600 list entries.
    let config = GpuMemoryConfig::with_budget(64 * 1024 * 1024)
        .category_budget(MemoryCategory::InvertedLists, 512);
    let resources = Arc::new(
        GpuResources::with_config(0, DeviceCapability::default(), config).expect("resources"),
    );
    let mut index = GpuIndexIvfPq::new(
        resources,
        ivf_config(IdStorage::Int64),
        PqEncoding::new(pq_params()),
    )
    .expect("index");
    index.train(&data).expect("train failed");

    let err = index.add(&data).expect_err("budget exhausted");
    println!("AFTER add: err={}", err);
    assert!(matches!(err, IvfPqError::GpuResourceAllocation(_)));
    assert_eq!(index.ntotal(), 0);
    assert_eq!(
        index.resources().memory().stats().usage_of(MemoryCategory::Staging),
        0
    );
}

#[test]
fn test_unified_memory_space_oversubscribes_list_budget() {
    println!("\n=== TEST: Unified List Storage ===");
    let data = clustered_vectors(700, DIM, 16, 341);
    let config = GpuMemoryConfig::with_budget(64 * 1024 * 1024)
        .category_budget(MemoryCategory::InvertedLists, 1024);
    let resources = Arc::new(
        GpuResources::with_config(0, DeviceCapability::default(), config).expect("resources"),
    );
    let ivf = IvfConfig {
        memory_space: MemorySpace::Unified,
        ..ivf_config(IdStorage::Int64)
    };
    let mut index =
        GpuIndexIvfPq::new(resources, ivf, PqEncoding::new(pq_params())).expect("index");
    index.train(&data).expect("train failed");

    let inserted = index.add(&data).expect("unified lists ignore the list budget");
    let stats = index.resources().memory().stats();
    println!("AFTER add: inserted={}, stats={:?}", inserted, stats);

    assert_eq!(inserted, 700);
    assert_eq!(index.ntotal(), 700);
    assert!(stats.usage_of(MemoryCategory::InvertedLists) > 1024);
    assert_eq!(stats.usage_of(MemoryCategory::Staging), 0);

    // Shrinking an over-subscribed pool must still succeed and stay exact.
    let before = stats.usage_of(MemoryCategory::InvertedLists);
    let freed = index.reclaim_memory().expect("reclaim failed");
    let after = index.resources().memory().stats().usage_of(MemoryCategory::InvertedLists);
    assert_eq!(before - after, freed);
    assert_eq!(index.ntotal(), 700);

    println!("=== PASSED ===\n");
}
