//! Allocation, release, and budget enforcement.

use std::sync::Arc;
use std::thread;

use ivfpq_gpu::device::memory::{GpuMemoryConfig, GpuMemoryManager, MemoryCategory};
use ivfpq_gpu::error::IvfPqError;

#[test]
fn test_handle_drop_returns_bytes() {
    println!("\n=== TEST: Handle Drop Returns Bytes ===");
    let manager = GpuMemoryManager::new(GpuMemoryConfig::with_budget(1 << 20))
        .expect("Manager creation failed");

    println!("BEFORE: used={}", manager.used());
    let handle = manager
        .allocate(256 * 1024, MemoryCategory::InvertedLists)
        .expect("Allocation failed");
    println!("AFTER allocate: used={}, id={}", manager.used(), handle.id());

    assert_eq!(manager.used(), 256 * 1024);
    assert_eq!(manager.available(), 768 * 1024);
    assert_eq!(handle.category(), MemoryCategory::InvertedLists);

    drop(handle);
    println!("AFTER drop: used={}", manager.used());
    assert_eq!(manager.used(), 0);
    assert_eq!(manager.stats().allocation_count, 0);

    println!("=== PASSED ===\n");
}

#[test]
fn test_total_budget_enforced() {
    let manager =
        GpuMemoryManager::new(GpuMemoryConfig::with_budget(1000)).expect("Manager creation failed");

    let _first = manager
        .allocate(600, MemoryCategory::Staging)
        .expect("Within budget");
    match manager.allocate(600, MemoryCategory::Centroids) {
        Err(IvfPqError::GpuResourceAllocation(msg)) => {
            println!("Rejected as expected: {}", msg);
            assert!(msg.contains("total budget"));
        }
        other => panic!("Expected GpuResourceAllocation, got {:?}", other),
    }
    assert_eq!(manager.used(), 600, "Failed allocation must not be recorded");
    assert!(manager.try_allocate(600, MemoryCategory::Staging).is_none());
    assert!(manager.try_allocate(400, MemoryCategory::Staging).is_some());
}

#[test]
fn test_zero_size_and_exact_budget() {
    let manager =
        GpuMemoryManager::new(GpuMemoryConfig::with_budget(4096)).expect("Manager creation failed");

    let empty = manager.allocate(0, MemoryCategory::Other).expect("Zero size");
    assert_eq!(empty.size(), 0);
    assert_eq!(manager.used(), 0);

    let full = manager
        .allocate(4096, MemoryCategory::InvertedLists)
        .expect("Exact budget");
    assert_eq!(manager.available(), 0);
    assert!(manager.allocate(1, MemoryCategory::Other).is_err());
    drop(full);
    assert_eq!(manager.available(), 4096);
}

#[test]
fn test_peak_usage_survives_free() {
    let manager = GpuMemoryManager::new(GpuMemoryConfig::with_budget(1 << 20))
        .expect("Manager creation failed");

    let a = manager.allocate(1000, MemoryCategory::Staging).expect("a");
    let b = manager.allocate(3000, MemoryCategory::Staging).expect("b");
    drop(a);
    drop(b);
    let _c = manager.allocate(500, MemoryCategory::Staging).expect("c");

    let stats = manager.stats();
    println!("AFTER: {:?}", stats);
    assert_eq!(stats.total_allocated, 500);
    assert_eq!(stats.peak_usage, 4000);
}

#[test]
fn test_clones_share_pool() {
    let manager = GpuMemoryManager::new(GpuMemoryConfig::with_budget(10_000))
        .expect("Manager creation failed");
    let clone = manager.clone();

    let handle = clone.allocate(2500, MemoryCategory::Centroids).expect("alloc");
    assert_eq!(manager.used(), 2500);
    drop(handle);
    assert_eq!(manager.used(), 0);
}

#[test]
fn test_concurrent_allocations() {
    println!("\n=== TEST: Concurrent Allocations ===");
    let manager = Arc::new(
        GpuMemoryManager::new(GpuMemoryConfig::with_budget(100 * 1024 * 1024))
            .expect("Manager creation failed"),
    );

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..100 {
                    let handle = manager
                        .allocate(1024, MemoryCategory::Staging)
                        .expect("Allocation failed");
                    assert_eq!(handle.size(), 1024);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    println!("AFTER: used={}", manager.used());
    assert_eq!(manager.used(), 0, "Every handle dropped");
    assert!(manager.stats().peak_usage >= 1024);
    println!("=== PASSED ===\n");
}

#[test]
fn test_debug_reports_usage() {
    let manager = GpuMemoryManager::new(GpuMemoryConfig::with_budget(1_000_000))
        .expect("Manager creation failed");
    let _h = manager.allocate(1234, MemoryCategory::Other).expect("alloc");
    let debug = format!("{:?}", manager);
    assert!(debug.contains("GpuMemoryManager"));
    assert!(debug.contains("1234"));
}
