//! Pool configuration validation and serde.

#![allow(clippy::field_reassign_with_default)]

use ivfpq_gpu::device::memory::{GpuMemoryConfig, GpuMemoryManager, MemoryCategory, MemoryStats};
use ivfpq_gpu::error::IvfPqError;

#[test]
fn test_invalid_configs_rejected() {
    let err = GpuMemoryManager::new(GpuMemoryConfig::with_budget(0)).unwrap_err();
    assert!(matches!(err, IvfPqError::Configuration { constraint, .. } if constraint.contains("total_budget")));

    for threshold in [0.0, -0.5, 1.5] {
        let mut config = GpuMemoryConfig::default();
        config.low_memory_threshold = threshold;
        assert!(
            GpuMemoryManager::new(config).is_err(),
            "threshold {} should be rejected",
            threshold
        );
    }

    let mut config = GpuMemoryConfig::default();
    config.low_memory_threshold = 1.0;
    assert!(GpuMemoryManager::new(config).is_ok());
}

#[test]
fn test_config_json_round_trip() {
    let config = GpuMemoryConfig::with_budget(1_000_000)
        .category_budget(MemoryCategory::InvertedLists, 600_000);
    let json = serde_json::to_string_pretty(&config).expect("Serialization failed");
    println!("Config JSON:\n{}", json);

    let back: GpuMemoryConfig = serde_json::from_str(&json).expect("Deserialization failed");
    assert_eq!(back.total_budget, 1_000_000);
    assert_eq!(back.budget_for(MemoryCategory::InvertedLists), 600_000);
    assert_eq!(
        back.budget_for(MemoryCategory::Centroids),
        MemoryCategory::Centroids.default_budget()
    );
}

#[test]
fn test_stats_json_round_trip() {
    let manager = GpuMemoryManager::new(GpuMemoryConfig::with_budget(1_000_000))
        .expect("Manager creation failed");
    let _h = manager.allocate(4242, MemoryCategory::Staging).expect("alloc");

    let stats = manager.stats();
    let json = serde_json::to_string(&stats).expect("Serialization failed");
    let back: MemoryStats = serde_json::from_str(&json).expect("Deserialization failed");

    assert_eq!(back.total_allocated, 4242);
    assert_eq!(back.usage_of(MemoryCategory::Staging), 4242);
    assert_eq!(back.category_budget.len(), MemoryCategory::ALL.len());
}
