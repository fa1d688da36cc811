//! Device capability descriptor consumed by configuration validation.

use serde::{Deserialize, Serialize};

use crate::config::constants::{DEFAULT_SHARED_MEM_PER_BLOCK, MAX_SELECTION_K};

/// Hardware limits of one accelerator device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapability {
    /// Human-readable device name.
    pub name: String,

    /// On-chip scratch bytes available to a single kernel block.
    pub shared_mem_per_block: usize,

    /// Maximum entries in a single inverted list (must fit a signed 32-bit count).
    pub max_list_len: usize,

    /// Maximum k accepted by search.
    pub max_k: usize,

    /// Maximum nprobe accepted by search.
    pub max_nprobe: usize,
}

impl Default for DeviceCapability {
    fn default() -> Self {
        Self {
            name: "host-emulated accelerator".to_string(),
            shared_mem_per_block: DEFAULT_SHARED_MEM_PER_BLOCK,
            max_list_len: i32::MAX as usize,
            max_k: MAX_SELECTION_K,
            max_nprobe: MAX_SELECTION_K,
        }
    }
}

impl DeviceCapability {
    /// Set the per-block scratch budget (builder pattern).
    pub fn with_shared_mem_per_block(mut self, bytes: usize) -> Self {
        self.shared_mem_per_block = bytes;
        self
    }

    /// Set the per-list entry limit (builder pattern).
    ///
    /// Clamped to `i32::MAX` since list lengths are signed 32-bit on device.
    pub fn with_max_list_len(mut self, len: usize) -> Self {
        self.max_list_len = len.min(i32::MAX as usize);
        self
    }
}
