//! Search-index synchronizer configuration.

use serde::{Deserialize, Serialize};

/// Thresholds for search-sync observability.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchConfig {
    /// Synchronizations slower than this are flagged with a warning,
    /// in milliseconds. Default: 50.
    pub slow_sync_warn_ms: Option<u64>,
}

impl SearchConfig {
    pub fn effective_slow_sync_warn_ms(&self) -> u64 {
        self.slow_sync_warn_ms.unwrap_or(50)
    }
}
