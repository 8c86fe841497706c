//! Storage subsystem configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the SQLite adapter and write-retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path. Default: `.lore/lore.db`.
    pub database_path: Option<String>,
    /// Pattern file directory. Default: `.lore/patterns`.
    pub pattern_dir: Option<String>,
    /// Forced backend tier: "wal" | "rollback" | "dotfile".
    /// Invalid values warn and fall back to auto-detection.
    pub backend: Option<String>,
    /// Number of pooled read connections. Default: 4.
    pub read_pool_size: Option<usize>,
    /// Page cache size in KiB. Default: 64000.
    pub cache_size_kib: Option<i64>,
    /// Busy timeout per statement, in milliseconds. Default: 5000.
    pub busy_timeout_ms: Option<u64>,
    /// Maximum write attempts under busy contention. Default: 5.
    pub retry_max_attempts: Option<u32>,
    /// Base retry backoff delay in milliseconds, doubled per attempt.
    /// Default: 10.
    pub retry_base_delay_ms: Option<u64>,
}

impl StorageConfig {
    /// Effective database path.
    pub fn effective_database_path(&self) -> &str {
        self.database_path.as_deref().unwrap_or(".lore/lore.db")
    }

    /// Effective pattern directory.
    pub fn effective_pattern_dir(&self) -> &str {
        self.pattern_dir.as_deref().unwrap_or(".lore/patterns")
    }

    /// Effective read pool size.
    pub fn effective_read_pool_size(&self) -> usize {
        self.read_pool_size.unwrap_or(4)
    }

    /// Effective page cache size in KiB.
    pub fn effective_cache_size_kib(&self) -> i64 {
        self.cache_size_kib.unwrap_or(64000)
    }

    /// Effective busy timeout in milliseconds.
    pub fn effective_busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms.unwrap_or(5000)
    }

    /// Effective maximum retry attempts.
    pub fn effective_retry_max_attempts(&self) -> u32 {
        self.retry_max_attempts.unwrap_or(5)
    }

    /// Effective base retry delay in milliseconds.
    pub fn effective_retry_base_delay_ms(&self) -> u64 {
        self.retry_base_delay_ms.unwrap_or(10)
    }
}
