//! Pattern-directory watcher configuration.

use serde::{Deserialize, Serialize};

/// Polling and debounce intervals for the file watcher.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Directory poll interval in milliseconds. Default: 500.
    pub poll_interval_ms: Option<u64>,
    /// Per-path quiet window before an event is delivered, coalescing
    /// rapid repeats. Default: 200.
    pub debounce_ms: Option<u64>,
}

impl WatcherConfig {
    pub fn effective_poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.unwrap_or(500)
    }

    pub fn effective_debounce_ms(&self) -> u64 {
        self.debounce_ms.unwrap_or(200)
    }
}
