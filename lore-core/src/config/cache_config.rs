//! Read-through cache configuration.

use serde::{Deserialize, Serialize};

/// Bounds for the three in-memory caches.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Max entries in the by-id pattern cache. Default: 512.
    pub pattern_capacity: Option<u64>,
    /// Max entries in the facet-query result cache. Default: 256.
    pub facet_capacity: Option<u64>,
    /// Max entries in the snippet-metadata cache. Default: 512.
    pub snippet_capacity: Option<u64>,
    /// Sliding idle expiration in seconds, refreshed on access.
    /// Default: 300.
    pub ttl_seconds: Option<u64>,
}

impl CacheConfig {
    pub fn effective_pattern_capacity(&self) -> u64 {
        self.pattern_capacity.unwrap_or(512)
    }

    pub fn effective_facet_capacity(&self) -> u64 {
        self.facet_capacity.unwrap_or(256)
    }

    pub fn effective_snippet_capacity(&self) -> u64 {
        self.snippet_capacity.unwrap_or(512)
    }

    pub fn effective_ttl_seconds(&self) -> u64 {
        self.ttl_seconds.unwrap_or(300)
    }
}
