//! Read-through caches: pattern-by-id, facet-query results, and
//! snippet metadata.
//!
//! All three slide their expiration on access (`time_to_idle`). Facet
//! invalidation is precise: touching a pattern drops only the cached
//! result lists that actually contain its id. Caches are private per
//! process; cross-process staleness is bounded by the TTL alone.

use std::time::Duration;

use lore_core::config::CacheConfig;
use lore_core::pattern::{Pattern, Snippet};
use moka::sync::Cache;

pub struct PatternCache {
    patterns: Cache<String, Pattern>,
    facet_results: Cache<String, Vec<String>>,
    snippets: Cache<String, Vec<Snippet>>,
}

impl PatternCache {
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.effective_ttl_seconds());
        Self {
            patterns: Cache::builder()
                .max_capacity(config.effective_pattern_capacity())
                .time_to_idle(ttl)
                .build(),
            facet_results: Cache::builder()
                .max_capacity(config.effective_facet_capacity())
                .time_to_idle(ttl)
                .build(),
            snippets: Cache::builder()
                .max_capacity(config.effective_snippet_capacity())
                .time_to_idle(ttl)
                .build(),
        }
    }

    pub fn get_pattern(&self, id: &str) -> Option<Pattern> {
        self.patterns.get(id)
    }

    pub fn insert_pattern(&self, pattern: Pattern) {
        self.patterns.insert(pattern.id.clone(), pattern);
    }

    /// Cached id list for a facet-query signature.
    pub fn get_facet_result(&self, signature: &str) -> Option<Vec<String>> {
        self.facet_results.get(signature)
    }

    pub fn insert_facet_result(&self, signature: String, ids: Vec<String>) {
        self.facet_results.insert(signature, ids);
    }

    pub fn get_snippets(&self, pattern_id: &str) -> Option<Vec<Snippet>> {
        self.snippets.get(pattern_id)
    }

    pub fn insert_snippets(&self, pattern_id: String, snippets: Vec<Snippet>) {
        self.snippets.insert(pattern_id, snippets);
    }

    /// Drop everything cached for one pattern: its entry, its snippet
    /// metadata, and exactly the facet results that contain it.
    pub fn invalidate_pattern(&self, id: &str) {
        self.patterns.invalidate(id);
        self.snippets.invalidate(id);

        let stale: Vec<String> = self
            .facet_results
            .iter()
            .filter(|(_, ids)| ids.iter().any(|i| i == id))
            .map(|(sig, _)| sig.as_ref().clone())
            .collect();
        for sig in &stale {
            self.facet_results.invalidate(sig);
        }
        if !stale.is_empty() {
            tracing::debug!(id, entries = stale.len(), "invalidated facet results containing pattern");
        }
    }

    /// Clear all three caches.
    pub fn invalidate_all(&self) {
        self.patterns.invalidate_all();
        self.facet_results.invalidate_all();
        self.snippets.invalidate_all();
    }

    #[cfg(test)]
    pub(crate) fn facet_entry_count(&self) -> u64 {
        self.facet_results.run_pending_tasks();
        self.facet_results.entry_count()
    }
}
