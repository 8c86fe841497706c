//! Row-level queries for patterns, facets, and faceted lookup.
//!
//! Everything here takes a borrowed connection so callers decide the
//! transaction boundary; multi-table writes (upsert + facet replace)
//! belong inside `DatabaseManager::immediate_transaction`.

pub mod facets;
pub mod lookup;
pub mod patterns;

pub use facets::{load_facets, replace_facets};
pub use lookup::{lookup_page, lookup_patterns, LookupPage};
pub use patterns::{
    alias_owner, all_ids, count_patterns, delete_all_patterns, delete_pattern, get_pattern,
    get_snippets, mark_invalid, record_usage_row, stats, upsert_pattern, StoreStats,
};
