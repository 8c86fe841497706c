//! The pattern data model: types, facets, canonical form, validation.

pub mod canonical;
pub mod facets;
pub mod types;
pub mod validate;

pub use canonical::{canonicalize, derive_id, digest_of};
pub use facets::{FacetQuery, FrameworkFacet, PatternFacets};
pub use types::{Pattern, PatternType, Snippet};
pub use validate::validate_pattern;

/// Current unix time in seconds.
pub fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
