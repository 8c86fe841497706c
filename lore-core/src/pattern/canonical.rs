//! Canonical serialized form and content digest.
//!
//! The canonical form is a stable sorted-key JSON projection of a
//! pattern's content fields. It excludes operational state (trust
//! parameters, usage counters, timestamps, validity) so that recording
//! usage never changes the digest, and two loads of the same file always
//! digest identically.

use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

use super::facets::PatternFacets;
use super::types::{Pattern, Snippet};

/// Content-field projection serialized for digesting.
/// serde_json's default map is ordered, so keys come out sorted.
#[derive(Serialize)]
struct CanonicalView<'a> {
    id: &'a str,
    pattern_type: &'a str,
    title: &'a str,
    summary: &'a str,
    problem: &'a str,
    solution: &'a str,
    implementation: &'a str,
    examples: &'a str,
    alias: &'a Option<String>,
    tags: &'a [String],
    keywords: &'a [String],
    facets: &'a PatternFacets,
    snippets: &'a [Snippet],
}

/// Produce the canonical JSON form of a pattern's content fields.
pub fn canonicalize(pattern: &Pattern) -> String {
    let view = CanonicalView {
        id: &pattern.id,
        pattern_type: pattern.pattern_type.as_str(),
        title: &pattern.title,
        summary: &pattern.summary,
        problem: &pattern.problem,
        solution: &pattern.solution,
        implementation: &pattern.implementation,
        examples: &pattern.examples,
        alias: &pattern.alias,
        tags: &pattern.tags,
        keywords: &pattern.keywords,
        facets: &pattern.facets,
        snippets: &pattern.snippets,
    };
    // Struct-to-Value-to-string re-serializes through the ordered map.
    match serde_json::to_value(&view) {
        Ok(value) => value.to_string(),
        Err(_) => String::new(),
    }
}

/// xxh3 hex digest of a canonical form.
pub fn digest_of(canonical: &str) -> String {
    format!("{:016x}", xxh3_64(canonical.as_bytes()))
}

/// Derive a stable identifier for a pattern with no assigned id.
///
/// The id is hashed from the canonical form with the id field blanked,
/// so identical content always derives the same id.
pub fn derive_id(pattern: &Pattern) -> String {
    let mut blank = pattern.clone();
    blank.id = String::new();
    let canonical = canonicalize(&blank);
    let hex = format!("{:016x}", xxh3_64(canonical.as_bytes()));
    format!("PAT:{}", &hex[..12])
}
