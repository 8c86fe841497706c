//! Facet associations and faceted-query filters.

use serde::{Deserialize, Serialize};

/// A framework association, optionally version-constrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkFacet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Many-to-many facet dimensions attached to a pattern.
///
/// The seventh dimension, free-form tags, lives on `Pattern::tags`
/// and is mirrored into its own join table alongside these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatternFacets {
    pub languages: Vec<String>,
    pub frameworks: Vec<FrameworkFacet>,
    /// File-path globs this pattern applies to.
    pub paths: Vec<String>,
    /// Repository globs this pattern applies to.
    pub repos: Vec<String>,
    pub task_types: Vec<String>,
    pub environments: Vec<String>,
}

impl PatternFacets {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.frameworks.is_empty()
            && self.paths.is_empty()
            && self.repos.is_empty()
            && self.task_types.is_empty()
            && self.environments.is_empty()
    }
}

/// Filter for faceted lookup. Empty fields do not constrain.
///
/// `path` and `repo` are concrete values matched against the globs a
/// pattern declares; the list fields must all be present on a match
/// (AND across dimensions, OR within a dimension).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FacetQuery {
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub tags: Vec<String>,
    pub task_types: Vec<String>,
    pub environments: Vec<String>,
    /// A concrete file path matched against stored path globs.
    pub path: Option<String>,
    /// A concrete repository name matched against stored repo globs.
    pub repo: Option<String>,
}

impl FacetQuery {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.frameworks.is_empty()
            && self.tags.is_empty()
            && self.task_types.is_empty()
            && self.environments.is_empty()
            && self.path.is_none()
            && self.repo.is_none()
    }

    /// Stable signature for cache keying: sorted, deduplicated JSON.
    pub fn signature(&self) -> String {
        let mut q = self.clone();
        q.languages.sort();
        q.languages.dedup();
        q.frameworks.sort();
        q.frameworks.dedup();
        q.tags.sort();
        q.tags.dedup();
        q.task_types.sort();
        q.task_types.dedup();
        q.environments.sort();
        q.environments.dedup();
        serde_json::to_string(&q).unwrap_or_default()
    }
}
