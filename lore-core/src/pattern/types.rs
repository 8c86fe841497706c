//! Pattern, pattern type, and snippet types.

use serde::{Deserialize, Serialize};

use super::facets::PatternFacets;
use crate::trust::TrustScore;

/// Closed set of pattern kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// A general, reusable code pattern.
    CodePattern,
    /// A language-specific idiom.
    LanguageIdiom,
    /// Something to avoid.
    AntiPattern,
    /// A known way things break.
    FailureMode,
    /// A policy or compliance constraint.
    PolicyConstraint,
    /// A testing pattern.
    TestPattern,
    /// A migration or upgrade note.
    MigrationNote,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodePattern => "code_pattern",
            Self::LanguageIdiom => "language_idiom",
            Self::AntiPattern => "anti_pattern",
            Self::FailureMode => "failure_mode",
            Self::PolicyConstraint => "policy_constraint",
            Self::TestPattern => "test_pattern",
            Self::MigrationNote => "migration_note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code_pattern" => Some(Self::CodePattern),
            "language_idiom" => Some(Self::LanguageIdiom),
            "anti_pattern" => Some(Self::AntiPattern),
            "failure_mode" => Some(Self::FailureMode),
            "policy_constraint" => Some(Self::PolicyConstraint),
            "test_pattern" => Some(Self::TestPattern),
            "migration_note" => Some(Self::MigrationNote),
            _ => None,
        }
    }

    /// All known pattern types.
    pub fn all() -> &'static [PatternType] {
        &[
            Self::CodePattern,
            Self::LanguageIdiom,
            Self::AntiPattern,
            Self::FailureMode,
            Self::PolicyConstraint,
            Self::TestPattern,
            Self::MigrationNote,
        ]
    }
}

/// A code example owned by exactly one pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub language: String,
    pub source: String,
    /// Originating file, if the snippet was lifted from real code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
}

/// The central entity: a stored knowledge unit with trust metadata,
/// facets, and optional code snippets.
///
/// Invariants: `id` is immutable once assigned; `trust.score` equals
/// `alpha / (alpha + beta)`; `alias`, if present, is unique across all
/// patterns; a pattern marked invalid is excluded from lookup and search
/// but retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub pattern_type: PatternType,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub implementation: String,
    #[serde(default)]
    pub examples: String,
    #[serde(default)]
    pub trust: TrustScore,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub success_count: u64,
    /// xxh3 hex of the canonical form. Derived, never serialized to files.
    #[serde(default, skip_serializing)]
    pub digest: String,
    /// Stable sorted-key JSON of the content fields. Derived.
    #[serde(default, skip_serializing)]
    pub canonical: String,
    #[serde(default = "default_valid", skip_serializing)]
    pub valid: bool,
    #[serde(default, skip_serializing)]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub facets: PatternFacets,
    #[serde(default)]
    pub snippets: Vec<Snippet>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn default_valid() -> bool {
    true
}

impl Pattern {
    /// A minimal valid pattern, for construction and tests.
    pub fn new(id: impl Into<String>, pattern_type: PatternType, title: impl Into<String>, summary: impl Into<String>) -> Self {
        let now = super::now_epoch();
        Self {
            id: id.into(),
            pattern_type,
            title: title.into(),
            summary: summary.into(),
            problem: String::new(),
            solution: String::new(),
            implementation: String::new(),
            examples: String::new(),
            trust: TrustScore::uniform(),
            usage_count: 0,
            success_count: 0,
            digest: String::new(),
            canonical: String::new(),
            valid: true,
            invalid_reason: None,
            alias: None,
            tags: Vec::new(),
            keywords: Vec::new(),
            facets: PatternFacets::default(),
            snippets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute the canonical form and digest from the content fields.
    pub fn refresh_digest(&mut self) {
        self.canonical = super::canonicalize(self);
        self.digest = super::digest_of(&self.canonical);
    }

    /// Fold in one usage outcome: bumps counters and trust parameters,
    /// recomputing the score.
    pub fn record_usage(&mut self, success: bool) {
        self.usage_count += 1;
        if success {
            self.success_count += 1;
        }
        self.trust.record(success);
    }
}
