//! Structural validation of patterns.
//!
//! Returns a list of issues rather than failing on the first, so batch
//! loaders can report everything wrong with a file at once.

use super::types::Pattern;

const MAX_TITLE_LEN: usize = 200;
const MAX_SUMMARY_LEN: usize = 2000;
const MAX_ALIAS_LEN: usize = 64;

/// Check a pattern's structural invariants. An empty result means valid.
pub fn validate_pattern(pattern: &Pattern) -> Vec<String> {
    let mut issues = Vec::new();

    if pattern.id.trim().is_empty() {
        issues.push("id is empty".to_string());
    } else if !is_valid_id(&pattern.id) {
        issues.push(format!("id '{}' contains invalid characters", pattern.id));
    }

    if pattern.title.trim().is_empty() {
        issues.push("title is empty".to_string());
    } else if pattern.title.len() > MAX_TITLE_LEN {
        issues.push(format!("title exceeds {MAX_TITLE_LEN} bytes"));
    }

    if pattern.summary.trim().is_empty() {
        issues.push("summary is empty".to_string());
    } else if pattern.summary.len() > MAX_SUMMARY_LEN {
        issues.push(format!("summary exceeds {MAX_SUMMARY_LEN} bytes"));
    }

    if let Some(ref alias) = pattern.alias {
        if alias.trim().is_empty() {
            issues.push("alias is empty; omit it instead".to_string());
        } else if alias.len() > MAX_ALIAS_LEN {
            issues.push(format!("alias exceeds {MAX_ALIAS_LEN} bytes"));
        } else if !alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            issues.push(format!("alias '{alias}' must be alphanumeric with - or _"));
        }
    }

    if !(pattern.trust.alpha > 0.0 && pattern.trust.alpha.is_finite()) {
        issues.push("trust alpha must be positive and finite".to_string());
    }
    if !(pattern.trust.beta > 0.0 && pattern.trust.beta.is_finite()) {
        issues.push("trust beta must be positive and finite".to_string());
    }
    if !(0.0..=1.0).contains(&pattern.trust.score) {
        issues.push("trust score must be within [0, 1]".to_string());
    } else if !pattern.trust.is_consistent() {
        issues.push("trust score disagrees with alpha/(alpha+beta)".to_string());
    }

    if pattern.success_count > pattern.usage_count {
        issues.push("success_count exceeds usage_count".to_string());
    }

    for (i, tag) in pattern.tags.iter().enumerate() {
        if tag.trim().is_empty() {
            issues.push(format!("tag #{i} is empty"));
        }
    }
    for (i, kw) in pattern.keywords.iter().enumerate() {
        if kw.trim().is_empty() {
            issues.push(format!("keyword #{i} is empty"));
        }
    }

    for (i, lang) in pattern.facets.languages.iter().enumerate() {
        if lang.trim().is_empty() {
            issues.push(format!("language facet #{i} is empty"));
        }
    }
    for (i, fw) in pattern.facets.frameworks.iter().enumerate() {
        if fw.name.trim().is_empty() {
            issues.push(format!("framework facet #{i} has an empty name"));
        }
    }
    for (i, glob) in pattern.facets.paths.iter().enumerate() {
        if glob.trim().is_empty() {
            issues.push(format!("path facet #{i} is empty"));
        }
    }
    for (i, glob) in pattern.facets.repos.iter().enumerate() {
        if glob.trim().is_empty() {
            issues.push(format!("repo facet #{i} is empty"));
        }
    }

    for (i, snip) in pattern.snippets.iter().enumerate() {
        if snip.language.trim().is_empty() {
            issues.push(format!("snippet #{i} has an empty language"));
        }
        if snip.source.trim().is_empty() {
            issues.push(format!("snippet #{i} has an empty source"));
        }
        if let (Some(start), Some(end)) = (snip.line_start, snip.line_end) {
            if start > end {
                issues.push(format!("snippet #{i} line range is inverted"));
            }
        }
    }

    issues
}

/// Ids are `PAT:`-prefixed hex when derived, but any printable
/// filesystem-safe token is accepted.
fn is_valid_id(id: &str) -> bool {
    id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.'))
}
