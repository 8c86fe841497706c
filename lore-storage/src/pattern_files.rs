//! On-disk pattern files: one YAML (or JSON) file per pattern.
//!
//! The serialized form is an explicit DTO that carries only durable
//! fields; derived state (digest, canonical form, validity) is
//! stripped before write and re-derived on load. Writes go through a
//! temp file and an atomic rename so a crash never leaves a torn file.

use std::path::{Path, PathBuf};

use lore_core::errors::PatternError;
use lore_core::pattern::{
    derive_id, now_epoch, validate_pattern, Pattern, PatternFacets, PatternType, Snippet,
};
use lore_core::trust::TrustScore;
use serde::{Deserialize, Serialize};

/// Durable file format for one pattern.
#[derive(Debug, Serialize, Deserialize)]
pub struct PatternFile {
    pub id: String,
    pub pattern_type: PatternType,
    pub title: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub problem: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub solution: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub implementation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub examples: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_alpha")]
    pub beta: f64,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "PatternFacets::is_empty")]
    pub facets: PatternFacets,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snippets: Vec<Snippet>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn default_alpha() -> f64 {
    1.0
}

impl From<&Pattern> for PatternFile {
    fn from(p: &Pattern) -> Self {
        Self {
            id: p.id.clone(),
            pattern_type: p.pattern_type,
            title: p.title.clone(),
            summary: p.summary.clone(),
            problem: p.problem.clone(),
            solution: p.solution.clone(),
            implementation: p.implementation.clone(),
            examples: p.examples.clone(),
            alpha: p.trust.alpha,
            beta: p.trust.beta,
            usage_count: p.usage_count,
            success_count: p.success_count,
            alias: p.alias.clone(),
            tags: p.tags.clone(),
            keywords: p.keywords.clone(),
            facets: p.facets.clone(),
            snippets: p.snippets.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl PatternFile {
    /// Rebuild the in-memory pattern, re-deriving digest, canonical
    /// form, and the score from the stored Beta parameters. An absent
    /// id is derived from content.
    pub fn into_pattern(self) -> Pattern {
        let now = now_epoch();
        let mut p = Pattern {
            id: self.id,
            pattern_type: self.pattern_type,
            title: self.title,
            summary: self.summary,
            problem: self.problem,
            solution: self.solution,
            implementation: self.implementation,
            examples: self.examples,
            trust: TrustScore::from_params(self.alpha, self.beta),
            usage_count: self.usage_count,
            success_count: self.success_count,
            digest: String::new(),
            canonical: String::new(),
            valid: true,
            invalid_reason: None,
            alias: self.alias,
            tags: self.tags,
            keywords: self.keywords,
            facets: self.facets,
            snippets: self.snippets,
            created_at: if self.created_at > 0 { self.created_at } else { now },
            updated_at: if self.updated_at > 0 { self.updated_at } else { now },
        };
        if p.id.trim().is_empty() {
            p.id = derive_id(&p);
        }
        p.refresh_digest();
        p
    }
}

/// What loading one file produced.
#[derive(Debug)]
pub enum LoadOutcome {
    Valid(Pattern),
    /// Parse or structural failure. When the content parsed, the
    /// pattern rides along so the row can be stored quarantined.
    Quarantined {
        id: String,
        reason: String,
        pattern: Option<Pattern>,
    },
}

impl LoadOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Valid(p) => &p.id,
            Self::Quarantined { id, .. } => id,
        }
    }
}

/// File name for a pattern id. Characters unsafe in file names map to
/// `-`, and a digest of the full id is appended so ids that sanitize
/// to the same stem (`PAT:a` vs `PAT-a`) still get distinct files.
pub fn file_name_for(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let digest = xxhash_rust::xxh3::xxh3_64(id.as_bytes());
    format!("{safe}-{:08x}.yaml", digest as u32)
}

pub fn path_for(dir: &Path, id: &str) -> PathBuf {
    dir.join(file_name_for(id))
}

/// Write a pattern file via temp-file-then-atomic-rename.
pub fn write_pattern_file(dir: &Path, pattern: &Pattern) -> Result<PathBuf, PatternError> {
    std::fs::create_dir_all(dir).map_err(|e| PatternError::FileIo {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;

    let file = PatternFile::from(pattern);
    let body = serde_yaml::to_string(&file).map_err(|e| PatternError::Parse {
        path: file_name_for(&pattern.id),
        message: e.to_string(),
    })?;

    let final_path = path_for(dir, &pattern.id);
    let tmp_path = dir.join(format!(".{}.tmp", file_name_for(&pattern.id)));

    std::fs::write(&tmp_path, body).map_err(|e| PatternError::FileIo {
        path: tmp_path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::rename(&tmp_path, &final_path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        PatternError::FileIo {
            path: final_path.display().to_string(),
            message: e.to_string(),
        }
    })?;
    Ok(final_path)
}

/// Remove a pattern's file, tolerating its absence.
pub fn remove_pattern_file(dir: &Path, id: &str) -> Result<(), PatternError> {
    let path = path_for(dir, id);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PatternError::FileIo {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

/// Load one pattern file. Parse and structural failures come back as
/// `Quarantined`, never as errors, so batch loads report per file.
pub fn load_pattern_file(path: &Path) -> Result<LoadOutcome, PatternError> {
    let body = std::fs::read_to_string(path).map_err(|e| PatternError::FileIo {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let parsed: Result<PatternFile, String> = if is_json {
        serde_json::from_str(&body).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&body).map_err(|e| e.to_string())
    };

    let file = match parsed {
        Ok(file) => file,
        Err(message) => {
            return Ok(LoadOutcome::Quarantined {
                id: id_from_file_name(path),
                reason: format!("parse error: {message}"),
                pattern: None,
            })
        }
    };

    let pattern = file.into_pattern();
    let issues = validate_pattern(&pattern);
    if issues.is_empty() {
        Ok(LoadOutcome::Valid(pattern))
    } else {
        Ok(LoadOutcome::Quarantined {
            id: pattern.id.clone(),
            reason: issues.join("; "),
            pattern: Some(pattern),
        })
    }
}

/// All pattern files in a directory, sorted for deterministic batch
/// order. Temp files from in-flight writes are excluded.
pub fn scan_pattern_dir(dir: &Path) -> Result<Vec<PathBuf>, PatternError> {
    let mut paths = Vec::new();
    for ext in ["yaml", "yml", "json"] {
        let spec = format!("{}/*.{ext}", dir.display());
        let entries = glob::glob(&spec).map_err(|e| PatternError::FileIo {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        for entry in entries.flatten() {
            let hidden = entry
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(true);
            if !hidden {
                paths.push(entry);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

fn id_from_file_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Pattern {
        let mut p = Pattern::new(
            "PAT:0011aabbccdd",
            PatternType::CodePattern,
            "Bounded retry",
            "Retry transient failures with exponential backoff",
        );
        p.tags = vec!["resilience".into()];
        p.refresh_digest();
        p
    }

    #[test]
    fn file_name_replaces_colon() {
        let name = file_name_for("PAT:abc");
        assert!(name.starts_with("PAT-abc-"));
        assert!(name.ends_with(".yaml"));
    }

    #[test]
    fn ids_with_identical_sanitized_stems_get_distinct_files() {
        assert_ne!(file_name_for("PAT:a"), file_name_for("PAT-a"));
        assert_ne!(file_name_for("PAT:a/b"), file_name_for("PAT:a:b"));
        // Deterministic per id.
        assert_eq!(file_name_for("PAT:a"), file_name_for("PAT:a"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let p = sample();
        let path = write_pattern_file(dir.path(), &p).unwrap();

        match load_pattern_file(&path).unwrap() {
            LoadOutcome::Valid(loaded) => {
                assert_eq!(loaded.id, p.id);
                assert_eq!(loaded.title, p.title);
                assert_eq!(loaded.tags, p.tags);
                // Derived fields re-derive identically.
                assert_eq!(loaded.digest, p.digest);
            }
            other => panic!("expected valid load, got {other:?}"),
        }
    }

    #[test]
    fn internal_fields_are_stripped_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = sample();
        let path = write_pattern_file(dir.path(), &p).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(!body.contains("digest"));
        assert!(!body.contains("canonical"));
        assert!(!body.contains("invalid_reason"));
    }

    #[test]
    fn unparseable_file_is_quarantined_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, ": not valid yaml {{{{").unwrap();

        match load_pattern_file(&path).unwrap() {
            LoadOutcome::Quarantined { id, reason, pattern } => {
                assert_eq!(id, "broken");
                assert!(reason.starts_with("parse error"));
                assert!(pattern.is_none());
            }
            other => panic!("expected quarantine, got {other:?}"),
        }
    }

    #[test]
    fn structurally_invalid_file_carries_pattern_for_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty-title.yaml");
        std::fs::write(
            &path,
            "id: PAT:feedface0000\npattern_type: code_pattern\ntitle: \"\"\nsummary: has a summary\n",
        )
        .unwrap();

        match load_pattern_file(&path).unwrap() {
            LoadOutcome::Quarantined { reason, pattern, .. } => {
                assert!(reason.contains("title is empty"));
                assert!(pattern.is_some());
            }
            other => panic!("expected quarantine, got {other:?}"),
        }
    }

    #[test]
    fn scan_skips_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        write_pattern_file(dir.path(), &sample()).unwrap();
        std::fs::write(dir.path().join(".PAT-x.yaml.tmp"), "partial").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a pattern").unwrap();

        let paths = scan_pattern_dir(dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
    }
}
