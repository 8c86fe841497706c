//! End-to-end pattern store tests: dual persistence, CRUD, faceted
//! lookup, search visibility, quarantine, and batch rebuild/validate.

use lore_core::config::LoreConfig;
use lore_core::errors::PatternError;
use lore_core::pattern::{FacetQuery, Pattern, PatternType, Snippet};
use lore_storage::pattern_files::{self, LoadOutcome};
use lore_storage::repository::{FileStatus, PatternStore, PatternUpdate};
use tempfile::tempdir;

fn open_store(dir: &std::path::Path) -> PatternStore {
    PatternStore::open_with_paths(
        &LoreConfig::default(),
        &dir.join("lore.db"),
        &dir.join("patterns"),
    )
    .unwrap()
}

fn sample(id: &str) -> Pattern {
    let mut p = Pattern::new(
        id,
        PatternType::CodePattern,
        "Bounded retry",
        "Retry transient failures with exponential backoff",
    );
    p.problem = "transient IO errors surface to callers".into();
    p.solution = "wrap the call in a bounded backoff loop".into();
    p.tags = vec!["x".into(), "y".into()];
    p.keywords = vec!["resilience".into()];
    p.facets.languages = vec!["rust".into()];
    p.snippets = vec![Snippet {
        language: "rust".into(),
        source: "loop { /* retry */ }".into(),
        file: None,
        line_start: None,
        line_end: None,
    }];
    p
}

// ═══════════════════════════════════════════════════════════════════════════
// CREATE / GET ROUND-TRIP
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn create_then_get_round_trips_visible_fields() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let created = store.create(sample("PAT:A")).unwrap();
    let got = store.get("PAT:A").unwrap().unwrap();

    assert_eq!(got.id, created.id);
    assert_eq!(got.title, "Bounded retry");
    assert_eq!(got.tags, vec!["x", "y"]);
    assert_eq!(got.facets.languages, vec!["rust"]);
    assert_eq!(got.snippets.len(), 1);
    assert_eq!(got.snippets[0].language, "rust");
}

#[test]
fn file_on_disk_reloads_to_the_same_digest() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let created = store.create(sample("PAT:A")).unwrap();

    let path = pattern_files::path_for(store.pattern_dir(), "PAT:A");
    match pattern_files::load_pattern_file(&path).unwrap() {
        LoadOutcome::Valid(reloaded) => assert_eq!(reloaded.digest, created.digest),
        other => panic!("expected valid reload, got {other:?}"),
    }
}

#[test]
fn create_derives_id_when_absent() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let created = store.create(sample("")).unwrap();
    assert!(created.id.starts_with("PAT:"));
    assert!(store.get(&created.id).unwrap().is_some());
}

#[test]
fn create_rejects_duplicate_id_and_taken_alias() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut first = sample("PAT:A");
    first.alias = Some("retry-loop".into());
    store.create(first).unwrap();

    let dup = store.create(sample("PAT:A"));
    assert!(matches!(dup, Err(PatternError::AlreadyExists { .. })));

    let mut second = sample("PAT:B");
    second.alias = Some("retry-loop".into());
    let taken = store.create(second);
    assert!(matches!(taken, Err(PatternError::AliasTaken { .. })));
}

#[test]
fn create_rejects_structurally_invalid_payload() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let mut p = sample("PAT:A");
    p.title = String::new();
    assert!(matches!(store.create(p), Err(PatternError::Invalid { .. })));
}

// ═══════════════════════════════════════════════════════════════════════════
// UPDATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn update_keeps_id_and_always_advances_updated_at() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let created = store.create(sample("PAT:A")).unwrap();

    let first = store
        .update("PAT:A", PatternUpdate { title: Some("Bounded retry v2".into()), ..Default::default() })
        .unwrap();
    assert_eq!(first.id, created.id);
    assert!(first.updated_at > created.updated_at);

    // Identical update still advances the stamp.
    let second = store
        .update("PAT:A", PatternUpdate { title: Some("Bounded retry v2".into()), ..Default::default() })
        .unwrap();
    assert_eq!(second.id, created.id);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(second.title, "Bounded retry v2");
}

#[test]
fn update_missing_pattern_is_not_found() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let result = store.update("PAT:missing", PatternUpdate::default());
    assert!(matches!(result, Err(PatternError::NotFound { .. })));
}

#[test]
fn facet_update_replaces_join_rows() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();

    let mut facets = lore_core::pattern::PatternFacets::default();
    facets.languages = vec!["go".into()];
    store
        .update("PAT:A", PatternUpdate { facets: Some(facets), ..Default::default() })
        .unwrap();

    let by_rust = store
        .lookup(&FacetQuery { languages: vec!["rust".into()], ..Default::default() }, 10)
        .unwrap();
    assert!(by_rust.is_empty());

    let by_go = store
        .lookup(&FacetQuery { languages: vec!["go".into()], ..Default::default() }, 10)
        .unwrap();
    assert_eq!(by_go.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DELETE AND THE TAG-LOOKUP LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn tag_lookup_lifecycle() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();

    let by_tag = store
        .lookup(&FacetQuery { tags: vec!["x".into()], ..Default::default() }, 10)
        .unwrap();
    assert_eq!(by_tag.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["PAT:A"]);

    store.delete("PAT:A").unwrap();

    let after = store
        .lookup(&FacetQuery { tags: vec!["x".into()], ..Default::default() }, 10)
        .unwrap();
    assert!(after.is_empty());
}

#[test]
fn delete_removes_from_get_lookup_and_search() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();
    store.delete("PAT:A").unwrap();

    assert!(store.get("PAT:A").unwrap().is_none());
    assert!(store
        .lookup(&FacetQuery { tags: vec!["x".into()], ..Default::default() }, 10)
        .unwrap()
        .is_empty());
    assert!(store.search("retry", 10).unwrap().is_empty());
    assert!(!pattern_files::path_for(store.pattern_dir(), "PAT:A").exists());

    assert!(matches!(
        store.delete("PAT:A"),
        Err(PatternError::NotFound { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// SEARCH
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn search_matches_title_and_summary() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();

    let mut other = sample("PAT:B");
    other.title = "Connection pooling".into();
    other.summary = "Reuse database connections".into();
    store.create(other).unwrap();

    let hits = store.search("retry backoff", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "PAT:A");

    let pool_hits = store.search("pooling", 10).unwrap();
    assert_eq!(pool_hits.len(), 1);
    assert_eq!(pool_hits[0].id, "PAT:B");
}

#[test]
fn search_reflects_updates() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();

    store
        .update("PAT:A", PatternUpdate { title: Some("Circuit breaker".into()), ..Default::default() })
        .unwrap();

    assert!(store.search("circuit", 10).unwrap().iter().any(|p| p.id == "PAT:A"));
    assert!(store.search("bounded", 10).unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// QUARANTINE VISIBILITY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn quarantined_patterns_hide_from_reads_but_stay_auditable() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();

    store
        .reconcile(LoadOutcome::Quarantined {
            id: "PAT:A".into(),
            reason: "summary is empty".into(),
            pattern: None,
        })
        .unwrap();

    assert!(store.get("PAT:A").unwrap().is_none());
    assert!(store
        .lookup(&FacetQuery { tags: vec!["x".into()], ..Default::default() }, 10)
        .unwrap()
        .is_empty());
    assert!(store.search("retry", 10).unwrap().is_empty());

    let audited = store.get_for_audit("PAT:A").unwrap().unwrap();
    assert!(!audited.valid);
    assert_eq!(audited.invalid_reason.as_deref(), Some("summary is empty"));
}

// ═══════════════════════════════════════════════════════════════════════════
// TRUST UPDATES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn record_usage_recomputes_trust_from_parameters() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();

    let after_success = store.record_usage("PAT:A", true).unwrap();
    assert_eq!(after_success.usage_count, 1);
    assert_eq!(after_success.success_count, 1);
    assert!((after_success.trust.score - 2.0 / 3.0).abs() < 1e-9);

    let after_failure = store.record_usage("PAT:A", false).unwrap();
    assert_eq!(after_failure.usage_count, 2);
    assert_eq!(after_failure.success_count, 1);
    assert!((after_failure.trust.score - 0.5).abs() < 1e-9);

    // The row agrees after a cold read.
    let reread = store.get_for_audit("PAT:A").unwrap().unwrap();
    assert!((reread.trust.score - 0.5).abs() < 1e-9);
    assert_eq!(reread.trust.alpha, 2.0);
    assert_eq!(reread.trust.beta, 2.0);
}

#[test]
fn recorded_usage_survives_rebuild() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();
    store.record_usage("PAT:A", true).unwrap();

    // A full reload from the pattern files must not revert the
    // counters that record_usage accumulated.
    store.rebuild().unwrap();

    let reloaded = store.get("PAT:A").unwrap().unwrap();
    assert_eq!(reloaded.usage_count, 1);
    assert_eq!(reloaded.success_count, 1);
    assert_eq!(reloaded.trust.alpha, 2.0);
    assert_eq!(reloaded.trust.beta, 1.0);
    assert!((reloaded.trust.score - 2.0 / 3.0).abs() < 1e-9);
}

// ═══════════════════════════════════════════════════════════════════════════
// LOOKUP ORDERING AND PAGINATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn lookup_orders_by_trust_descending_and_pages_by_keyset() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    for (id, successes) in [("PAT:low", 0u32), ("PAT:mid", 2), ("PAT:high", 5)] {
        store.create(sample(id)).unwrap();
        for _ in 0..successes {
            store.record_usage(id, true).unwrap();
        }
    }

    let query = FacetQuery { tags: vec!["x".into()], ..Default::default() };
    let all = store.lookup(&query, 10).unwrap();
    let ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["PAT:high", "PAT:mid", "PAT:low"]);

    let page1 = store.lookup_page(&query, 2, None).unwrap();
    assert_eq!(page1.patterns.len(), 2);
    assert!(page1.has_more);
    let token = page1.next_cursor.unwrap();

    let page2 = store.lookup_page(&query, 2, Some(&token)).unwrap();
    assert_eq!(page2.patterns.len(), 1);
    assert_eq!(page2.patterns[0].id, "PAT:low");
    assert!(!page2.has_more);
}

#[test]
fn path_facets_glob_match_concrete_paths() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let mut p = sample("PAT:A");
    p.facets.paths = vec!["src/*.rs".into()];
    store.create(p).unwrap();

    let hit = store
        .lookup(&FacetQuery { path: Some("src/main.rs".into()), ..Default::default() }, 10)
        .unwrap();
    assert_eq!(hit.len(), 1);

    let miss = store
        .lookup(&FacetQuery { path: Some("docs/readme.md".into()), ..Default::default() }, 10)
        .unwrap();
    assert!(miss.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// REBUILD AND VALIDATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn rebuild_reloads_files_and_reports_bad_ones() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();
    store.create(sample("PAT:B")).unwrap();

    // A third file arrives on disk outside the store, plus a broken one.
    let mut external = sample("PAT:C");
    external.refresh_digest();
    pattern_files::write_pattern_file(store.pattern_dir(), &external).unwrap();
    std::fs::write(store.pattern_dir().join("broken.yaml"), "{{{ nope").unwrap();

    let reports = store.rebuild().unwrap();
    assert_eq!(reports.len(), 4);
    let loaded = reports.iter().filter(|r| matches!(r.status, FileStatus::Loaded)).count();
    let quarantined = reports
        .iter()
        .filter(|r| matches!(r.status, FileStatus::Quarantined { .. }))
        .count();
    assert_eq!(loaded, 3);
    assert_eq!(quarantined, 1);

    assert!(store.get("PAT:C").unwrap().is_some());
    assert!(store.search("retry", 10).unwrap().len() >= 3);

    let stats = store.stats().unwrap();
    assert_eq!(stats.valid, 3);
}

#[test]
fn validate_is_a_dry_run() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create(sample("PAT:A")).unwrap();
    std::fs::write(store.pattern_dir().join("broken.yaml"), ": {{{{").unwrap();

    let reports = store.validate().unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().any(|r| matches!(r.status, FileStatus::Quarantined { .. })));

    // Nothing was written or quarantined in the row store.
    let audited = store.get_for_audit("PAT:A").unwrap().unwrap();
    assert!(audited.valid);
    assert_eq!(store.stats().unwrap().total, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DUAL PERSISTENCE SURVIVAL
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn patterns_survive_store_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = open_store(dir.path());
        store.create(sample("PAT:A")).unwrap();
        store.close();
    }

    let store = open_store(dir.path());
    let got = store.get("PAT:A").unwrap().unwrap();
    assert_eq!(got.title, "Bounded retry");
    assert_eq!(store.search("retry", 10).unwrap().len(), 1);
}
