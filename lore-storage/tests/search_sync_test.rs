//! Search synchronization across strategies: triggers, manual
//! savepoint sync, and the degraded LIKE fallback.

use lore_core::config::SearchConfig;
use lore_core::pattern::{Pattern, PatternType};
use lore_storage::adapter::Capabilities;
use lore_storage::migrations;
use lore_storage::search::{SearchSync, SyncStrategy};
use rusqlite::Connection;

fn open_migrated() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    migrations::run(&conn).unwrap();
    conn
}

fn insert_row(conn: &Connection, id: &str, title: &str, summary: &str) {
    conn.execute(
        "INSERT INTO patterns (id, pattern_type, title, summary, digest, canonical)
         VALUES (?1, 'code_pattern', ?2, ?3, 'd', '{}')",
        rusqlite::params![id, title, summary],
    )
    .unwrap();
}

fn sync_for(strategy_caps: Capabilities) -> SearchSync {
    SearchSync::new(strategy_caps, &SearchConfig::default())
}

fn pattern(id: &str, title: &str, summary: &str) -> Pattern {
    Pattern::new(id, PatternType::CodePattern, title, summary)
}

// ═══════════════════════════════════════════════════════════════════════════
// TRIGGER STRATEGY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn triggers_shadow_inserts_updates_and_deletes() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: true, fts5: true });
    assert_eq!(sync.strategy(), SyncStrategy::Triggers);
    sync.ensure_schema(&conn).unwrap();

    insert_row(&conn, "PAT:A", "Bounded retry", "exponential backoff");
    let hits = sync.search(&conn, "backoff", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "PAT:A");

    conn.execute(
        "UPDATE patterns SET title = 'Circuit breaker' WHERE id = 'PAT:A'",
        [],
    )
    .unwrap();
    assert!(sync.search(&conn, "bounded", 10).unwrap().is_empty());
    assert_eq!(sync.search(&conn, "circuit", 10).unwrap().len(), 1);

    conn.execute("DELETE FROM patterns WHERE id = 'PAT:A'", []).unwrap();
    assert!(sync.search(&conn, "circuit", 10).unwrap().is_empty());
}

#[test]
fn ensure_schema_is_idempotent() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: true, fts5: true });
    sync.ensure_schema(&conn).unwrap();
    sync.ensure_schema(&conn).unwrap();
    insert_row(&conn, "PAT:A", "Once", "only once in the index");
    assert_eq!(sync.search(&conn, "once", 10).unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// MANUAL STRATEGY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn manual_sync_updates_the_index_per_write() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: false, fts5: true });
    assert_eq!(sync.strategy(), SyncStrategy::Manual);
    sync.ensure_schema(&conn).unwrap();

    insert_row(&conn, "PAT:A", "Bounded retry", "exponential backoff");
    // No triggers installed: the row alone is not indexed.
    assert!(sync.search(&conn, "backoff", 10).unwrap().is_empty());

    sync.after_upsert(&conn, &pattern("PAT:A", "Bounded retry", "exponential backoff"));
    assert_eq!(sync.search(&conn, "backoff", 10).unwrap().len(), 1);

    sync.after_delete(&conn, "PAT:A");
    assert!(sync.search(&conn, "backoff", 10).unwrap().is_empty());

    let metrics = sync.metrics();
    assert_eq!(metrics.synced, 2);
    assert_eq!(metrics.failed, 0);
}

#[test]
fn manual_sync_failure_is_absorbed_and_counted() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: false, fts5: true });
    // ensure_schema deliberately skipped: the FTS table is missing, so
    // every sync fails. The caller must not see an error.
    sync.after_upsert(&conn, &pattern("PAT:A", "t", "s"));
    assert_eq!(sync.metrics().failed, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DEGRADED STRATEGY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn degraded_search_scans_with_like() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: true, fts5: false });
    assert_eq!(sync.strategy(), SyncStrategy::Degraded);
    sync.ensure_schema(&conn).unwrap();

    insert_row(&conn, "PAT:A", "Bounded retry", "exponential backoff");
    insert_row(&conn, "PAT:B", "Pooling", "connection reuse");

    let hits = sync.search(&conn, "backoff", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "PAT:A");

    // LIKE wildcards in the query match literally.
    assert!(sync.search(&conn, "100%", 10).unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// VISIBILITY AND RANKING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn invalid_rows_never_surface_in_search() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: true, fts5: true });
    sync.ensure_schema(&conn).unwrap();

    insert_row(&conn, "PAT:A", "Bounded retry", "exponential backoff");
    conn.execute("UPDATE patterns SET valid = 0 WHERE id = 'PAT:A'", [])
        .unwrap();
    assert!(sync.search(&conn, "retry", 10).unwrap().is_empty());
}

#[test]
fn rebuild_reindexes_every_row() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: true, fts5: true });
    sync.ensure_schema(&conn).unwrap();

    insert_row(&conn, "PAT:A", "Bounded retry", "exponential backoff");
    insert_row(&conn, "PAT:B", "Pooling", "connection reuse");
    conn.execute("DELETE FROM pattern_fts", []).unwrap();
    assert!(sync.search(&conn, "retry", 10).unwrap().is_empty());

    sync.rebuild(&conn).unwrap();
    assert_eq!(sync.search(&conn, "retry", 10).unwrap().len(), 1);
    assert_eq!(sync.search(&conn, "pooling", 10).unwrap().len(), 1);
}

#[test]
fn better_matches_rank_first() {
    let conn = open_migrated();
    let sync = sync_for(Capabilities { change_triggers: true, fts5: true });
    sync.ensure_schema(&conn).unwrap();

    insert_row(&conn, "PAT:one", "retry", "retry retry retry");
    insert_row(&conn, "PAT:two", "pooling", "mentions retry once in passing among many other words");

    let hits = sync.search(&conn, "retry", 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, "PAT:one");
    // bm25 scores are negative; better is more negative.
    assert!(hits[0].1 <= hits[1].1);
}
