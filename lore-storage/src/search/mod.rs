//! Search-index synchronization.
//!
//! An FTS5 table shadows (title, summary, tags, keywords) per pattern.
//! The strategy comes from the probed backend capabilities:
//!
//! - triggers + FTS5: shadow triggers do the work, per-write sync is
//!   a no-op;
//! - FTS5 without reliable triggers: manual delete+insert per write,
//!   inside a savepoint, failures logged as warnings and absorbed;
//! - no FTS5: `search` degrades to a LIKE scan.
//!
//! A missed index update degrades search results but must never fail
//! the caller's write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lore_core::config::SearchConfig;
use lore_core::errors::StorageError;
use lore_core::pattern::Pattern;
use rusqlite::{params, Connection};

use crate::adapter::Capabilities;
use crate::connection::writer::with_savepoint;
use crate::to_storage_err;

const FTS_SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS pattern_fts USING fts5(
    id UNINDEXED,
    title,
    summary,
    tags,
    keywords
);
"#;

const TRIGGER_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS pattern_fts_ai AFTER INSERT ON patterns BEGIN
    INSERT INTO pattern_fts(id, title, summary, tags, keywords)
    VALUES (new.id, new.title, new.summary, new.tags, new.keywords);
END;

CREATE TRIGGER IF NOT EXISTS pattern_fts_ad AFTER DELETE ON patterns BEGIN
    DELETE FROM pattern_fts WHERE id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS pattern_fts_au
AFTER UPDATE OF title, summary, tags, keywords ON patterns BEGIN
    DELETE FROM pattern_fts WHERE id = old.id;
    INSERT INTO pattern_fts(id, title, summary, tags, keywords)
    VALUES (new.id, new.title, new.summary, new.tags, new.keywords);
END;
"#;

const DROP_TRIGGER_SQL: &str = r#"
DROP TRIGGER IF EXISTS pattern_fts_ai;
DROP TRIGGER IF EXISTS pattern_fts_ad;
DROP TRIGGER IF EXISTS pattern_fts_au;
"#;

/// How per-write synchronization happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Engine triggers shadow every write; per-write sync is a no-op.
    Triggers,
    /// Manual delete+insert per write.
    Manual,
    /// FTS5 unavailable; search falls back to a LIKE scan.
    Degraded,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triggers => "triggers",
            Self::Manual => "manual",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Metrics {
    synced: u64,
    failed: u64,
    slow: u64,
    total: Duration,
    max: Duration,
}

/// Point-in-time view of sync activity.
#[derive(Debug, Clone, Copy)]
pub struct SearchMetrics {
    pub strategy: SyncStrategy,
    pub synced: u64,
    pub failed: u64,
    pub slow: u64,
    pub avg_duration: Duration,
    pub max_duration: Duration,
}

/// Keeps the search index consistent with pattern writes.
pub struct SearchSync {
    strategy: SyncStrategy,
    slow_warn: Duration,
    metrics: Mutex<Metrics>,
    degraded_logged: AtomicBool,
}

impl SearchSync {
    /// Pick the strategy from the probed capabilities.
    pub fn new(capabilities: Capabilities, config: &SearchConfig) -> Self {
        let strategy = if !capabilities.fts5 {
            SyncStrategy::Degraded
        } else if capabilities.change_triggers {
            SyncStrategy::Triggers
        } else {
            SyncStrategy::Manual
        };
        tracing::info!(strategy = strategy.as_str(), "search sync strategy selected");
        Self {
            strategy,
            slow_warn: Duration::from_millis(config.effective_slow_sync_warn_ms()),
            metrics: Mutex::new(Metrics::default()),
            degraded_logged: AtomicBool::new(false),
        }
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    /// Create the FTS table (and triggers, when they do the syncing).
    /// Idempotent; called after migrations.
    pub fn ensure_schema(&self, conn: &Connection) -> Result<(), StorageError> {
        if self.strategy == SyncStrategy::Degraded {
            return Ok(());
        }
        conn.execute_batch(FTS_SCHEMA_SQL).map_err(to_storage_err)?;
        if self.strategy == SyncStrategy::Triggers {
            self.install_triggers(conn)?;
        }
        Ok(())
    }

    /// Recreate the shadow triggers. Only meaningful when the backend
    /// supports triggers at all.
    pub fn install_triggers(&self, conn: &Connection) -> Result<(), StorageError> {
        if self.strategy != SyncStrategy::Triggers {
            return Ok(());
        }
        conn.execute_batch(TRIGGER_SQL).map_err(to_storage_err)
    }

    /// Drop the shadow triggers for a bulk rewrite.
    pub fn drop_triggers(&self, conn: &Connection) -> Result<(), StorageError> {
        if self.strategy == SyncStrategy::Degraded {
            return Ok(());
        }
        conn.execute_batch(DROP_TRIGGER_SQL).map_err(to_storage_err)
    }

    /// Bring the index entry for an inserted/updated pattern current.
    /// Must run inside the caller's row transaction; failures are
    /// absorbed.
    pub fn after_upsert(&self, conn: &Connection, pattern: &Pattern) {
        if self.strategy != SyncStrategy::Manual {
            return;
        }
        let tags = serde_json::to_string(&pattern.tags).unwrap_or_default();
        let keywords = serde_json::to_string(&pattern.keywords).unwrap_or_default();
        self.run_sync(conn, "upsert", &pattern.id, |c| {
            c.execute(
                "DELETE FROM pattern_fts WHERE id = ?1",
                params![pattern.id],
            )
            .map_err(to_storage_err)?;
            c.execute(
                "INSERT INTO pattern_fts(id, title, summary, tags, keywords)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![pattern.id, pattern.title, pattern.summary, tags, keywords],
            )
            .map_err(to_storage_err)?;
            Ok(())
        });
    }

    /// Remove the index entry for a deleted pattern.
    pub fn after_delete(&self, conn: &Connection, id: &str) {
        if self.strategy != SyncStrategy::Manual {
            return;
        }
        self.run_sync(conn, "delete", id, |c| {
            c.execute("DELETE FROM pattern_fts WHERE id = ?1", params![id])
                .map_err(to_storage_err)?;
            Ok(())
        });
    }

    fn run_sync<F>(&self, conn: &Connection, op: &'static str, id: &str, f: F)
    where
        F: FnOnce(&Connection) -> Result<(), StorageError>,
    {
        let start = Instant::now();
        let result = with_savepoint(conn, "sp_fts_sync", f);
        let elapsed = start.elapsed();

        if let Ok(mut m) = self.metrics.lock() {
            m.total += elapsed;
            m.max = m.max.max(elapsed);
            match result {
                Ok(()) => m.synced += 1,
                Err(_) => m.failed += 1,
            }
            if elapsed >= self.slow_warn {
                m.slow += 1;
            }
        }

        if elapsed >= self.slow_warn {
            tracing::warn!(op, id, elapsed_ms = elapsed.as_millis() as u64, "slow search sync");
        }
        if let Err(e) = result {
            tracing::warn!(op, id, error = %e, "search index sync failed; search may lag for this pattern");
        }
    }

    /// Rebuild the entire index from the primary table.
    pub fn rebuild(&self, conn: &Connection) -> Result<(), StorageError> {
        if self.strategy == SyncStrategy::Degraded {
            return Ok(());
        }
        conn.execute_batch(
            "DELETE FROM pattern_fts;
             INSERT INTO pattern_fts(id, title, summary, tags, keywords)
             SELECT id, title, summary, tags, keywords FROM patterns;",
        )
        .map_err(to_storage_err)
    }

    /// Ranked text search; invalid patterns are excluded.
    pub fn search(
        &self,
        conn: &Connection,
        text: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, StorageError> {
        if self.strategy == SyncStrategy::Degraded {
            if !self.degraded_logged.swap(true, Ordering::Relaxed) {
                tracing::warn!("FTS5 unavailable; text search degraded to a LIKE scan");
            }
            return like_search(conn, text, limit);
        }

        let fts_query = build_fts_query(text);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        // bm25() is negative with more-negative = better, so ascending
        // ORDER BY ranks best first.
        let mut stmt = conn
            .prepare_cached(
                "SELECT f.id, bm25(pattern_fts) AS score
                 FROM pattern_fts f
                 JOIN patterns p ON p.id = f.id
                 WHERE pattern_fts MATCH ?1 AND p.valid = 1
                 ORDER BY score
                 LIMIT ?2",
            )
            .map_err(to_storage_err)?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(to_storage_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)
    }

    /// Activity counters for diagnostics.
    pub fn metrics(&self) -> SearchMetrics {
        let m = self.metrics.lock().map(|g| *g).unwrap_or_default();
        let ops = m.synced + m.failed;
        SearchMetrics {
            strategy: self.strategy,
            synced: m.synced,
            failed: m.failed,
            slow: m.slow,
            avg_duration: if ops > 0 { m.total / ops as u32 } else { Duration::ZERO },
            max_duration: m.max,
        }
    }
}

/// Quote each whitespace-separated term and OR them, so FTS5 operator
/// characters in user input match literally instead of parsing.
fn build_fts_query(text: &str) -> String {
    let mut query = String::with_capacity(text.len() + 16);
    for (i, term) in text.split_whitespace().enumerate() {
        if i > 0 {
            query.push_str(" OR ");
        }
        query.push('"');
        for c in term.chars() {
            if c == '"' {
                query.push_str("\"\"");
            } else {
                query.push(c);
            }
        }
        query.push('"');
    }
    query
}

fn like_search(
    conn: &Connection,
    text: &str,
    limit: usize,
) -> Result<Vec<(String, f64)>, StorageError> {
    let needle = format!("%{}%", escape_like(text.trim()));
    let mut stmt = conn
        .prepare_cached(
            "SELECT id FROM patterns
             WHERE valid = 1
               AND (title LIKE ?1 ESCAPE '\\' OR summary LIKE ?1 ESCAPE '\\')
             ORDER BY trust_score DESC
             LIMIT ?2",
        )
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map(params![needle, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, 0.0))
        })
        .map_err(to_storage_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
