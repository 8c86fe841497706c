//! V001: primary pattern table and owned snippets.

use lore_core::errors::StorageError;
use rusqlite::Connection;

use crate::to_storage_err;

pub const VERSION: u32 = 1;
pub const ID: &str = "v001_patterns";
pub const NAME: &str = "patterns and snippets";

pub const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    pattern_type TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    problem TEXT NOT NULL DEFAULT '',
    solution TEXT NOT NULL DEFAULT '',
    implementation TEXT NOT NULL DEFAULT '',
    examples TEXT NOT NULL DEFAULT '',
    trust_score REAL NOT NULL DEFAULT 0.5,
    alpha REAL NOT NULL DEFAULT 1.0,
    beta REAL NOT NULL DEFAULT 1.0,
    usage_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    digest TEXT NOT NULL DEFAULT '',
    canonical TEXT NOT NULL DEFAULT '',
    valid INTEGER NOT NULL DEFAULT 1,
    invalid_reason TEXT,
    alias TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    keywords TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL DEFAULT (unixepoch()),
    updated_at INTEGER NOT NULL DEFAULT (unixepoch())
) STRICT;

CREATE INDEX IF NOT EXISTS idx_patterns_type ON patterns(pattern_type);
CREATE INDEX IF NOT EXISTS idx_patterns_trust ON patterns(trust_score DESC);

CREATE TABLE IF NOT EXISTS snippets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    language TEXT NOT NULL,
    source TEXT NOT NULL,
    file TEXT,
    line_start INTEGER,
    line_end INTEGER
) STRICT;

CREATE INDEX IF NOT EXISTS idx_snippets_pattern ON snippets(pattern_id);
"#;

pub const DOWN_SQL: &str = r#"
DROP TABLE IF EXISTS snippets;
DROP TABLE IF EXISTS patterns;
"#;

/// Both tables exist with their indexes.
pub fn validate(conn: &Connection) -> Result<bool, StorageError> {
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('patterns', 'snippets')",
            [],
            |row| row.get(0),
        )
        .map_err(to_storage_err)?;
    Ok(tables == 2)
}
