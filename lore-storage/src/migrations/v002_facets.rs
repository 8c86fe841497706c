//! V002: the seven facet join tables.
//!
//! Each is keyed by `(pattern_id, value)` and cascade-deletes with its
//! pattern. Frameworks carry an optional version constraint.

use lore_core::errors::StorageError;
use rusqlite::Connection;

use crate::to_storage_err;

pub const VERSION: u32 = 2;
pub const ID: &str = "v002_facets";
pub const NAME: &str = "facet join tables";

/// Join tables in creation order. Shared with the queries layer so the
/// facet full-replace sweep and this schema can never disagree.
pub const FACET_TABLES: &[&str] = &[
    "pattern_languages",
    "pattern_frameworks",
    "pattern_paths",
    "pattern_repos",
    "pattern_task_types",
    "pattern_environments",
    "pattern_tags",
];

pub const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pattern_languages (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    PRIMARY KEY (pattern_id, value)
) STRICT;

CREATE TABLE IF NOT EXISTS pattern_frameworks (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    version TEXT,
    PRIMARY KEY (pattern_id, value)
) STRICT;

CREATE TABLE IF NOT EXISTS pattern_paths (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    PRIMARY KEY (pattern_id, value)
) STRICT;

CREATE TABLE IF NOT EXISTS pattern_repos (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    PRIMARY KEY (pattern_id, value)
) STRICT;

CREATE TABLE IF NOT EXISTS pattern_task_types (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    PRIMARY KEY (pattern_id, value)
) STRICT;

CREATE TABLE IF NOT EXISTS pattern_environments (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    PRIMARY KEY (pattern_id, value)
) STRICT;

CREATE TABLE IF NOT EXISTS pattern_tags (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    PRIMARY KEY (pattern_id, value)
) STRICT;
"#;

pub const DOWN_SQL: &str = r#"
DROP TABLE IF EXISTS pattern_tags;
DROP TABLE IF EXISTS pattern_environments;
DROP TABLE IF EXISTS pattern_task_types;
DROP TABLE IF EXISTS pattern_repos;
DROP TABLE IF EXISTS pattern_paths;
DROP TABLE IF EXISTS pattern_frameworks;
DROP TABLE IF EXISTS pattern_languages;
"#;

/// All seven join tables exist.
pub fn validate(conn: &Connection) -> Result<bool, StorageError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name LIKE 'pattern\\_%' ESCAPE '\\'",
            [],
            |row| row.get(0),
        )
        .map_err(to_storage_err)?;
    Ok(count >= FACET_TABLES.len() as i64)
}
