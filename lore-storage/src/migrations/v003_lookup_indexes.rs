//! V003: lookup-path indexes and alias uniqueness.
//!
//! Value indexes on the facet join tables keep the dynamic lookup
//! query off full scans; the partial unique index enforces global
//! alias uniqueness without penalizing alias-free patterns.

use lore_core::errors::StorageError;
use rusqlite::Connection;

use crate::to_storage_err;

pub const VERSION: u32 = 3;
pub const ID: &str = "v003_lookup_indexes";
pub const NAME: &str = "facet value indexes and unique alias";

pub const UP_SQL: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_patterns_alias
    ON patterns(alias) WHERE alias IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_patterns_updated ON patterns(updated_at);

CREATE INDEX IF NOT EXISTS idx_pattern_languages_value ON pattern_languages(value);
CREATE INDEX IF NOT EXISTS idx_pattern_frameworks_value ON pattern_frameworks(value);
CREATE INDEX IF NOT EXISTS idx_pattern_task_types_value ON pattern_task_types(value);
CREATE INDEX IF NOT EXISTS idx_pattern_environments_value ON pattern_environments(value);
CREATE INDEX IF NOT EXISTS idx_pattern_tags_value ON pattern_tags(value);
"#;

pub const DOWN_SQL: &str = r#"
DROP INDEX IF EXISTS idx_pattern_tags_value;
DROP INDEX IF EXISTS idx_pattern_environments_value;
DROP INDEX IF EXISTS idx_pattern_task_types_value;
DROP INDEX IF EXISTS idx_pattern_frameworks_value;
DROP INDEX IF EXISTS idx_pattern_languages_value;
DROP INDEX IF EXISTS idx_patterns_updated;
DROP INDEX IF EXISTS idx_patterns_alias;
"#;

/// The alias unique index is in place.
pub fn validate(conn: &Connection) -> Result<bool, StorageError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'index' AND name = 'idx_patterns_alias'",
            [],
            |row| row.get(0),
        )
        .map_err(to_storage_err)?;
    Ok(count == 1)
}
