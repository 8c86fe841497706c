//! Versioned schema migrations with a recorded history table.
//!
//! Each migration module exposes its up/down SQL, an identity, and a
//! post-apply validation check. The registry must be strictly
//! sequential; a gap is a load-time error.
//!
//! A fresh database (no user tables at all) takes the fast path: the
//! full current schema is created in one pass and every known
//! migration is stamped as applied with the fresh-install sentinel
//! checksum. An existing database replays each pending migration
//! inside a savepoint so a failure leaves no partial schema and no
//! record.

pub mod v001_patterns;
pub mod v002_facets;
pub mod v003_lookup_indexes;

use std::time::Instant;

use lore_core::errors::{MigrationError, StorageError};
use rusqlite::{params, Connection};
use xxhash_rust::xxh3::xxh3_64;

use crate::connection::writer::with_immediate_transaction;
use crate::to_storage_err;

/// Checksum recorded for migrations stamped by the fresh-install path,
/// which never executed individually.
pub const FRESH_INSTALL_CHECKSUM: &str = "fresh-install";

/// One versioned schema change.
pub struct Migration {
    pub version: u32,
    pub id: &'static str,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
    pub validate: fn(&Connection) -> Result<bool, StorageError>,
}

/// All known migrations, ascending.
pub fn registry() -> &'static [Migration] {
    &[
        Migration {
            version: v001_patterns::VERSION,
            id: v001_patterns::ID,
            name: v001_patterns::NAME,
            up: v001_patterns::UP_SQL,
            down: v001_patterns::DOWN_SQL,
            validate: v001_patterns::validate,
        },
        Migration {
            version: v002_facets::VERSION,
            id: v002_facets::ID,
            name: v002_facets::NAME,
            up: v002_facets::UP_SQL,
            down: v002_facets::DOWN_SQL,
            validate: v002_facets::validate,
        },
        Migration {
            version: v003_lookup_indexes::VERSION,
            id: v003_lookup_indexes::ID,
            name: v003_lookup_indexes::NAME,
            up: v003_lookup_indexes::UP_SQL,
            down: v003_lookup_indexes::DOWN_SQL,
            validate: v003_lookup_indexes::validate,
        },
    ]
}

const RECORDS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    checksum TEXT NOT NULL,
    applied_at INTEGER NOT NULL DEFAULT (unixepoch()),
    duration_ms INTEGER NOT NULL DEFAULT 0
) STRICT;
"#;

/// How one migration ended up in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Replayed individually and recorded.
    Applied,
    /// Record already present with a matching checksum; skipped.
    AlreadyApplied,
    /// Stamped by the fresh-install fast path.
    Stamped,
    /// Rolled back by `rollback_to`.
    RolledBack,
}

/// Per-migration outcome of a runner pass.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub version: u32,
    pub name: &'static str,
    pub state: MigrationState,
    pub duration_ms: u64,
}

/// xxh3 hex checksum of a migration's up SQL.
pub fn checksum_of(up_sql: &str) -> String {
    format!("{:016x}", xxh3_64(up_sql.as_bytes()))
}

/// Registry versions must be 1..=N with no gaps.
pub fn verify_registry() -> Result<(), MigrationError> {
    for (i, m) in registry().iter().enumerate() {
        let expected = i as u32 + 1;
        if m.version != expected {
            return Err(MigrationError::VersionGap {
                expected,
                found: m.version,
            });
        }
    }
    Ok(())
}

/// A database with no user tables at all has never been migrated.
fn is_fresh(conn: &Connection) -> Result<bool, StorageError> {
    let user_tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .map_err(to_storage_err)?;
    Ok(user_tables == 0)
}

fn stored_checksum(conn: &Connection, version: u32) -> Result<Option<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT checksum FROM schema_migrations WHERE version = ?1")
        .map_err(to_storage_err)?;
    let mut rows = stmt.query(params![version]).map_err(to_storage_err)?;
    match rows.next().map_err(to_storage_err)? {
        Some(row) => Ok(Some(row.get(0).map_err(to_storage_err)?)),
        None => Ok(None),
    }
}

fn insert_record(
    conn: &Connection,
    m: &Migration,
    checksum: &str,
    duration_ms: u64,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO schema_migrations (version, id, name, checksum, applied_at, duration_ms)
         VALUES (?1, ?2, ?3, ?4, unixepoch(), ?5)",
        params![m.version, m.id, m.name, checksum, duration_ms as i64],
    )
    .map_err(to_storage_err)?;
    Ok(())
}

/// Highest recorded migration version (0 when none).
pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )
        .map_err(to_storage_err)?;
    if exists == 0 {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(to_storage_err)
}

/// Run all pending migrations. Callers must hold the migration lock
/// when other processes can share this database file.
pub fn run(conn: &Connection) -> Result<Vec<MigrationReport>, MigrationError> {
    verify_registry()?;

    if is_fresh(conn)? {
        return stamp_fresh(conn);
    }

    conn.execute_batch(RECORDS_TABLE_SQL)
        .map_err(|e| MigrationError::Storage(to_storage_err(e)))?;

    let known_max = registry().len() as u32;
    let recorded = current_version(conn)?;
    if recorded > known_max {
        return Err(MigrationError::UnknownVersion { version: recorded });
    }

    let mut reports = Vec::with_capacity(registry().len());
    for m in registry() {
        let loaded = checksum_of(m.up);
        match stored_checksum(conn, m.version)? {
            Some(stored) => {
                if stored != loaded && stored != FRESH_INSTALL_CHECKSUM {
                    return Err(MigrationError::ChecksumMismatch {
                        version: m.version,
                        stored,
                        loaded,
                    });
                }
                reports.push(MigrationReport {
                    version: m.version,
                    name: m.name,
                    state: MigrationState::AlreadyApplied,
                    duration_ms: 0,
                });
            }
            None => {
                let start = Instant::now();
                apply_one(conn, m, &loaded)?;
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::info!(version = m.version, name = m.name, duration_ms, "applied migration");
                reports.push(MigrationReport {
                    version: m.version,
                    name: m.name,
                    state: MigrationState::Applied,
                    duration_ms,
                });
            }
        }
    }
    Ok(reports)
}

/// Apply one pending migration inside a savepoint: schema change,
/// post-apply validation, and the history record commit together or
/// not at all.
fn apply_one(conn: &Connection, m: &Migration, checksum: &str) -> Result<(), MigrationError> {
    let sp = format!("sp_migration_v{}", m.version);
    conn.execute_batch(&format!("SAVEPOINT {sp};"))
        .map_err(|e| MigrationError::Storage(to_storage_err(e)))?;

    let result = (|| -> Result<(), MigrationError> {
        let start = Instant::now();
        conn.execute_batch(m.up).map_err(|e| MigrationError::Failed {
            version: m.version,
            reason: e.to_string(),
        })?;
        if !(m.validate)(conn)? {
            return Err(MigrationError::Failed {
                version: m.version,
                reason: "post-apply validation failed".to_string(),
            });
        }
        insert_record(conn, m, checksum, start.elapsed().as_millis() as u64)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch(&format!("RELEASE {sp};"))
                .map_err(|e| MigrationError::Storage(to_storage_err(e)))?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch(&format!("ROLLBACK TO {sp}; RELEASE {sp};"));
            Err(e)
        }
    }
}

/// Fresh-install fast path: full current schema in one pass, every
/// migration stamped with the sentinel checksum.
fn stamp_fresh(conn: &Connection) -> Result<Vec<MigrationReport>, MigrationError> {
    let start = Instant::now();
    let reports = with_immediate_transaction(conn, |c| {
        let mut reports = Vec::with_capacity(registry().len());
        for m in registry() {
            c.execute_batch(m.up).map_err(to_storage_err)?;
        }
        c.execute_batch(RECORDS_TABLE_SQL).map_err(to_storage_err)?;
        for m in registry() {
            insert_record(c, m, FRESH_INSTALL_CHECKSUM, 0)?;
            reports.push(MigrationReport {
                version: m.version,
                name: m.name,
                state: MigrationState::Stamped,
                duration_ms: 0,
            });
        }
        Ok(reports)
    })?;
    tracing::info!(
        versions = registry().len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "fresh database: created full schema and stamped migrations"
    );
    Ok(reports)
}

/// Roll back applied migrations above `target`, highest first. Each
/// runs its down SQL and deletes its record inside a savepoint.
pub fn rollback_to(conn: &Connection, target: u32) -> Result<Vec<MigrationReport>, MigrationError> {
    verify_registry()?;
    let mut reports = Vec::new();
    for m in registry().iter().rev() {
        if m.version <= target {
            break;
        }
        if stored_checksum(conn, m.version)?.is_none() {
            continue;
        }
        let sp = format!("sp_rollback_v{}", m.version);
        conn.execute_batch(&format!("SAVEPOINT {sp};"))
            .map_err(|e| MigrationError::Storage(to_storage_err(e)))?;
        let result = (|| -> Result<(), MigrationError> {
            conn.execute_batch(m.down).map_err(|e| MigrationError::Failed {
                version: m.version,
                reason: e.to_string(),
            })?;
            conn.execute(
                "DELETE FROM schema_migrations WHERE version = ?1",
                params![m.version],
            )
            .map_err(to_storage_err)?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                conn.execute_batch(&format!("RELEASE {sp};"))
                    .map_err(|e| MigrationError::Storage(to_storage_err(e)))?;
                tracing::info!(version = m.version, "rolled back migration");
                reports.push(MigrationReport {
                    version: m.version,
                    name: m.name,
                    state: MigrationState::RolledBack,
                    duration_ms: 0,
                });
            }
            Err(e) => {
                let _ = conn.execute_batch(&format!("ROLLBACK TO {sp}; RELEASE {sp};"));
                return Err(e);
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_sequential() {
        verify_registry().unwrap();
    }

    #[test]
    fn checksums_differ_per_migration() {
        let sums: Vec<String> = registry().iter().map(|m| checksum_of(m.up)).collect();
        let mut unique = sums.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(sums.len(), unique.len());
    }
}
