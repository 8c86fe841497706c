//! Facet join-table maintenance.
//!
//! Rebuild on upsert is full-replace, not diff: every join row for the
//! pattern is deleted and re-inserted from its declared facets. Run
//! inside the same transaction as the row upsert so a partial facet
//! write is never observable.

use lore_core::errors::StorageError;
use lore_core::pattern::{FrameworkFacet, Pattern, PatternFacets};
use rusqlite::{params, Connection};

use crate::migrations::v002_facets::FACET_TABLES;
use crate::to_storage_err;

/// Delete and re-insert all facet join rows for a pattern, including
/// the tag mirror.
pub fn replace_facets(conn: &Connection, p: &Pattern) -> Result<(), StorageError> {
    for table in FACET_TABLES {
        // Table names come from the compiled-in list, never a caller.
        conn.execute(
            &format!("DELETE FROM {table} WHERE pattern_id = ?1"),
            params![p.id],
        )
        .map_err(to_storage_err)?;
    }

    insert_values(conn, "pattern_languages", &p.id, &p.facets.languages)?;
    insert_frameworks(conn, &p.id, &p.facets.frameworks)?;
    insert_values(conn, "pattern_paths", &p.id, &p.facets.paths)?;
    insert_values(conn, "pattern_repos", &p.id, &p.facets.repos)?;
    insert_values(conn, "pattern_task_types", &p.id, &p.facets.task_types)?;
    insert_values(conn, "pattern_environments", &p.id, &p.facets.environments)?;
    insert_values(conn, "pattern_tags", &p.id, &p.tags)?;
    Ok(())
}

fn insert_values(
    conn: &Connection,
    table: &str,
    id: &str,
    values: &[String],
) -> Result<(), StorageError> {
    if values.is_empty() {
        return Ok(());
    }
    let mut stmt = conn
        .prepare_cached(&format!(
            "INSERT OR IGNORE INTO {table} (pattern_id, value) VALUES (?1, ?2)"
        ))
        .map_err(to_storage_err)?;
    for value in values {
        stmt.execute(params![id, value]).map_err(to_storage_err)?;
    }
    Ok(())
}

fn insert_frameworks(
    conn: &Connection,
    id: &str,
    frameworks: &[FrameworkFacet],
) -> Result<(), StorageError> {
    if frameworks.is_empty() {
        return Ok(());
    }
    let mut stmt = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO pattern_frameworks (pattern_id, value, version)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(to_storage_err)?;
    for fw in frameworks {
        stmt.execute(params![id, fw.name, fw.version])
            .map_err(to_storage_err)?;
    }
    Ok(())
}

/// Load the facet associations for one pattern. Tags live on the
/// primary row, so they are not part of this.
pub fn load_facets(conn: &Connection, id: &str) -> Result<PatternFacets, StorageError> {
    Ok(PatternFacets {
        languages: load_values(conn, "pattern_languages", id)?,
        frameworks: load_frameworks(conn, id)?,
        paths: load_values(conn, "pattern_paths", id)?,
        repos: load_values(conn, "pattern_repos", id)?,
        task_types: load_values(conn, "pattern_task_types", id)?,
        environments: load_values(conn, "pattern_environments", id)?,
    })
}

fn load_values(conn: &Connection, table: &str, id: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT value FROM {table} WHERE pattern_id = ?1 ORDER BY value"
        ))
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map(params![id], |row| row.get(0))
        .map_err(to_storage_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)
}

fn load_frameworks(conn: &Connection, id: &str) -> Result<Vec<FrameworkFacet>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT value, version FROM pattern_frameworks WHERE pattern_id = ?1 ORDER BY value",
        )
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok(FrameworkFacet {
                name: row.get(0)?,
                version: row.get(1)?,
            })
        })
        .map_err(to_storage_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)
}
