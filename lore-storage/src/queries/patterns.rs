//! Primary-table pattern queries.

use lore_core::errors::StorageError;
use lore_core::pattern::{Pattern, PatternType, Snippet};
use lore_core::trust::TrustScore;
use rusqlite::{params, Connection, Row};

use crate::to_storage_err;

use super::facets::load_facets;

pub(crate) const PATTERN_COLUMNS: &str = "id, pattern_type, title, summary, problem, solution, \
     implementation, examples, trust_score, alpha, beta, usage_count, success_count, digest, \
     canonical, valid, invalid_reason, alias, tags, keywords, created_at, updated_at";

/// Insert or update a pattern row. `id` and `created_at` never change
/// on conflict.
pub fn upsert_pattern(conn: &Connection, p: &Pattern) -> Result<(), StorageError> {
    let tags = serde_json::to_string(&p.tags).unwrap_or_else(|_| "[]".to_string());
    let keywords = serde_json::to_string(&p.keywords).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO patterns (id, pattern_type, title, summary, problem, solution,
             implementation, examples, trust_score, alpha, beta, usage_count, success_count,
             digest, canonical, valid, invalid_reason, alias, tags, keywords, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
         ON CONFLICT(id) DO UPDATE SET
           pattern_type = excluded.pattern_type,
           title = excluded.title,
           summary = excluded.summary,
           problem = excluded.problem,
           solution = excluded.solution,
           implementation = excluded.implementation,
           examples = excluded.examples,
           trust_score = excluded.trust_score,
           alpha = excluded.alpha,
           beta = excluded.beta,
           usage_count = excluded.usage_count,
           success_count = excluded.success_count,
           digest = excluded.digest,
           canonical = excluded.canonical,
           valid = excluded.valid,
           invalid_reason = excluded.invalid_reason,
           alias = excluded.alias,
           tags = excluded.tags,
           keywords = excluded.keywords,
           updated_at = excluded.updated_at",
        params![
            p.id,
            p.pattern_type.as_str(),
            p.title,
            p.summary,
            p.problem,
            p.solution,
            p.implementation,
            p.examples,
            p.trust.score,
            p.trust.alpha,
            p.trust.beta,
            p.usage_count as i64,
            p.success_count as i64,
            p.digest,
            p.canonical,
            p.valid as i64,
            p.invalid_reason,
            p.alias,
            tags,
            keywords,
            p.created_at,
            p.updated_at,
        ],
    )
    .map_err(to_storage_err)?;

    replace_snippets(conn, &p.id, &p.snippets)?;
    Ok(())
}

/// Load one pattern with its facets and snippets. `include_invalid`
/// serves the audit path; normal reads exclude quarantined rows.
pub fn get_pattern(
    conn: &Connection,
    id: &str,
    include_invalid: bool,
) -> Result<Option<Pattern>, StorageError> {
    let sql = format!(
        "SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?1{}",
        if include_invalid { "" } else { " AND valid = 1" }
    );
    let mut stmt = conn.prepare_cached(&sql).map_err(to_storage_err)?;
    let mut rows = stmt
        .query_map(params![id], map_pattern_row)
        .map_err(to_storage_err)?;

    match rows.next() {
        Some(row) => {
            let mut pattern = row.map_err(to_storage_err)?;
            pattern.facets = load_facets(conn, id)?;
            pattern.snippets = get_snippets(conn, id)?;
            Ok(Some(pattern))
        }
        None => Ok(None),
    }
}

/// Delete a pattern row; facet joins and snippets cascade. Returns
/// whether a row existed.
pub fn delete_pattern(conn: &Connection, id: &str) -> Result<bool, StorageError> {
    let affected = conn
        .execute("DELETE FROM patterns WHERE id = ?1", params![id])
        .map_err(to_storage_err)?;
    Ok(affected > 0)
}

/// Quarantine a row: flag invalid with a stored reason, keep it for
/// audit.
pub fn mark_invalid(conn: &Connection, id: &str, reason: &str) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE patterns SET valid = 0, invalid_reason = ?2 WHERE id = ?1",
        params![id, reason],
    )
    .map_err(to_storage_err)?;
    Ok(())
}

/// Which pattern owns an alias, if any.
pub fn alias_owner(conn: &Connection, alias: &str) -> Result<Option<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT id FROM patterns WHERE alias = ?1")
        .map_err(to_storage_err)?;
    let mut rows = stmt.query(params![alias]).map_err(to_storage_err)?;
    match rows.next().map_err(to_storage_err)? {
        Some(row) => Ok(Some(row.get(0).map_err(to_storage_err)?)),
        None => Ok(None),
    }
}

/// Persist a usage outcome: counters and recomputed trust.
pub fn record_usage_row(conn: &Connection, p: &Pattern) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE patterns
         SET trust_score = ?2, alpha = ?3, beta = ?4,
             usage_count = ?5, success_count = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            p.id,
            p.trust.score,
            p.trust.alpha,
            p.trust.beta,
            p.usage_count as i64,
            p.success_count as i64,
            p.updated_at,
        ],
    )
    .map_err(to_storage_err)?;
    Ok(())
}

fn replace_snippets(conn: &Connection, id: &str, snippets: &[Snippet]) -> Result<(), StorageError> {
    conn.execute("DELETE FROM snippets WHERE pattern_id = ?1", params![id])
        .map_err(to_storage_err)?;
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO snippets (pattern_id, language, source, file, line_start, line_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(to_storage_err)?;
    for s in snippets {
        stmt.execute(params![id, s.language, s.source, s.file, s.line_start, s.line_end])
            .map_err(to_storage_err)?;
    }
    Ok(())
}

/// Snippets owned by one pattern, in insertion order.
pub fn get_snippets(conn: &Connection, id: &str) -> Result<Vec<Snippet>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT language, source, file, line_start, line_end
             FROM snippets WHERE pattern_id = ?1 ORDER BY id",
        )
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok(Snippet {
                language: row.get(0)?,
                source: row.get(1)?,
                file: row.get(2)?,
                line_start: row.get(3)?,
                line_end: row.get(4)?,
            })
        })
        .map_err(to_storage_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)
}

/// All pattern ids, valid and invalid.
pub fn all_ids(conn: &Connection) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT id FROM patterns ORDER BY id")
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map([], |row| row.get(0))
        .map_err(to_storage_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_storage_err)
}

pub fn count_patterns(conn: &Connection) -> Result<u64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(to_storage_err)
}

/// Wipe the primary table; cascades clear facets and snippets. Used by
/// `rebuild` inside its replacement transaction.
pub fn delete_all_patterns(conn: &Connection) -> Result<(), StorageError> {
    conn.execute("DELETE FROM patterns", [])
        .map_err(to_storage_err)?;
    Ok(())
}

/// Aggregate store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    pub snippets: u64,
    pub by_type: Vec<(String, u64)>,
}

pub fn stats(conn: &Connection) -> Result<StoreStats, StorageError> {
    let (total, valid): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(valid), 0) FROM patterns",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(to_storage_err)?;
    let snippets: i64 = conn
        .query_row("SELECT COUNT(*) FROM snippets", [], |row| row.get(0))
        .map_err(to_storage_err)?;

    let mut stmt = conn
        .prepare_cached(
            "SELECT pattern_type, COUNT(*) FROM patterns GROUP BY pattern_type ORDER BY pattern_type",
        )
        .map_err(to_storage_err)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))
        .map_err(to_storage_err)?;
    let by_type = rows
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_storage_err)?;

    Ok(StoreStats {
        total: total as u64,
        valid: valid as u64,
        invalid: (total - valid) as u64,
        snippets: snippets as u64,
        by_type,
    })
}

pub(crate) fn map_pattern_row(row: &Row) -> rusqlite::Result<Pattern> {
    let type_str: String = row.get(1)?;
    let tags: String = row.get(18)?;
    let keywords: String = row.get(19)?;
    Ok(Pattern {
        id: row.get(0)?,
        pattern_type: PatternType::parse(&type_str).unwrap_or(PatternType::CodePattern),
        title: row.get(2)?,
        summary: row.get(3)?,
        problem: row.get(4)?,
        solution: row.get(5)?,
        implementation: row.get(6)?,
        examples: row.get(7)?,
        trust: TrustScore {
            score: row.get(8)?,
            alpha: row.get(9)?,
            beta: row.get(10)?,
        },
        usage_count: row.get::<_, i64>(11)? as u64,
        success_count: row.get::<_, i64>(12)? as u64,
        digest: row.get(13)?,
        canonical: row.get(14)?,
        valid: row.get::<_, i64>(15)? != 0,
        invalid_reason: row.get(16)?,
        alias: row.get(17)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        facets: Default::default(),
        snippets: Vec::new(),
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}
