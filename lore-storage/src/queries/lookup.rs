//! Dynamic faceted lookup.
//!
//! The filter builds one EXISTS subquery per constrained dimension.
//! Facet values only ever travel as bound parameters; the SQL text is
//! assembled from fixed fragments. Results are ordered by trust score
//! descending with the id as a tiebreaker, which is also the keyset
//! the pagination cursor continues from.

use lore_core::errors::StorageError;
use lore_core::pattern::{FacetQuery, Pattern};
use rusqlite::types::Value;
use rusqlite::Connection;

use crate::pagination::PaginationCursor;
use crate::to_storage_err;

use super::facets::load_facets;
use super::patterns::{get_snippets, map_pattern_row, PATTERN_COLUMNS};

/// One page of lookup results.
#[derive(Debug)]
pub struct LookupPage {
    pub patterns: Vec<Pattern>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Unpaged lookup: the first `limit` matches.
pub fn lookup_patterns(
    conn: &Connection,
    query: &FacetQuery,
    limit: usize,
) -> Result<Vec<Pattern>, StorageError> {
    lookup_page(conn, query, limit, None).map(|page| page.patterns)
}

/// Keyset-paged lookup. Fetches one row beyond `limit` to learn
/// whether more remain.
pub fn lookup_page(
    conn: &Connection,
    query: &FacetQuery,
    limit: usize,
    cursor: Option<&PaginationCursor>,
) -> Result<LookupPage, StorageError> {
    let mut sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns p WHERE p.valid = 1");
    let mut params: Vec<Value> = Vec::new();

    add_in_clause(&mut sql, &mut params, "pattern_languages", &query.languages);
    add_in_clause(&mut sql, &mut params, "pattern_frameworks", &query.frameworks);
    add_in_clause(&mut sql, &mut params, "pattern_tags", &query.tags);
    add_in_clause(&mut sql, &mut params, "pattern_task_types", &query.task_types);
    add_in_clause(&mut sql, &mut params, "pattern_environments", &query.environments);

    if let Some(ref path) = query.path {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM pattern_paths j \
             WHERE j.pattern_id = p.id AND ? GLOB j.value)",
        );
        params.push(Value::Text(path.clone()));
    }
    if let Some(ref repo) = query.repo {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM pattern_repos j \
             WHERE j.pattern_id = p.id AND ? GLOB j.value)",
        );
        params.push(Value::Text(repo.clone()));
    }

    if let Some(cursor) = cursor {
        sql.push_str(" AND (p.trust_score < ? OR (p.trust_score = ? AND p.id > ?))");
        params.push(Value::Real(cursor.last_trust));
        params.push(Value::Real(cursor.last_trust));
        params.push(Value::Text(cursor.last_id.clone()));
    }

    sql.push_str(" ORDER BY p.trust_score DESC, p.id ASC LIMIT ?");
    params.push(Value::Integer(limit as i64 + 1));

    let mut stmt = conn.prepare_cached(&sql).map_err(to_storage_err)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), map_pattern_row)
        .map_err(to_storage_err)?;
    let mut patterns = rows
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_storage_err)?;

    let has_more = patterns.len() > limit;
    patterns.truncate(limit);

    for p in &mut patterns {
        p.facets = load_facets(conn, &p.id)?;
        p.snippets = get_snippets(conn, &p.id)?;
    }

    let next_cursor = if has_more {
        patterns.last().map(|p| {
            PaginationCursor {
                last_trust: p.trust.score,
                last_id: p.id.clone(),
            }
            .encode()
        })
    } else {
        None
    };

    Ok(LookupPage {
        patterns,
        next_cursor,
        has_more,
    })
}

/// AND-in one dimension: the pattern must carry at least one of the
/// given values in `table`.
fn add_in_clause(sql: &mut String, params: &mut Vec<Value>, table: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    sql.push_str(&format!(
        " AND EXISTS (SELECT 1 FROM {table} j WHERE j.pattern_id = p.id AND j.value IN ("
    ));
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        params.push(Value::Text(value.clone()));
    }
    sql.push_str("))");
}
