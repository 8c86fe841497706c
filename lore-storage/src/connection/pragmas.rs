//! Connection pragma application, parameterized by backend tier.

use lore_core::config::StorageConfig;
use lore_core::errors::StorageError;
use rusqlite::Connection;

use crate::adapter::BackendKind;
use crate::to_storage_err;

/// Apply write-connection pragmas for the given tier.
///
/// WAL pairs with NORMAL synchronous (the log makes that safe); the
/// rollback and dotfile tiers pair with FULL because a rollback
/// journal under NORMAL can lose the last transaction on power cut.
pub fn apply_pragmas(
    conn: &Connection,
    kind: BackendKind,
    config: &StorageConfig,
) -> Result<(), StorageError> {
    let journal = match kind {
        BackendKind::Wal => "WAL",
        BackendKind::Rollback | BackendKind::Dotfile => "DELETE",
    };
    let synchronous = match kind {
        BackendKind::Wal => "NORMAL",
        BackendKind::Rollback | BackendKind::Dotfile => "FULL",
    };
    let cache_kib = config.effective_cache_size_kib();
    let busy_ms = config.effective_busy_timeout_ms();

    conn.execute_batch(&format!(
        "PRAGMA journal_mode = {journal};
         PRAGMA synchronous = {synchronous};
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_ms};
         PRAGMA cache_size = -{cache_kib};
         PRAGMA temp_store = MEMORY;
         PRAGMA mmap_size = 268435456;"
    ))
    .map_err(to_storage_err)
}

/// Pragmas for pooled read-only connections.
pub fn apply_read_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA query_only = ON;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;",
    )
    .map_err(to_storage_err)
}

/// Read back the effective journal mode. Pragma writes can silently
/// degrade, so callers verify instead of trusting the request.
pub fn journal_mode(conn: &Connection) -> Result<String, StorageError> {
    conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .map_err(to_storage_err)
}

/// Fold WAL pages back into the main file without blocking readers.
pub fn passive_checkpoint(conn: &Connection) -> Result<(), StorageError> {
    conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
        .map_err(to_storage_err)
}

/// Run the query-planner maintenance pass. Called on clean shutdown.
pub fn optimize_on_close(conn: &Connection) {
    if let Err(e) = conn.execute_batch("PRAGMA optimize;") {
        tracing::warn!(error = %e, "PRAGMA optimize failed on close");
    }
}
