//! Write-side transaction helpers.
//!
//! Every multi-statement write goes through `with_immediate_transaction`
//! so the write lock is taken up front (BEGIN IMMEDIATE) instead of at
//! the first write, which is where deferred transactions deadlock under
//! concurrency.

use lore_core::errors::StorageError;
use rusqlite::Connection;

use crate::to_storage_err;

/// Run `f` inside a BEGIN IMMEDIATE transaction, committing on success
/// and rolling back on error.
pub fn with_immediate_transaction<T, F>(conn: &Connection, f: F) -> Result<T, StorageError>
where
    F: FnOnce(&Connection) -> Result<T, StorageError>,
{
    conn.execute_batch("BEGIN IMMEDIATE").map_err(to_storage_err)?;
    match f(conn) {
        Ok(value) => match conn.execute_batch("COMMIT") {
            Ok(()) => Ok(value),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(to_storage_err(e))
            }
        },
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Run `f` inside a named savepoint. On error the savepoint rolls back
/// and releases, leaving any enclosing transaction intact.
///
/// `name` must be a plain identifier; it is interpolated into SQL.
pub fn with_savepoint<T, F>(conn: &Connection, name: &str, f: F) -> Result<T, StorageError>
where
    F: FnOnce(&Connection) -> Result<T, StorageError>,
{
    conn.execute_batch(&format!("SAVEPOINT {name};"))
        .map_err(to_storage_err)?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))
                .map_err(to_storage_err)?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"));
            Err(e)
        }
    }
}
