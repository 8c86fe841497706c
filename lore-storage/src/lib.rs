//! # lore-storage
//!
//! SQLite persistence for the Lore pattern engine: tiered backend
//! adapter, schema migrations with a cross-process lock, FTS5 search
//! synchronization, read-through caches, and the pattern repository
//! that keeps rows and on-disk pattern files convergent.

pub mod adapter;
pub mod cache;
pub mod connection;
pub mod lock;
pub mod migrations;
pub mod pagination;
pub mod pattern_files;
pub mod queries;
pub mod repository;
pub mod retry;
pub mod search;
pub mod watcher;

use lore_core::errors::StorageError;

/// Classify a rusqlite error into the storage taxonomy.
///
/// Busy/locked conditions become [`StorageError::Busy`] so the retry
/// wrapper can recover them; constraint violations become
/// [`StorageError::Constraint`] so callers can attribute them.
pub(crate) fn to_storage_err(e: rusqlite::Error) -> StorageError {
    use rusqlite::ErrorCode;
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StorageError::Busy {
            message: e.to_string(),
        },
        Some(ErrorCode::ConstraintViolation) => StorageError::Constraint {
            message: e.to_string(),
        },
        _ => StorageError::SqliteError {
            message: e.to_string(),
        },
    }
}
