//! Connection management: one serialized writer, a pool of readers.
//!
//! The writer connection is the one the backend probe already opened
//! and exercised; readers open with the same tier's VFS and flags so
//! every connection locks the database file the same way.

pub mod pool;
pub mod pragmas;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lore_core::config::StorageConfig;
use lore_core::errors::StorageError;
use rusqlite::Connection;

use crate::adapter::{self, BackendKind, Capabilities};
use crate::to_storage_err;

use self::pool::ReadPool;

/// Manages the single write connection and the read connection pool
/// for one database file.
pub struct DatabaseManager {
    writer: Mutex<Connection>,
    readers: Option<ReadPool>,
    kind: BackendKind,
    capabilities: Capabilities,
    path: Option<PathBuf>,
}

impl DatabaseManager {
    /// Open a database at `path` through the tiered backend ladder.
    ///
    /// The probe connection becomes the writer. A passive WAL
    /// checkpoint runs after open so a previous process's log pages
    /// fold back without blocking concurrent readers.
    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::SqliteError {
                    message: format!("create database directory: {e}"),
                })?;
            }
        }

        let selected = adapter::select_backend(path, config)?;
        if selected.kind == BackendKind::Wal {
            pragmas::passive_checkpoint(&selected.connection)?;
        }

        let readers = ReadPool::open(path, selected.kind, config.effective_read_pool_size())?;

        Ok(Self {
            writer: Mutex::new(selected.connection),
            readers: Some(readers),
            kind: selected.kind,
            capabilities: selected.capabilities,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database. Reads route through the writer,
    /// since a second connection would see a different database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(to_storage_err)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(to_storage_err)?;
        let capabilities = adapter::probe_capabilities(&conn);

        Ok(Self {
            writer: Mutex::new(conn),
            readers: None,
            kind: BackendKind::Wal,
            capabilities,
            path: None,
        })
    }

    /// Execute a write operation on the serialized writer connection.
    pub fn with_writer<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self.writer.lock().map_err(|_| StorageError::SqliteError {
            message: "write lock poisoned".to_string(),
        })?;
        f(&guard)
    }

    /// Execute a read operation on a pooled read connection.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        match &self.readers {
            Some(pool) => pool.with_conn(f),
            None => self.with_writer(f),
        }
    }

    /// Run `f` inside a BEGIN IMMEDIATE transaction on the writer.
    pub fn immediate_transaction<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.with_writer(|conn| writer::with_immediate_transaction(conn, f))
    }

    /// Fold WAL pages back into the main file without blocking readers.
    pub fn checkpoint(&self) -> Result<(), StorageError> {
        if self.kind != BackendKind::Wal || self.path.is_none() {
            return Ok(());
        }
        self.with_writer(pragmas::passive_checkpoint)
    }

    /// Selected backend tier.
    pub fn backend(&self) -> BackendKind {
        self.kind
    }

    /// Probed capabilities of the selected backend.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Database file path (`None` for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clean shutdown: checkpoint and run the query-planner
    /// maintenance pass. The connections close on drop.
    pub fn close(self) {
        if let Err(e) = self.checkpoint() {
            tracing::warn!(error = %e, "checkpoint on close failed");
        }
        if let Ok(conn) = self.writer.lock() {
            pragmas::optimize_on_close(&conn);
        }
    }
}
