//! ReadPool — round-robin read-only connections.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use lore_core::errors::StorageError;
use rusqlite::Connection;

use crate::adapter::{self, BackendKind};

const MAX_POOL_SIZE: usize = 8;

/// A pool of read-only SQLite connections with round-robin selection.
///
/// Connections open with the VFS and flags of the selected backend
/// tier so readers lock the file the same way the writer does.
pub struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    /// Open a pool of read-only connections to the given database path.
    pub fn open(path: &Path, kind: BackendKind, pool_size: usize) -> Result<Self, StorageError> {
        let size = pool_size.clamp(1, MAX_POOL_SIZE);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            connections.push(Mutex::new(adapter::open_read_connection(kind, path)?));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Execute a closure with a read connection (round-robin).
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let guard = self.connections[idx]
            .lock()
            .map_err(|_| StorageError::SqliteError {
                message: "read pool lock poisoned".to_string(),
            })?;
        f(&guard)
    }

    /// Number of connections in the pool.
    pub fn size(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t(x INTEGER);")
            .unwrap();

        let pool = ReadPool::open(&path, BackendKind::Wal, 99).unwrap();
        assert_eq!(pool.size(), MAX_POOL_SIZE);

        let pool = ReadPool::open(&path, BackendKind::Wal, 0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn pooled_connections_are_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t(x INTEGER); INSERT INTO t(x) VALUES (5);")
            .unwrap();

        let pool = ReadPool::open(&path, BackendKind::Wal, 2).unwrap();
        let v: i64 = pool
            .with_conn(|conn| {
                conn.query_row("SELECT x FROM t", [], |row| row.get(0))
                    .map_err(crate::to_storage_err)
            })
            .unwrap();
        assert_eq!(v, 5);

        let write = pool.with_conn(|conn| {
            conn.execute("INSERT INTO t(x) VALUES (6)", [])
                .map_err(crate::to_storage_err)
        });
        assert!(write.is_err());
    }
}
