//! The three backend provisioning profiles.

use std::path::Path;

use lore_core::config::StorageConfig;
use lore_core::errors::StorageError;
use rusqlite::{Connection, OpenFlags};

use super::{probes, BackendKind, BackendProfile, Capabilities};
use crate::connection::pragmas;
use crate::to_storage_err;

/// Minimum library version for the WAL tier (3.35.0).
const MIN_WAL_VERSION: i32 = 3_035_000;

const DOTFILE_VFS: &str = "unix-dotfile";

fn exercise(conn: &Connection, tier: &'static str) -> Result<(), StorageError> {
    match probes::exercise_round_trip(conn) {
        Ok(true) => Ok(()),
        Ok(false) => Err(StorageError::SqliteError {
            message: format!("{tier} probe round-trip returned wrong value"),
        }),
        Err(e) => Err(StorageError::SqliteError {
            message: format!("{tier} probe round-trip failed: {e}"),
        }),
    }
}

fn open_reader_with_flags(path: &Path, vfs: Option<&str>) -> Result<Connection, StorageError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = match vfs {
        Some(vfs) => Connection::open_with_flags_and_vfs(path, flags, vfs),
        None => Connection::open_with_flags(path, flags),
    }
    .map_err(to_storage_err)?;
    pragmas::apply_read_pragmas(&conn)?;
    Ok(conn)
}

/// Tier 1: write-ahead-log journaling.
pub struct WalBackend;

impl BackendProfile for WalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Wal
    }

    fn probe(&self, path: &Path, config: &StorageConfig) -> Result<Connection, StorageError> {
        let version = rusqlite::version_number();
        if version < MIN_WAL_VERSION {
            return Err(StorageError::SqliteError {
                message: format!(
                    "library version {version} below WAL minimum {MIN_WAL_VERSION}"
                ),
            });
        }

        let conn = Connection::open(path).map_err(to_storage_err)?;
        pragmas::apply_pragmas(&conn, BackendKind::Wal, config)?;

        // journal_mode=WAL silently degrades on some filesystems, so
        // read the mode back instead of trusting the pragma.
        let mode = pragmas::journal_mode(&conn)?;
        if !mode.eq_ignore_ascii_case("wal") {
            return Err(StorageError::SqliteError {
                message: format!("journal_mode degraded to '{mode}' instead of wal"),
            });
        }

        exercise(&conn, "wal")?;
        Ok(conn)
    }

    fn open_reader(&self, path: &Path) -> Result<Connection, StorageError> {
        open_reader_with_flags(path, None)
    }

    fn capabilities(&self, conn: &Connection) -> Capabilities {
        probes::probe_capabilities(conn)
    }
}

/// Tier 2: classic rollback-journal profile with full synchronous
/// durability, for filesystems where WAL shared memory cannot engage.
pub struct RollbackBackend;

impl BackendProfile for RollbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Rollback
    }

    fn probe(&self, path: &Path, config: &StorageConfig) -> Result<Connection, StorageError> {
        let conn = Connection::open(path).map_err(to_storage_err)?;
        pragmas::apply_pragmas(&conn, BackendKind::Rollback, config)?;

        let mode = pragmas::journal_mode(&conn)?;
        if !mode.eq_ignore_ascii_case("delete") {
            return Err(StorageError::SqliteError {
                message: format!("journal_mode degraded to '{mode}' instead of delete"),
            });
        }

        exercise(&conn, "rollback")?;
        Ok(conn)
    }

    fn open_reader(&self, path: &Path) -> Result<Connection, StorageError> {
        open_reader_with_flags(path, None)
    }

    fn capabilities(&self, conn: &Connection) -> Capabilities {
        probes::probe_capabilities(conn)
    }
}

/// Tier 3: dot-lockfile VFS for filesystems without POSIX advisory
/// locks (some network mounts). Unix-only.
pub struct DotfileBackend;

impl BackendProfile for DotfileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dotfile
    }

    #[cfg(unix)]
    fn probe(&self, path: &Path, config: &StorageConfig) -> Result<Connection, StorageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags_and_vfs(path, flags, DOTFILE_VFS)
            .map_err(to_storage_err)?;
        pragmas::apply_pragmas(&conn, BackendKind::Dotfile, config)?;
        exercise(&conn, "dotfile")?;
        Ok(conn)
    }

    #[cfg(not(unix))]
    fn probe(&self, _path: &Path, _config: &StorageConfig) -> Result<Connection, StorageError> {
        Err(StorageError::SqliteError {
            message: "unix-dotfile VFS is unavailable on this platform".to_string(),
        })
    }

    #[cfg(unix)]
    fn open_reader(&self, path: &Path) -> Result<Connection, StorageError> {
        open_reader_with_flags(path, Some(DOTFILE_VFS))
    }

    #[cfg(not(unix))]
    fn open_reader(&self, _path: &Path) -> Result<Connection, StorageError> {
        Err(StorageError::SqliteError {
            message: "unix-dotfile VFS is unavailable on this platform".to_string(),
        })
    }

    fn capabilities(&self, conn: &Connection) -> Capabilities {
        probes::probe_capabilities(conn)
    }
}
