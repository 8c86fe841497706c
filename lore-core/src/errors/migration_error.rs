//! Migration-runner and migration-lock errors.

use super::StorageError;

/// Errors raised while applying schema migrations or coordinating
/// the cross-process migration lock.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration failed at version {version}: {reason}")]
    Failed { version: u32, reason: String },

    /// Stored checksum disagrees with the loaded migration's checksum.
    /// Never auto-resolved.
    #[error("migration {version} content changed after being applied (stored {stored}, loaded {loaded})")]
    ChecksumMismatch {
        version: u32,
        stored: String,
        loaded: String,
    },

    /// Registry versions are not strictly sequential.
    #[error("migration version gap: expected {expected}, found {found}")]
    VersionGap { expected: u32, found: u32 },

    /// The database records a version this build does not know about.
    #[error("database is at unknown migration version {version}")]
    UnknownVersion { version: u32 },

    #[error("timed out after {waited_ms}ms waiting for migration lock held by pid {holder_pid} on {holder_host}")]
    LockTimeout {
        holder_pid: u32,
        holder_host: String,
        waited_ms: u64,
    },

    #[error("migration lock I/O error at {path}: {message}")]
    LockIo { path: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
