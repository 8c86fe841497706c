//! Pattern repository errors.

use super::{ConfigError, MigrationError, StorageError};

/// Errors raised by pattern repository operations.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("pattern not found: {id}")]
    NotFound { id: String },

    #[error("pattern already exists: {id}")]
    AlreadyExists { id: String },

    #[error("alias '{alias}' is already taken")]
    AliasTaken { alias: String },

    /// Structural validation failed on a direct write. Files discovered
    /// on disk with the same problem are quarantined instead.
    #[error("invalid pattern {id}: {reason}")]
    Invalid { id: String, reason: String },

    #[error("pattern file I/O error at {path}: {message}")]
    FileIo { path: String, message: String },

    #[error("pattern file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
