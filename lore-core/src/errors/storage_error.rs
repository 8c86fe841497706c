//! Storage-layer errors for the engine adapter and connection management.

/// Errors raised by the SQLite adapter layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    /// Transient write contention (SQLITE_BUSY / SQLITE_LOCKED).
    /// Recoverable by the retry wrapper; callers normally never see it raw.
    #[error("storage busy: {message}")]
    Busy { message: String },

    /// Retries exhausted on a busy/locked condition.
    #[error("storage busy after {attempts} attempts: {message}")]
    BusyExhausted { attempts: u32, message: String },

    /// Constraint violation (unique index, foreign key).
    #[error("constraint violation: {message}")]
    Constraint { message: String },

    /// Every backend tier failed its probe. Carries one line per tier.
    #[error("no usable SQLite backend: {details}")]
    BackendUnavailable { details: String },
}

impl StorageError {
    /// Whether this error represents transient write contention.
    pub fn is_busy(&self) -> bool {
        matches!(self, StorageError::Busy { .. })
    }
}
