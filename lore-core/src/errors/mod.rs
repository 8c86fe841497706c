//! Error handling for Lore.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod migration_error;
pub mod pattern_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use migration_error::MigrationError;
pub use pattern_error::PatternError;
pub use storage_error::StorageError;
