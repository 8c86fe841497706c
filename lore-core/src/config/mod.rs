//! Configuration system for Lore.
//! TOML-based, layered resolution: env > project > user > defaults.

pub mod cache_config;
pub mod lore_config;
pub mod search_config;
pub mod storage_config;
pub mod watcher_config;

pub use cache_config::CacheConfig;
pub use lore_config::LoreConfig;
pub use search_config::SearchConfig;
pub use storage_config::StorageConfig;
pub use watcher_config::WatcherConfig;

use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// Resolve the database path for a caller.
///
/// Server-integration callers must pass an absolute path; a relative path
/// in that mode is a fatal configuration error. Other callers may use a
/// relative path, which is resolved against the working directory with a
/// warning.
pub fn resolve_database_path(path: &Path, server_mode: bool) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    if server_mode {
        return Err(ConfigError::RelativePath {
            path: path.display().to_string(),
        });
    }
    tracing::warn!(path = %path.display(), "relative database path; resolving against working directory");
    match std::env::current_dir() {
        Ok(cwd) => Ok(cwd.join(path)),
        Err(_) => Ok(path.to_path_buf()),
    }
}
