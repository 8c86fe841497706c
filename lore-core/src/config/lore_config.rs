//! Top-level Lore configuration with layered resolution.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{CacheConfig, SearchConfig, StorageConfig, WatcherConfig};
use crate::errors::ConfigError;

/// Backend tiers accepted by the `LORE_SQLITE_BACKEND` override.
pub const BACKEND_NAMES: &[&str] = &["wal", "rollback", "dotfile"];

/// Top-level configuration aggregating all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. Environment variables (`LORE_*`)
/// 2. Project config (`lore.toml` in project root)
/// 3. User config (`~/.lore/config.toml`)
/// 4. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoreConfig {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub watcher: WatcherConfig,
    pub search: SearchConfig,
}

impl LoreConfig {
    /// Load configuration with layered resolution.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Layer 3 (lowest file priority): user config
        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                match Self::merge_toml_file(&mut config, &user_config_path) {
                    Ok(()) => {}
                    Err(ConfigError::ParseError { .. }) => {
                        return Err(ConfigError::ParseError {
                            path: user_config_path.display().to_string(),
                            message: "invalid TOML in user config".to_string(),
                        });
                    }
                    Err(_) => {
                        // Non-parse errors from user config are not fatal.
                        // Continue with defaults.
                    }
                }
            }
        }

        // Layer 2: project config
        let project_config_path = root.join("lore.toml");
        if project_config_path.exists() {
            Self::merge_toml_file(&mut config, &project_config_path)?;
        }

        // Layer 1 (highest priority): environment variables
        Self::apply_env_overrides(&mut config);

        Self::validate(&config)?;

        Ok(config)
    }

    /// Load configuration from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Validate the configuration values.
    pub fn validate(config: &LoreConfig) -> Result<(), ConfigError> {
        if let Some(size) = config.storage.read_pool_size {
            if size == 0 || size > 8 {
                return Err(ConfigError::ValidationFailed {
                    field: "storage.read_pool_size".to_string(),
                    message: "must be between 1 and 8".to_string(),
                });
            }
        }
        if let Some(kib) = config.storage.cache_size_kib {
            if kib <= 0 {
                return Err(ConfigError::ValidationFailed {
                    field: "storage.cache_size_kib".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }
        if let Some(attempts) = config.storage.retry_max_attempts {
            if attempts == 0 {
                return Err(ConfigError::ValidationFailed {
                    field: "storage.retry_max_attempts".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        if let Some(ref backend) = config.storage.backend {
            if !BACKEND_NAMES.contains(&backend.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    field: "storage.backend".to_string(),
                    message: format!("must be one of {BACKEND_NAMES:?}"),
                });
            }
        }
        if let Some(ttl) = config.cache.ttl_seconds {
            if ttl == 0 {
                return Err(ConfigError::ValidationFailed {
                    field: "cache.ttl_seconds".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }
        if let Some(poll) = config.watcher.poll_interval_ms {
            if poll == 0 {
                return Err(ConfigError::ValidationFailed {
                    field: "watcher.poll_interval_ms".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns the user config path: `~/.lore/config.toml`.
    fn user_config_path() -> Option<std::path::PathBuf> {
        dirs_path().map(|d| d.join("config.toml"))
    }

    /// Merge a TOML file into the existing config.
    /// Unknown keys are silently ignored (forward-compatible).
    fn merge_toml_file(config: &mut LoreConfig, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let file_config: LoreConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Self::merge(config, &file_config);
        Ok(())
    }

    /// Merge `other` into `base`, where `other` values override `base` values
    /// only when `other` has a `Some` value.
    fn merge(base: &mut LoreConfig, other: &LoreConfig) {
        // Storage
        if other.storage.database_path.is_some() {
            base.storage.database_path = other.storage.database_path.clone();
        }
        if other.storage.pattern_dir.is_some() {
            base.storage.pattern_dir = other.storage.pattern_dir.clone();
        }
        if other.storage.backend.is_some() {
            base.storage.backend = other.storage.backend.clone();
        }
        if other.storage.read_pool_size.is_some() {
            base.storage.read_pool_size = other.storage.read_pool_size;
        }
        if other.storage.cache_size_kib.is_some() {
            base.storage.cache_size_kib = other.storage.cache_size_kib;
        }
        if other.storage.busy_timeout_ms.is_some() {
            base.storage.busy_timeout_ms = other.storage.busy_timeout_ms;
        }
        if other.storage.retry_max_attempts.is_some() {
            base.storage.retry_max_attempts = other.storage.retry_max_attempts;
        }
        if other.storage.retry_base_delay_ms.is_some() {
            base.storage.retry_base_delay_ms = other.storage.retry_base_delay_ms;
        }

        // Cache
        if other.cache.pattern_capacity.is_some() {
            base.cache.pattern_capacity = other.cache.pattern_capacity;
        }
        if other.cache.facet_capacity.is_some() {
            base.cache.facet_capacity = other.cache.facet_capacity;
        }
        if other.cache.snippet_capacity.is_some() {
            base.cache.snippet_capacity = other.cache.snippet_capacity;
        }
        if other.cache.ttl_seconds.is_some() {
            base.cache.ttl_seconds = other.cache.ttl_seconds;
        }

        // Watcher
        if other.watcher.poll_interval_ms.is_some() {
            base.watcher.poll_interval_ms = other.watcher.poll_interval_ms;
        }
        if other.watcher.debounce_ms.is_some() {
            base.watcher.debounce_ms = other.watcher.debounce_ms;
        }

        // Search
        if other.search.slow_sync_warn_ms.is_some() {
            base.search.slow_sync_warn_ms = other.search.slow_sync_warn_ms;
        }
    }

    /// Apply environment variable overrides.
    ///
    /// `LORE_SQLITE_BACKEND` forces a backend tier; values outside the
    /// fixed set produce a warning and fall back to auto-detection.
    /// `LORE_CACHE_KIB` overrides the page cache size.
    fn apply_env_overrides(config: &mut LoreConfig) {
        if let Ok(val) = std::env::var("LORE_SQLITE_BACKEND") {
            let normalized = val.trim().to_ascii_lowercase();
            if BACKEND_NAMES.contains(&normalized.as_str()) {
                config.storage.backend = Some(normalized);
            } else {
                tracing::warn!(
                    value = %val,
                    allowed = ?BACKEND_NAMES,
                    "invalid LORE_SQLITE_BACKEND; falling back to auto-detection"
                );
            }
        }
        if let Ok(val) = std::env::var("LORE_CACHE_KIB") {
            if let Ok(v) = val.parse::<i64>() {
                if v > 0 {
                    config.storage.cache_size_kib = Some(v);
                }
            }
        }
        if let Ok(val) = std::env::var("LORE_BUSY_TIMEOUT_MS") {
            if let Ok(v) = val.parse::<u64>() {
                config.storage.busy_timeout_ms = Some(v);
            }
        }
    }

    /// Serialize the config back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            path: "<serialization>".to_string(),
            message: e.to_string(),
        })
    }
}

/// Returns the user-level lore config directory: `~/.lore/`.
fn dirs_path() -> Option<std::path::PathBuf> {
    home_dir().map(|h| h.join(".lore"))
}

/// Cross-platform home directory resolution.
fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(std::path::PathBuf::from)
}
