//! Tiered SQLite backend selection.
//!
//! Three provisioning profiles of the embedded engine, attempted in
//! strict order at startup. Each tier proves itself by opening and
//! exercising a real connection, never by presence checks:
//!
//! 1. `wal` — write-ahead-log journaling, best concurrency. Requires a
//!    minimum library version and a filesystem where WAL shared memory
//!    actually engages.
//! 2. `rollback` — classic rollback-journal profile for filesystems
//!    where WAL cannot.
//! 3. `dotfile` — dot-lockfile VFS for filesystems without POSIX
//!    advisory locks. Last resort, selected with a performance warning.

pub mod probes;
pub mod profiles;

pub use probes::probe_capabilities;
pub use profiles::{DotfileBackend, RollbackBackend, WalBackend};

use std::path::Path;

use lore_core::config::StorageConfig;
use lore_core::errors::StorageError;
use rusqlite::Connection;

/// The backend tiers, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Wal,
    Rollback,
    Dotfile,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Rollback => "rollback",
            Self::Dotfile => "dotfile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wal" => Some(Self::Wal),
            "rollback" => Some(Self::Rollback),
            "dotfile" => Some(Self::Dotfile),
            _ => None,
        }
    }
}

/// What the selected backend actually supports, probed by exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Change-triggers fire reliably (builds with OMIT_TRIGGER exist).
    pub change_triggers: bool,
    /// The FTS5 module round-trips (not compiled into every build).
    pub fts5: bool,
}

/// A concrete provisioning profile of the embedded engine.
///
/// `probe` must open a real connection and exercise it; `capabilities`
/// must answer honestly for that connection rather than assuming what
/// the tier usually supports.
pub trait BackendProfile {
    fn kind(&self) -> BackendKind;

    /// Open a write connection at `path`, apply the profile's pragmas,
    /// and prove the profile works by round-tripping a statement.
    fn probe(&self, path: &Path, config: &StorageConfig) -> Result<Connection, StorageError>;

    /// Open a read-only connection with the profile's VFS and flags.
    fn open_reader(&self, path: &Path) -> Result<Connection, StorageError>;

    /// Probe what this connection actually supports.
    fn capabilities(&self, conn: &Connection) -> Capabilities;
}

/// The outcome of backend selection: the tier, its probed capabilities,
/// and the already-open write connection the probe exercised.
pub struct SelectedBackend {
    pub kind: BackendKind,
    pub capabilities: Capabilities,
    pub connection: Connection,
}

fn profile_for(kind: BackendKind) -> Box<dyn BackendProfile> {
    match kind {
        BackendKind::Wal => Box::new(WalBackend),
        BackendKind::Rollback => Box::new(RollbackBackend),
        BackendKind::Dotfile => Box::new(DotfileBackend),
    }
}

/// Attempt the backend tiers in strict order and return the first that
/// proves itself. A forced tier (from config or `LORE_SQLITE_BACKEND`)
/// restricts the ladder to that single tier.
///
/// When every tier fails, the error aggregates each tier's reason.
pub fn select_backend(
    path: &Path,
    config: &StorageConfig,
) -> Result<SelectedBackend, StorageError> {
    let forced = config.backend.as_deref().and_then(BackendKind::parse);

    let ladder: Vec<BackendKind> = match forced {
        Some(kind) => vec![kind],
        None => vec![BackendKind::Wal, BackendKind::Rollback, BackendKind::Dotfile],
    };

    let mut failures = Vec::new();
    for kind in ladder {
        let profile = profile_for(kind);
        match profile.probe(path, config) {
            Ok(conn) => {
                let capabilities = profile.capabilities(&conn);
                tracing::info!(
                    backend = kind.as_str(),
                    change_triggers = capabilities.change_triggers,
                    fts5 = capabilities.fts5,
                    forced = forced.is_some(),
                    "selected SQLite backend"
                );
                if kind == BackendKind::Dotfile {
                    tracing::warn!(
                        "dot-lockfile VFS selected; expect reduced concurrent performance"
                    );
                }
                return Ok(SelectedBackend {
                    kind,
                    capabilities,
                    connection: conn,
                });
            }
            Err(e) => {
                tracing::warn!(backend = kind.as_str(), error = %e, "backend probe failed");
                failures.push(format!("{}: {}", kind.as_str(), e));
            }
        }
    }

    Err(StorageError::BackendUnavailable {
        details: failures.join("; "),
    })
}

/// Open a read-only connection matching an already-selected tier.
pub fn open_read_connection(kind: BackendKind, path: &Path) -> Result<Connection, StorageError> {
    profile_for(kind).open_reader(path)
}
