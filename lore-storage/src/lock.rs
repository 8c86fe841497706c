//! Cross-process migration lock.
//!
//! A pid file sibling to the database (`<db>.migrate.lock`) acquired
//! with an atomic create-if-absent write. Competitors poll with
//! exponential backoff up to a bounded wait, reclaiming locks whose
//! holder process is dead or whose age exceeds the stale threshold.
//!
//! Release is guaranteed by a `Drop` guard; while held, an interrupt
//! handler removes the file so a Ctrl-C during migration does not
//! leave competitors waiting out the staleness window.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use lore_core::errors::MigrationError;
use lore_core::pattern::now_epoch;
use serde::{Deserialize, Serialize};

const LOCK_SUFFIX: &str = "migrate.lock";

/// Defaults for acquisition waiting and staleness.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_MAX: Duration = Duration::from_millis(800);

/// Structured lock-file body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: i64,
}

/// Lock path by convention: `<database path>.migrate.lock`.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".");
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

// The interrupt handler can only be installed once per process, so it
// reads every currently-held lock path from this list. One process can
// hold locks for several databases at once.
static HELD_LOCKS: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();

fn held_paths() -> &'static Mutex<Vec<PathBuf>> {
    HELD_LOCKS.get_or_init(|| Mutex::new(Vec::new()))
}

fn install_signal_hook() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let result = ctrlc::set_handler(|| {
            if let Ok(paths) = held_paths().lock() {
                for path in paths.iter() {
                    let _ = std::fs::remove_file(path);
                }
            }
            std::process::exit(130);
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not install migration-lock signal hook");
        }
    });
}

fn hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        return name.trim().to_string();
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // No portable liveness probe; fall back to age-only staleness.
    true
}

/// RAII guard over the held lock. Dropping it removes the file and
/// clears the signal-hook slot.
#[derive(Debug)]
pub struct MigrationLock {
    path: PathBuf,
    released: bool,
}

impl MigrationLock {
    /// Acquire the lock for `db_path` with default wait and staleness.
    pub fn acquire(db_path: &Path) -> Result<Self, MigrationError> {
        Self::acquire_with(db_path, DEFAULT_WAIT, DEFAULT_STALE_AFTER)
    }

    /// Acquire with explicit bounds. Polls with exponential backoff;
    /// a stale holder (dead pid, or older than `stale_after`) is
    /// reclaimed by deleting its file and retrying immediately.
    pub fn acquire_with(
        db_path: &Path,
        wait: Duration,
        stale_after: Duration,
    ) -> Result<Self, MigrationError> {
        let path = lock_path_for(db_path);
        let started = Instant::now();
        let mut backoff = BACKOFF_BASE;

        loop {
            match try_create(&path) {
                Ok(()) => {
                    install_signal_hook();
                    if let Ok(mut paths) = held_paths().lock() {
                        paths.push(path.clone());
                    }
                    tracing::debug!(path = %path.display(), "acquired migration lock");
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(CreateError::Contended) => {
                    let body = std::fs::read_to_string(&path).ok();
                    let holder = body
                        .as_deref()
                        .and_then(|b| serde_json::from_str::<LockHolder>(b).ok());
                    match (&body, &holder) {
                        (Some(observed), Some(h)) if is_stale(h, stale_after) => {
                            tracing::warn!(
                                holder_pid = h.pid,
                                holder_host = %h.hostname,
                                "reclaiming stale migration lock"
                            );
                            reclaim_if_unchanged(&path, observed);
                            continue;
                        }
                        (Some(observed), None) if file_older_than(&path, stale_after) => {
                            // Unparseable body that has also aged out
                            // by mtime: garbage, not a mid-write race.
                            reclaim_if_unchanged(&path, observed);
                            continue;
                        }
                        _ => {}
                    }

                    if started.elapsed() >= wait {
                        let (holder_pid, holder_host) = holder
                            .map(|h| (h.pid, h.hostname))
                            .unwrap_or((0, "unknown".to_string()));
                        return Err(MigrationError::LockTimeout {
                            holder_pid,
                            holder_host,
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }

                    std::thread::sleep(backoff.min(wait.saturating_sub(started.elapsed())));
                    backoff = (backoff * 2).min(BACKOFF_MAX);
                }
                Err(CreateError::Io(message)) => {
                    return Err(MigrationError::LockIo {
                        path: path.display().to_string(),
                        message,
                    });
                }
            }
        }
    }

    /// Current holder metadata, if the lock file is readable.
    pub fn holder(db_path: &Path) -> Option<LockHolder> {
        read_holder(&lock_path_for(db_path))
    }

    /// Release explicitly. Also happens on drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Ok(mut paths) = held_paths().lock() {
            if let Some(idx) = paths.iter().position(|p| p == &self.path) {
                paths.remove(idx);
            }
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove migration lock");
            }
        } else {
            tracing::debug!(path = %self.path.display(), "released migration lock");
        }
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

enum CreateError {
    Contended,
    Io(String),
}

fn try_create(path: &Path) -> Result<(), CreateError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(CreateError::Contended)
        }
        Err(e) => return Err(CreateError::Io(e.to_string())),
    };

    let holder = LockHolder {
        pid: std::process::id(),
        hostname: hostname(),
        acquired_at: now_epoch(),
    };
    let body = serde_json::to_string(&holder).map_err(|e| CreateError::Io(e.to_string()))?;
    file.write_all(body.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| CreateError::Io(e.to_string()))
}

/// Delete the lock file only if its body still matches what the
/// staleness judgement was based on. A competitor that re-acquired the
/// lock between the read and the remove keeps its fresh file.
fn reclaim_if_unchanged(path: &Path, observed: &str) {
    let unchanged = std::fs::read_to_string(path)
        .map(|now| now == observed)
        .unwrap_or(false);
    if unchanged {
        let _ = std::fs::remove_file(path);
    }
}

fn read_holder(path: &Path) -> Option<LockHolder> {
    let body = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&body).ok()
}

fn is_stale(holder: &LockHolder, stale_after: Duration) -> bool {
    let same_host = holder.hostname == hostname();
    if same_host && !process_alive(holder.pid) {
        return true;
    }
    let age = now_epoch().saturating_sub(holder.acquired_at);
    age >= 0 && age as u64 >= stale_after.as_secs()
}

fn file_older_than(path: &Path, threshold: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .map(|age| age >= threshold)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_derives_from_database_path() {
        let p = lock_path_for(Path::new("/data/lore.db"));
        assert_eq!(p, PathBuf::from("/data/lore.db.migrate.lock"));
    }

    #[test]
    fn holder_body_round_trips() {
        let holder = LockHolder {
            pid: 4242,
            hostname: "build-host".to_string(),
            acquired_at: 1_700_000_000,
        };
        let body = serde_json::to_string(&holder).unwrap();
        let back: LockHolder = serde_json::from_str(&body).unwrap();
        assert_eq!(back.pid, 4242);
        assert_eq!(back.hostname, "build-host");
    }

    #[test]
    fn dead_pid_on_this_host_is_stale() {
        let holder = LockHolder {
            pid: u32::MAX - 1, // not a plausible live pid
            hostname: hostname(),
            acquired_at: now_epoch(),
        };
        if cfg!(target_os = "linux") {
            assert!(is_stale(&holder, Duration::from_secs(3600)));
        }
    }

    #[test]
    fn recent_live_holder_is_not_stale() {
        let holder = LockHolder {
            pid: std::process::id(),
            hostname: hostname(),
            acquired_at: now_epoch(),
        };
        assert!(!is_stale(&holder, Duration::from_secs(3600)));
    }

    #[test]
    fn two_held_locks_are_both_tracked_and_released_independently() {
        let dir = tempfile::tempdir().unwrap();
        let db_a = dir.path().join("a.db");
        let db_b = dir.path().join("b.db");

        let lock_a = MigrationLock::acquire(&db_a).unwrap();
        let lock_b = MigrationLock::acquire(&db_b).unwrap();

        {
            let paths = held_paths().lock().unwrap();
            assert!(paths.contains(&lock_path_for(&db_a)));
            assert!(paths.contains(&lock_path_for(&db_b)));
        }

        drop(lock_a);
        {
            let paths = held_paths().lock().unwrap();
            assert!(!paths.contains(&lock_path_for(&db_a)));
            assert!(paths.contains(&lock_path_for(&db_b)));
        }
        assert!(!lock_path_for(&db_a).exists());
        assert!(lock_path_for(&db_b).exists());

        drop(lock_b);
        assert!(!lock_path_for(&db_b).exists());
        assert!(!held_paths().lock().unwrap().contains(&lock_path_for(&db_b)));
    }

    #[test]
    fn reclaim_keeps_a_lock_whose_body_changed_since_the_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lore.db.migrate.lock");

        std::fs::write(&path, "stale body").unwrap();
        let observed = std::fs::read_to_string(&path).unwrap();

        // A competitor swaps in a fresh lock before the removal runs.
        std::fs::write(&path, "fresh body").unwrap();
        reclaim_if_unchanged(&path, &observed);
        assert!(path.exists());

        // With no intervening writer the reclaim goes through.
        let observed = std::fs::read_to_string(&path).unwrap();
        reclaim_if_unchanged(&path, &observed);
        assert!(!path.exists());
    }
}
