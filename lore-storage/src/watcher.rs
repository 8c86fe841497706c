//! Pattern-directory watcher.
//!
//! A dedicated polling thread scans the directory, diffs modification
//! times against the previous pass, and delivers created / modified /
//! removed events through a bounded channel. Events are debounced per
//! path: a path must stay quiet for the debounce window before its
//! coalesced event goes out, which absorbs editors that write through
//! temp-file-and-rename bursts. The watcher never blocks its callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use lore_core::config::WatcherConfig;

use crate::pattern_files::scan_pattern_dir;

const CHANNEL_CAPACITY: usize = 1024;

/// A debounced file-system change under the pattern directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Removed(p) => p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Created,
    Modified,
    Removed,
}

/// Handle over the watcher thread. Dropping it stops and joins the
/// thread.
pub struct PatternWatcher {
    events: Receiver<WatchEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PatternWatcher {
    /// Start watching `dir`. The first scan establishes the baseline;
    /// files already present produce no events.
    pub fn spawn(dir: PathBuf, config: &WatcherConfig) -> Self {
        let poll = Duration::from_millis(config.effective_poll_interval_ms());
        let debounce = Duration::from_millis(config.effective_debounce_ms());
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("lore-watcher".to_string())
            .spawn(move || watch_loop(dir, poll, debounce, tx, stop_flag))
            .ok();
        if handle.is_none() {
            tracing::warn!("could not spawn watcher thread; file changes will not be observed");
        }

        Self {
            events: rx,
            stop,
            handle,
        }
    }

    /// The debounced event stream.
    pub fn events(&self) -> &Receiver<WatchEvent> {
        &self.events
    }

    /// Signal the thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PatternWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    dir: PathBuf,
    poll: Duration,
    debounce: Duration,
    tx: Sender<WatchEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut known: HashMap<PathBuf, SystemTime> = snapshot(&dir);
    let mut pending: HashMap<PathBuf, (Kind, Instant)> = HashMap::new();

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(poll);
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let current = snapshot(&dir);
        let now = Instant::now();

        for (path, mtime) in &current {
            match known.get(path) {
                None => note(&mut pending, path.clone(), Kind::Created, now),
                Some(old) if old != mtime => {
                    note(&mut pending, path.clone(), Kind::Modified, now)
                }
                Some(_) => {}
            }
        }
        for path in known.keys() {
            if !current.contains_key(path) {
                note(&mut pending, path.clone(), Kind::Removed, now);
            }
        }
        known = current;

        // Deliver everything that stayed quiet through the window.
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, (_, last))| now.duration_since(*last) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ready {
            if let Some((kind, _)) = pending.remove(&path) {
                let event = match kind {
                    Kind::Created => WatchEvent::Created(path),
                    Kind::Modified => WatchEvent::Modified(path),
                    Kind::Removed => WatchEvent::Removed(path),
                };
                match tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        tracing::warn!(path = %event.path().display(), "watcher queue full; dropping event");
                    }
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
        }
    }
}

/// Coalesce a new observation into the pending entry for a path.
fn note(pending: &mut HashMap<PathBuf, (Kind, Instant)>, path: PathBuf, kind: Kind, now: Instant) {
    let merged = match (pending.get(&path).map(|(k, _)| *k), kind) {
        // A create followed by rapid edits is still a create.
        (Some(Kind::Created), Kind::Modified) => Kind::Created,
        // Removed and re-created within the window: one modify.
        (Some(Kind::Removed), Kind::Created) => Kind::Modified,
        _ => kind,
    };
    pending.insert(path, (merged, now));
}

fn snapshot(dir: &PathBuf) -> HashMap<PathBuf, SystemTime> {
    let mut map = HashMap::new();
    match scan_pattern_dir(dir) {
        Ok(paths) => {
            for path in paths {
                if let Ok(meta) = std::fs::metadata(&path) {
                    if let Ok(mtime) = meta.modified() {
                        map.insert(path, mtime);
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "watcher scan failed");
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalescing_rules() {
        let now = Instant::now();
        let mut pending = HashMap::new();
        let p = PathBuf::from("a.yaml");

        note(&mut pending, p.clone(), Kind::Created, now);
        note(&mut pending, p.clone(), Kind::Modified, now);
        assert_eq!(pending[&p].0, Kind::Created);

        note(&mut pending, p.clone(), Kind::Removed, now);
        assert_eq!(pending[&p].0, Kind::Removed);

        note(&mut pending, p.clone(), Kind::Created, now);
        assert_eq!(pending[&p].0, Kind::Modified);
    }
}
