//! File-watcher tests: debounced event delivery and the end-to-end
//! reconcile path from an external file write into the row store.

use lore_core::config::{LoreConfig, WatcherConfig};
use lore_core::pattern::{Pattern, PatternType};
use lore_storage::pattern_files;
use lore_storage::repository::PatternStore;
use lore_storage::watcher::{PatternWatcher, WatchEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn fast_watcher_config() -> WatcherConfig {
    WatcherConfig {
        poll_interval_ms: Some(20),
        debounce_ms: Some(50),
    }
}

fn sample(id: &str) -> Pattern {
    let mut p = Pattern::new(id, PatternType::CodePattern, "Watched", "arrived via the watcher");
    p.tags = vec!["watched".into()];
    p
}

fn recv_event(watcher: &PatternWatcher) -> WatchEvent {
    watcher
        .events()
        .recv_timeout(Duration::from_secs(5))
        .expect("watcher event within the deadline")
}

/// Poll `f` until it returns true or the deadline passes.
fn wait_until(deadline: Duration, mut f: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    false
}

// ═══════════════════════════════════════════════════════════════════════════
// EVENT DELIVERY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn emits_created_modified_and_removed() {
    let dir = tempdir().unwrap();
    let watcher = PatternWatcher::spawn(dir.path().to_path_buf(), &fast_watcher_config());

    let file = dir.path().join("PAT-a.yaml");
    std::fs::write(&file, "id: PAT:a").unwrap();
    assert_eq!(recv_event(&watcher), WatchEvent::Created(file.clone()));

    // Settle past the debounce before the next change.
    std::thread::sleep(Duration::from_millis(120));
    std::fs::write(&file, "id: PAT:a\ntitle: t").unwrap();
    assert_eq!(recv_event(&watcher), WatchEvent::Modified(file.clone()));

    std::thread::sleep(Duration::from_millis(120));
    std::fs::remove_file(&file).unwrap();
    assert_eq!(recv_event(&watcher), WatchEvent::Removed(file));
}

#[test]
fn preexisting_files_produce_no_events() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("old.yaml"), "id: PAT:old").unwrap();

    let watcher = PatternWatcher::spawn(dir.path().to_path_buf(), &fast_watcher_config());
    let got = watcher.events().recv_timeout(Duration::from_millis(300));
    assert!(got.is_err());
}

#[test]
fn rapid_writes_coalesce_into_one_event() {
    let dir = tempdir().unwrap();
    let watcher = PatternWatcher::spawn(dir.path().to_path_buf(), &fast_watcher_config());

    let file = dir.path().join("PAT-a.yaml");
    for i in 0..5 {
        std::fs::write(&file, format!("id: PAT:a\nrev: {i}")).unwrap();
        std::thread::sleep(Duration::from_millis(10));
    }

    // One coalesced Created for the whole burst.
    assert_eq!(recv_event(&watcher), WatchEvent::Created(file));
    let extra = watcher.events().recv_timeout(Duration::from_millis(300));
    assert!(extra.is_err(), "burst must coalesce, got {extra:?}");
}

#[test]
fn create_then_remove_within_the_window_never_surfaces_the_create() {
    let dir = tempdir().unwrap();
    let watcher = PatternWatcher::spawn(dir.path().to_path_buf(), &fast_watcher_config());

    let file = dir.path().join("PAT-blip.yaml");
    std::fs::write(&file, "id: PAT:blip").unwrap();
    std::thread::sleep(Duration::from_millis(30));
    std::fs::remove_file(&file).unwrap();

    // Depending on poll alignment the blip is either unobserved or
    // coalesces to a single Removed; a Created must never escape.
    match watcher.events().recv_timeout(Duration::from_millis(400)) {
        Err(_) => {}
        Ok(WatchEvent::Removed(p)) => assert_eq!(p, file),
        Ok(other) => panic!("blip must not surface as {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// END-TO-END RECONCILE
// ═══════════════════════════════════════════════════════════════════════════

fn open_watched_store(dir: &std::path::Path) -> (Arc<PatternStore>, lore_storage::repository::WatcherTask) {
    let mut cfg = LoreConfig::default();
    cfg.watcher = fast_watcher_config();
    let store = Arc::new(
        PatternStore::open_with_paths(&cfg, &dir.join("lore.db"), &dir.join("patterns")).unwrap(),
    );
    let task = store.start_watcher(&cfg);
    (store, task)
}

#[test]
fn external_file_write_lands_in_the_row_store() {
    let dir = tempdir().unwrap();
    let (store, _task) = open_watched_store(dir.path());

    let mut external = sample("PAT:ext");
    external.refresh_digest();
    pattern_files::write_pattern_file(store.pattern_dir(), &external).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        store.get("PAT:ext").ok().flatten().is_some()
    }));
    let loaded = store.get("PAT:ext").unwrap().unwrap();
    assert_eq!(loaded.title, "Watched");
}

#[test]
fn external_file_removal_deletes_the_row() {
    let dir = tempdir().unwrap();
    let (store, _task) = open_watched_store(dir.path());

    store.create(sample("PAT:ext")).unwrap();
    // Settle so the store's own write is absorbed as baseline churn.
    std::thread::sleep(Duration::from_millis(200));

    std::fs::remove_file(pattern_files::path_for(store.pattern_dir(), "PAT:ext")).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        store.get("PAT:ext").ok().flatten().is_none()
    }));
}

#[test]
fn broken_external_file_quarantines_instead_of_deleting() {
    let dir = tempdir().unwrap();
    let (store, _task) = open_watched_store(dir.path());

    store.create(sample("PAT:ext")).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    // Blank the summary: parseable but structurally invalid.
    let path = pattern_files::path_for(store.pattern_dir(), "PAT:ext");
    std::fs::write(&path, "id: \"PAT:ext\"\npattern_type: code_pattern\ntitle: Watched\nsummary: \"\"\n").unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        store
            .get_for_audit("PAT:ext")
            .ok()
            .flatten()
            .map(|p| !p.valid)
            .unwrap_or(false)
    }));
    assert!(store.get("PAT:ext").unwrap().is_none());
}
