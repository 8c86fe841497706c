//! The pattern repository: the store surface higher layers consume.
//!
//! Every pattern is simultaneously a row set (primary table plus facet
//! joins) and a file on disk; this type is the single writer
//! reconciling both. Direct writes and watcher-observed file changes
//! converge on one idempotent `reconcile` path, so the row store ends
//! up consistent with the file tree no matter who wrote the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use lore_core::config::{self, LoreConfig};
use lore_core::errors::{PatternError, StorageError};
use lore_core::pattern::{
    derive_id, now_epoch, validate_pattern, FacetQuery, Pattern, PatternFacets, PatternType,
    Snippet,
};

use crate::cache::PatternCache;
use crate::connection::DatabaseManager;
use crate::lock::MigrationLock;
use crate::migrations;
use crate::pagination::PaginationCursor;
use crate::pattern_files::{self, LoadOutcome};
use crate::queries::{self, LookupPage, StoreStats};
use crate::retry::{with_busy_retry, RetryPolicy};
use crate::search::{SearchMetrics, SearchSync};
use crate::watcher::{PatternWatcher, WatchEvent};

/// Partial update merged onto an existing pattern. `None` fields keep
/// their current value; the id is immutable by construction.
#[derive(Debug, Default, Clone)]
pub struct PatternUpdate {
    pub pattern_type: Option<PatternType>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub problem: Option<String>,
    pub solution: Option<String>,
    pub implementation: Option<String>,
    pub examples: Option<String>,
    /// `Some(None)` clears the alias.
    pub alias: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub facets: Option<PatternFacets>,
    pub snippets: Option<Vec<Snippet>>,
}

/// Per-file outcome of a batch operation (`rebuild`, `validate`).
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub id: String,
    pub status: FileStatus,
}

#[derive(Debug)]
pub enum FileStatus {
    Loaded,
    Quarantined { reason: String },
    Error { message: String },
}

pub struct PatternStore {
    db: DatabaseManager,
    cache: PatternCache,
    search: SearchSync,
    pattern_dir: PathBuf,
    retry: RetryPolicy,
}

impl PatternStore {
    /// Open the store per configuration. Path resolution enforces the
    /// server-mode absolute-path rule before anything touches disk.
    pub fn open(cfg: &LoreConfig, server_mode: bool) -> Result<Self, PatternError> {
        let db_path = config::resolve_database_path(
            Path::new(cfg.storage.effective_database_path()),
            server_mode,
        )?;
        let pattern_dir = PathBuf::from(cfg.storage.effective_pattern_dir());
        Self::open_with_paths(cfg, &db_path, &pattern_dir)
    }

    /// Open against explicit paths, bypassing path resolution.
    pub fn open_with_paths(
        cfg: &LoreConfig,
        db_path: &Path,
        pattern_dir: &Path,
    ) -> Result<Self, PatternError> {
        std::fs::create_dir_all(pattern_dir).map_err(|e| PatternError::FileIo {
            path: pattern_dir.display().to_string(),
            message: e.to_string(),
        })?;

        let db = DatabaseManager::open(db_path, &cfg.storage)?;
        let search = SearchSync::new(db.capabilities(), &cfg.search);

        // Schema changes run under the cross-process lock; the guard
        // releases on every exit path.
        {
            let lock = MigrationLock::acquire(db_path)?;
            let mut migration_error = None;
            let result = db.with_writer(|conn| {
                if let Err(e) = migrations::run(conn) {
                    migration_error = Some(e);
                    return Err(StorageError::SqliteError {
                        message: "migration failed".to_string(),
                    });
                }
                search.ensure_schema(conn)
            });
            lock.release();
            if let Some(e) = migration_error {
                return Err(e.into());
            }
            result?;
        }

        Ok(Self {
            db,
            cache: PatternCache::new(&cfg.cache),
            search,
            pattern_dir: pattern_dir.to_path_buf(),
            retry: RetryPolicy {
                max_attempts: cfg.storage.effective_retry_max_attempts(),
                base_delay: Duration::from_millis(cfg.storage.effective_retry_base_delay_ms()),
            },
        })
    }

    /// Create a new pattern. An empty id is derived from content.
    /// Fails if the id or a requested alias is already taken.
    pub fn create(&self, mut pattern: Pattern) -> Result<Pattern, PatternError> {
        if pattern.id.trim().is_empty() {
            pattern.id = derive_id(&pattern);
        }
        let now = now_epoch();
        if pattern.created_at == 0 {
            pattern.created_at = now;
        }
        pattern.updated_at = now;
        pattern.valid = true;
        pattern.invalid_reason = None;

        self.check_valid(&pattern)?;
        if self
            .db
            .with_reader(|conn| queries::get_pattern(conn, &pattern.id, true))?
            .is_some()
        {
            return Err(PatternError::AlreadyExists {
                id: pattern.id.clone(),
            });
        }
        self.check_alias(&pattern)?;

        pattern.refresh_digest();
        pattern_files::write_pattern_file(&self.pattern_dir, &pattern)?;
        self.persist(&pattern)?;

        self.cache.invalidate_pattern(&pattern.id);
        self.cache.insert_pattern(pattern.clone());
        tracing::debug!(id = %pattern.id, "created pattern");
        Ok(pattern)
    }

    /// Merge an update onto an existing pattern. The update timestamp
    /// always advances, even for back-to-back identical updates.
    pub fn update(&self, id: &str, update: PatternUpdate) -> Result<Pattern, PatternError> {
        let mut pattern = self
            .db
            .with_reader(|conn| queries::get_pattern(conn, id, true))?
            .ok_or_else(|| PatternError::NotFound { id: id.to_string() })?;

        apply_update(&mut pattern, update);
        pattern.updated_at = now_epoch().max(pattern.updated_at + 1);
        pattern.valid = true;
        pattern.invalid_reason = None;

        self.check_valid(&pattern)?;
        self.check_alias(&pattern)?;

        pattern.refresh_digest();
        pattern_files::write_pattern_file(&self.pattern_dir, &pattern)?;
        self.persist(&pattern)?;

        self.cache.invalidate_pattern(id);
        self.cache.insert_pattern(pattern.clone());
        tracing::debug!(id, "updated pattern");
        Ok(pattern)
    }

    /// Delete a pattern: file, row, facet joins (cascade), search
    /// entry, and cached state.
    pub fn delete(&self, id: &str) -> Result<(), PatternError> {
        pattern_files::remove_pattern_file(&self.pattern_dir, id)?;

        let existed = with_busy_retry(self.retry, || {
            self.db.immediate_transaction(|conn| {
                let existed = queries::delete_pattern(conn, id)?;
                if existed {
                    self.search.after_delete(conn, id);
                }
                Ok(existed)
            })
        })?;
        self.cache.invalidate_pattern(id);

        if existed {
            tracing::debug!(id, "deleted pattern");
            Ok(())
        } else {
            Err(PatternError::NotFound { id: id.to_string() })
        }
    }

    /// Cache-first read. Invalid (quarantined) patterns read as
    /// absent here; use [`PatternStore::get_for_audit`] to see them.
    pub fn get(&self, id: &str) -> Result<Option<Pattern>, PatternError> {
        if let Some(hit) = self.cache.get_pattern(id) {
            return Ok(Some(hit));
        }
        let loaded = self
            .db
            .with_reader(|conn| queries::get_pattern(conn, id, false))?;
        if let Some(ref p) = loaded {
            self.cache.insert_pattern(p.clone());
        }
        Ok(loaded)
    }

    /// Direct-identifier read that includes quarantined rows. Never
    /// cached, so the stored invalidity reason is always current.
    pub fn get_for_audit(&self, id: &str) -> Result<Option<Pattern>, PatternError> {
        Ok(self
            .db
            .with_reader(|conn| queries::get_pattern(conn, id, true))?)
    }

    /// Faceted lookup ordered by trust score descending. Both the
    /// result list and the member patterns are cached.
    pub fn lookup(&self, query: &FacetQuery, limit: usize) -> Result<Vec<Pattern>, PatternError> {
        let signature = format!("{limit}:{}", query.signature());

        if let Some(ids) = self.cache.get_facet_result(&signature) {
            let mut patterns = Vec::with_capacity(ids.len());
            let mut complete = true;
            for id in &ids {
                match self.cache.get_pattern(id) {
                    Some(p) => patterns.push(p),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                return Ok(patterns);
            }
        }

        let patterns = self
            .db
            .with_reader(|conn| queries::lookup_patterns(conn, query, limit))?;
        let ids: Vec<String> = patterns.iter().map(|p| p.id.clone()).collect();
        for p in &patterns {
            self.cache.insert_pattern(p.clone());
        }
        self.cache.insert_facet_result(signature, ids);
        Ok(patterns)
    }

    /// Keyset-paged lookup. Pages are not cached; the continuation
    /// token keeps retrieval constant-time instead.
    pub fn lookup_page(
        &self,
        query: &FacetQuery,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<LookupPage, PatternError> {
        let decoded = cursor.and_then(PaginationCursor::decode);
        Ok(self
            .db
            .with_reader(|conn| queries::lookup_page(conn, query, limit, decoded.as_ref()))?)
    }

    /// Ranked text search over the search index.
    pub fn search(&self, text: &str, limit: usize) -> Result<Vec<Pattern>, PatternError> {
        let hits = self
            .db
            .with_reader(|conn| self.search.search(conn, text, limit))?;
        let mut patterns = Vec::with_capacity(hits.len());
        for (id, _score) in hits {
            if let Some(p) = self.get(&id)? {
                patterns.push(p);
            }
        }
        Ok(patterns)
    }

    /// Snippet metadata for one pattern, cached independently.
    pub fn snippets(&self, id: &str) -> Result<Vec<Snippet>, PatternError> {
        if let Some(hit) = self.cache.get_snippets(id) {
            return Ok(hit);
        }
        let snippets = self.db.with_reader(|conn| queries::get_snippets(conn, id))?;
        self.cache.insert_snippets(id.to_string(), snippets.clone());
        Ok(snippets)
    }

    /// Record one usage outcome: counters bump, trust recomputes, and
    /// the file, row, and cache all follow. The file write comes
    /// first, same as `update`, so a later reload from disk cannot
    /// revert accumulated trust state.
    pub fn record_usage(&self, id: &str, success: bool) -> Result<Pattern, PatternError> {
        let mut pattern = self
            .get(id)?
            .ok_or_else(|| PatternError::NotFound { id: id.to_string() })?;
        pattern.record_usage(success);
        pattern.updated_at = now_epoch().max(pattern.updated_at + 1);

        pattern_files::write_pattern_file(&self.pattern_dir, &pattern)?;
        with_busy_retry(self.retry, || {
            self.db
                .with_writer(|conn| queries::record_usage_row(conn, &pattern))
        })?;

        self.cache.invalidate_pattern(id);
        self.cache.insert_pattern(pattern.clone());
        Ok(pattern)
    }

    /// The single convergence path shared by direct writes and the
    /// watcher: bring the row store in line with one file's content.
    pub fn reconcile(&self, outcome: LoadOutcome) -> Result<(), PatternError> {
        let id = outcome.id().to_string();
        match outcome {
            LoadOutcome::Valid(pattern) => {
                self.persist(&pattern)?;
            }
            LoadOutcome::Quarantined {
                id,
                reason,
                pattern,
            } => {
                tracing::warn!(id = %id, reason = %reason, "quarantining invalid pattern");
                match pattern {
                    Some(mut p) => {
                        p.valid = false;
                        p.invalid_reason = Some(reason);
                        self.persist(&p)?;
                    }
                    None => {
                        with_busy_retry(self.retry, || {
                            self.db
                                .with_writer(|conn| queries::mark_invalid(conn, &id, &reason))
                        })?;
                    }
                }
            }
        }
        self.cache.invalidate_pattern(&id);
        Ok(())
    }

    /// Apply one watcher event through the reconcile path.
    pub fn apply_event(&self, event: &WatchEvent) -> Result<(), PatternError> {
        match event {
            WatchEvent::Created(path) | WatchEvent::Modified(path) => {
                let outcome = pattern_files::load_pattern_file(path)?;
                self.reconcile(outcome)
            }
            WatchEvent::Removed(path) => {
                let Some(id) = self.id_for_removed_file(path)? else {
                    return Ok(());
                };
                with_busy_retry(self.retry, || {
                    self.db.immediate_transaction(|conn| {
                        if queries::delete_pattern(conn, &id)? {
                            self.search.after_delete(conn, &id);
                        }
                        Ok(())
                    })
                })?;
                self.cache.invalidate_pattern(&id);
                tracing::debug!(id = %id, "removed pattern after file deletion");
                Ok(())
            }
        }
    }

    /// Start watching the pattern directory; observed changes feed the
    /// reconcile path on a dedicated thread.
    pub fn start_watcher(self: &Arc<Self>, cfg: &LoreConfig) -> WatcherTask {
        let watcher = PatternWatcher::spawn(self.pattern_dir.clone(), &cfg.watcher);
        let events = watcher.events().clone();
        let store = Arc::clone(self);

        let dispatcher = std::thread::Builder::new()
            .name("lore-reconcile".to_string())
            .spawn(move || {
                while let Ok(event) = events.recv() {
                    if let Err(e) = store.apply_event(&event) {
                        tracing::warn!(path = %event.path().display(), error = %e, "watcher reconcile failed");
                    }
                }
            })
            .ok();

        WatcherTask {
            watcher,
            dispatcher,
        }
    }

    /// Drop every row and reload the store from the pattern directory
    /// inside one transaction. Returns a per-file report; a bad file
    /// quarantines its row without aborting the batch.
    pub fn rebuild(&self) -> Result<Vec<FileReport>, PatternError> {
        self.cache.invalidate_all();

        let paths = pattern_files::scan_pattern_dir(&self.pattern_dir)?;
        let mut reports = Vec::with_capacity(paths.len());
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            match pattern_files::load_pattern_file(&path) {
                Ok(outcome) => {
                    reports.push(FileReport {
                        path,
                        id: outcome.id().to_string(),
                        status: match &outcome {
                            LoadOutcome::Valid(_) => FileStatus::Loaded,
                            LoadOutcome::Quarantined { reason, .. } => FileStatus::Quarantined {
                                reason: reason.clone(),
                            },
                        },
                    });
                    outcomes.push(outcome);
                }
                Err(e) => reports.push(FileReport {
                    id: path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    path,
                    status: FileStatus::Error {
                        message: e.to_string(),
                    },
                }),
            }
        }

        with_busy_retry(self.retry, || {
            self.db.immediate_transaction(|conn| {
                self.search.drop_triggers(conn)?;
                queries::delete_all_patterns(conn)?;
                for outcome in &outcomes {
                    match outcome {
                        LoadOutcome::Valid(p) => {
                            queries::upsert_pattern(conn, p)?;
                            queries::replace_facets(conn, p)?;
                        }
                        LoadOutcome::Quarantined {
                            pattern: Some(p),
                            reason,
                            ..
                        } => {
                            let mut q = p.clone();
                            q.valid = false;
                            q.invalid_reason = Some(reason.clone());
                            queries::upsert_pattern(conn, &q)?;
                            queries::replace_facets(conn, &q)?;
                        }
                        LoadOutcome::Quarantined { pattern: None, .. } => {}
                    }
                }
                self.search.rebuild(conn)?;
                self.search.install_triggers(conn)?;
                Ok(())
            })
        })?;

        tracing::info!(files = reports.len(), "rebuilt pattern store from disk");
        Ok(reports)
    }

    /// Dry-run: load and validate every on-disk file without writing
    /// anything.
    pub fn validate(&self) -> Result<Vec<FileReport>, PatternError> {
        let paths = pattern_files::scan_pattern_dir(&self.pattern_dir)?;
        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            let report = match pattern_files::load_pattern_file(&path) {
                Ok(LoadOutcome::Valid(p)) => FileReport {
                    path,
                    id: p.id,
                    status: FileStatus::Loaded,
                },
                Ok(LoadOutcome::Quarantined { id, reason, .. }) => FileReport {
                    path,
                    id,
                    status: FileStatus::Quarantined { reason },
                },
                Err(e) => FileReport {
                    id: path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    path,
                    status: FileStatus::Error {
                        message: e.to_string(),
                    },
                },
            };
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn stats(&self) -> Result<StoreStats, PatternError> {
        Ok(self.db.with_reader(queries::stats)?)
    }

    pub fn search_metrics(&self) -> SearchMetrics {
        self.search.metrics()
    }

    pub fn pattern_dir(&self) -> &Path {
        &self.pattern_dir
    }

    /// Checkpoint and close cleanly.
    pub fn close(self) {
        self.cache.invalidate_all();
        self.db.close();
    }

    /// Row upsert, facet full-replace, and search sync in one
    /// transaction, retried under write contention.
    fn persist(&self, pattern: &Pattern) -> Result<(), PatternError> {
        let result = with_busy_retry(self.retry, || {
            self.db.immediate_transaction(|conn| {
                queries::upsert_pattern(conn, pattern)?;
                queries::replace_facets(conn, pattern)?;
                self.search.after_upsert(conn, pattern);
                Ok(())
            })
        });
        match result {
            Ok(()) => Ok(()),
            Err(StorageError::Constraint { .. }) if pattern.alias.is_some() => {
                Err(PatternError::AliasTaken {
                    alias: pattern.alias.clone().unwrap_or_default(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_valid(&self, pattern: &Pattern) -> Result<(), PatternError> {
        let issues = validate_pattern(pattern);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(PatternError::Invalid {
                id: pattern.id.clone(),
                reason: issues.join("; "),
            })
        }
    }

    fn check_alias(&self, pattern: &Pattern) -> Result<(), PatternError> {
        if let Some(ref alias) = pattern.alias {
            if let Some(owner) = self
                .db
                .with_reader(|conn| queries::alias_owner(conn, alias))?
            {
                if owner != pattern.id {
                    return Err(PatternError::AliasTaken {
                        alias: alias.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Map a deleted file back to its pattern id. File names are a
    /// lossy projection of ids, so match by re-deriving each
    /// candidate's file name.
    fn id_for_removed_file(&self, path: &Path) -> Result<Option<String>, PatternError> {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let ids = self.db.with_reader(queries::all_ids)?;
        Ok(ids
            .into_iter()
            .find(|id| pattern_files::file_name_for(id) == name))
    }
}

/// Running watcher plus its reconcile dispatcher. Dropping stops both.
pub struct WatcherTask {
    watcher: PatternWatcher,
    dispatcher: Option<JoinHandle<()>>,
}

impl WatcherTask {
    pub fn stop(&mut self) {
        self.watcher.stop();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatcherTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_update(pattern: &mut Pattern, update: PatternUpdate) {
    if let Some(v) = update.pattern_type {
        pattern.pattern_type = v;
    }
    if let Some(v) = update.title {
        pattern.title = v;
    }
    if let Some(v) = update.summary {
        pattern.summary = v;
    }
    if let Some(v) = update.problem {
        pattern.problem = v;
    }
    if let Some(v) = update.solution {
        pattern.solution = v;
    }
    if let Some(v) = update.implementation {
        pattern.implementation = v;
    }
    if let Some(v) = update.examples {
        pattern.examples = v;
    }
    if let Some(v) = update.alias {
        pattern.alias = v;
    }
    if let Some(v) = update.tags {
        pattern.tags = v;
    }
    if let Some(v) = update.keywords {
        pattern.keywords = v;
    }
    if let Some(v) = update.facets {
        pattern.facets = v;
    }
    if let Some(v) = update.snippets {
        pattern.snippets = v;
    }
}
