// src/catalog/loader.rs
//! The load orchestrator.
//!
//! `load_more` walks the feed page by page from the cursor, keeps the valid
//! records, and stops once a batch is full, the per-load cap is hit or the
//! feed looks exhausted. Only a completed load touches the store; a failed
//! one leaves store and cursor exactly as they were and parks the loader in
//! the error phase with a user-facing message.
//!
//! Exactly one load (or refresh) runs at a time. The guard is the `loading`
//! flag, checked and set at every entry point: a call that finds it set
//! returns [`LoadOutcome::Skipped`] at once. The mutex around the state only
//! protects individual reads and writes and is never held across an await.

use super::refresh_timer::RefreshTimer;
use super::store::{CatalogPersistence, CatalogSnapshot, IncrementalStore, MergeReport};
use crate::api::PageSource;
use crate::config::CatalogConfig;
use crate::constants::{
    AUTO_REFRESH_INTERVAL, EXHAUSTION_THRESHOLD, ITEMS_PER_BATCH, MAX_ITEMS_PER_LOAD, MAX_PAGE,
};
use crate::error::FetchError;
use crate::error_recovery::RetryPolicy;
use crate::search::search;
use crate::storage::KeyValueStore;
use crate::types::{IdentityKey, Record};
use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Tunables of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    pub items_per_batch: usize,
    pub max_items_per_load: usize,
    pub exhaustion_threshold: u32,
    pub retry: RetryPolicy,
    /// `None` disables the automatic refresh.
    pub auto_refresh: Option<Duration>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            items_per_batch: ITEMS_PER_BATCH,
            max_items_per_load: MAX_ITEMS_PER_LOAD,
            exhaustion_threshold: EXHAUSTION_THRESHOLD,
            retry: RetryPolicy::default(),
            auto_refresh: Some(AUTO_REFRESH_INTERVAL),
        }
    }
}

impl From<&CatalogConfig> for LoaderSettings {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            items_per_batch: config.items_per_batch,
            max_items_per_load: config.max_items_per_load,
            exhaustion_threshold: config.exhaustion_threshold,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_base_delay,
            },
            auto_refresh: config.auto_refresh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Error,
}

/// What one `load_more`/`refresh` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Another load was in flight, or the feed is exhausted.
    Skipped,
    Loaded {
        pages: u32,
        merge: MergeReport,
        exhausted: bool,
    },
    Failed(FetchError),
}

/// The most recent unrecovered failure.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub error: FetchError,
    pub message: &'static str,
}

/// Read-only view of the loader for display.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderStatus {
    pub phase: LoadPhase,
    pub records: usize,
    pub cursor: u32,
    pub has_more: bool,
    pub empty_streak: u32,
    pub retries: u32,
    pub last_sync: Option<DateTime<Local>>,
    pub error: Option<LoadFailure>,
}

struct LoaderState {
    store: IncrementalStore,
    cursor: u32,
    has_more: bool,
    empty_streak: u32,
    loading: bool,
    retries: u32,
    last_sync: Option<DateTime<Local>>,
    error: Option<LoadFailure>,
    timer: RefreshTimer,
}

impl LoaderState {
    fn new() -> Self {
        Self {
            store: IncrementalStore::new(),
            cursor: 0,
            has_more: true,
            empty_streak: 0,
            loading: false,
            retries: 0,
            last_sync: None,
            error: None,
            timer: RefreshTimer::new(),
        }
    }

    fn reset(&mut self) {
        self.timer.cancel();
        self.store.clear();
        self.cursor = 0;
        self.has_more = true;
        self.empty_streak = 0;
        self.retries = 0;
        self.error = None;
    }
}

struct Inner {
    source: Arc<dyn PageSource>,
    settings: LoaderSettings,
    persistence: Option<CatalogPersistence>,
    state: Mutex<LoaderState>,
}

/// Clears the loading flag however the load ends.
struct LoadingGuard<'a> {
    inner: &'a Inner,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.state.lock().loading = false;
    }
}

/// Result of walking the feed, before anything is committed.
struct Batch {
    records: Vec<Record>,
    pages: u32,
    cursor: u32,
    empty_streak: u32,
    has_more: bool,
    retries: u32,
}

/// Drives incremental loading of the catalog.
///
/// Cheap to clone; clones share the same catalog.
#[derive(Clone)]
pub struct CatalogLoader {
    inner: Arc<Inner>,
}

impl CatalogLoader {
    pub fn new(source: Arc<dyn PageSource>, settings: LoaderSettings) -> Self {
        Self::build(source, settings, None)
    }

    /// Like [`new`](Self::new), additionally writing a catalog snapshot to
    /// `backend` after every successful load.
    pub fn with_persistence(
        source: Arc<dyn PageSource>,
        settings: LoaderSettings,
        backend: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::build(source, settings, Some(CatalogPersistence::new(backend)))
    }

    fn build(
        source: Arc<dyn PageSource>,
        settings: LoaderSettings,
        persistence: Option<CatalogPersistence>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                settings,
                persistence,
                state: Mutex::new(LoaderState::new()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Fetches the next batch and appends it to the catalog.
    pub async fn load_more(&self) -> LoadOutcome {
        {
            let mut state = self.inner.state.lock();
            if state.loading || !state.has_more {
                return LoadOutcome::Skipped;
            }
            state.loading = true;
            state.error = None;
        }
        self.run_load().await
    }

    /// Drops the catalog and loads again from page 0. Favorites live
    /// elsewhere and are not affected.
    pub async fn refresh(&self) -> LoadOutcome {
        {
            let mut state = self.inner.state.lock();
            if state.loading {
                return LoadOutcome::Skipped;
            }
            log::info!("Refreshing catalog");
            state.reset();
            state.loading = true;
        }
        self.run_load().await
    }

    /// Forgets the current error message. Loading state is untouched.
    pub fn clear_error(&self) {
        let mut state = self.inner.state.lock();
        state.error = None;
    }

    /// Cancels the pending automatic refresh, if any.
    pub fn cancel_auto_refresh(&self) -> bool {
        self.inner.state.lock().timer.cancel()
    }

    pub fn auto_refresh_scheduled(&self) -> bool {
        self.inner.state.lock().timer.is_scheduled()
    }

    /// Seeds an empty, idle loader from the last persisted snapshot.
    pub fn restore_snapshot(&self) -> bool {
        let Some(persistence) = &self.inner.persistence else {
            return false;
        };
        let Some(snapshot) = persistence.load() else {
            return false;
        };

        let mut state = self.inner.state.lock();
        if state.loading || !state.store.is_empty() {
            return false;
        }
        state.store = snapshot.to_store();
        state.cursor = snapshot.cursor;
        state.has_more = snapshot.has_more;
        state.empty_streak = snapshot.empty_streak;
        state.last_sync = snapshot.last_sync;
        self.schedule_auto_refresh(&mut state);
        log::info!(
            "Restored {} records from snapshot (cursor {})",
            state.store.len(),
            state.cursor
        );
        true
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    pub fn status(&self) -> LoaderStatus {
        let state = self.inner.state.lock();
        let phase = if state.loading {
            LoadPhase::Loading
        } else if state.error.is_some() {
            LoadPhase::Error
        } else {
            LoadPhase::Idle
        };
        LoaderStatus {
            phase,
            records: state.store.len(),
            cursor: state.cursor,
            has_more: state.has_more,
            empty_streak: state.empty_streak,
            retries: state.retries,
            last_sync: state.last_sync,
            error: state.error.clone(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    pub fn has_more(&self) -> bool {
        self.inner.state.lock().has_more
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Message for the most recent failure, if one is pending.
    pub fn error_message(&self) -> Option<&'static str> {
        self.inner.state.lock().error.as_ref().map(|e| e.message)
    }

    /// Copies of all entries in display order.
    pub fn entries(&self) -> Vec<(IdentityKey, Record)> {
        let state = self.inner.state.lock();
        state
            .store
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    pub fn records(&self) -> Vec<Record> {
        self.inner.state.lock().store.records().cloned().collect()
    }

    /// Entries whose names contain `query`, in display order.
    pub fn search(&self, query: &str) -> Vec<(IdentityKey, Record)> {
        let state = self.inner.state.lock();
        search(state.store.records(), query)
            .into_iter()
            .map(|record| (IdentityKey::of(record), record.clone()))
            .collect()
    }

    /// Runs `f` against the store without copying it.
    pub fn with_store<R>(&self, f: impl FnOnce(&IncrementalStore) -> R) -> R {
        f(&self.inner.state.lock().store)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Body of a load; the caller has already set the loading flag.
    async fn run_load(&self) -> LoadOutcome {
        let _guard = LoadingGuard { inner: &self.inner };

        let (cursor, empty_streak) = {
            let state = self.inner.state.lock();
            (state.cursor, state.empty_streak)
        };
        log::debug!("Loading more records from page {}", cursor);

        match self.collect_batch(cursor, empty_streak).await {
            Ok(batch) => self.commit(batch),
            Err((error, retries)) => self.fail(error, retries),
        }
    }

    /// Walks pages from `cursor` until the batch is complete.
    async fn collect_batch(
        &self,
        mut cursor: u32,
        mut empty_streak: u32,
    ) -> Result<Batch, (FetchError, u32)> {
        let settings = &self.inner.settings;
        let source = &self.inner.source;
        let mut records: Vec<Record> = Vec::new();
        let mut pages = 0;
        let mut retries = 0;
        let mut has_more = true;

        while records.len() < settings.items_per_batch
            && records.len() < settings.max_items_per_load
            && has_more
        {
            let page = cursor;
            let attempted = settings.retry.run(|| source.fetch_page(page)).await;
            retries += attempted.retries;
            let raw = attempted.result.map_err(|e| (e, retries))?;

            let fetched = raw.len();
            let valid: Vec<Record> = raw
                .into_iter()
                .filter_map(|raw| {
                    let key = IdentityKey::of_raw(&raw);
                    let record = Record::from_raw(raw);
                    if record.is_none() {
                        log::debug!("Dropping invalid record {} on page {}", key, page);
                    }
                    record
                })
                .collect();
            log::debug!(
                "Page {}: {} records, {} valid",
                page,
                fetched,
                valid.len()
            );

            if valid.is_empty() {
                empty_streak += 1;
            } else {
                empty_streak = 0;
                records.extend(valid);
            }
            cursor += 1;
            pages += 1;

            if empty_streak >= settings.exhaustion_threshold {
                log::info!(
                    "{} consecutive empty pages, feed exhausted at page {}",
                    empty_streak,
                    page
                );
                has_more = false;
            } else if cursor > MAX_PAGE {
                log::info!("Reached the last addressable page {}", MAX_PAGE);
                has_more = false;
            }
        }

        records.truncate(settings.max_items_per_load);
        Ok(Batch {
            records,
            pages,
            cursor,
            empty_streak,
            has_more,
            retries,
        })
    }

    fn commit(&self, batch: Batch) -> LoadOutcome {
        let (snapshot, merge) = {
            let mut state = self.inner.state.lock();
            let merge = state.store.merge(batch.records);
            state.cursor = batch.cursor;
            state.empty_streak = batch.empty_streak;
            state.has_more = batch.has_more;
            state.retries += batch.retries;
            state.last_sync = Some(Local::now());

            log::info!(
                "Loaded {} pages: {} new records, {} duplicates, {} total",
                batch.pages,
                merge.added,
                merge.duplicates,
                state.store.len()
            );

            self.schedule_auto_refresh(&mut state);

            let snapshot = self.inner.persistence.as_ref().map(|_| CatalogSnapshot {
                records: state.store.records().cloned().collect(),
                cursor: state.cursor,
                has_more: state.has_more,
                empty_streak: state.empty_streak,
                last_sync: state.last_sync,
            });

            (snapshot, merge)
        };

        if let (Some(persistence), Some(snapshot)) = (&self.inner.persistence, snapshot) {
            if let Err(e) = persistence.save(&snapshot) {
                log::error!("Error saving catalog snapshot: {}", e);
            }
        }

        LoadOutcome::Loaded {
            pages: batch.pages,
            merge,
            exhausted: !batch.has_more,
        }
    }

    /// Replaces any pending automatic refresh with a fresh one.
    fn schedule_auto_refresh(&self, state: &mut LoaderState) {
        if let Some(delay) = self.inner.settings.auto_refresh {
            let weak = Arc::downgrade(&self.inner);
            state
                .timer
                .schedule(delay, move |generation| auto_refresh(weak, generation));
        }
    }

    fn fail(&self, error: FetchError, retries: u32) -> LoadOutcome {
        log::error!("Error loading records: {}", error);
        let mut state = self.inner.state.lock();
        state.retries += retries;
        state.error = Some(LoadFailure {
            message: error.user_message(),
            error: error.clone(),
        });
        LoadOutcome::Failed(error)
    }
}

/// Body of the scheduled refresh.
///
/// Boxed so the future type does not refer back to `load_more`, which
/// schedules it.
fn auto_refresh(inner: Weak<Inner>, generation: u64) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let released = inner.state.lock().timer.release(generation);
        if !released {
            return;
        }
        log::info!("Auto-refreshing catalog after inactivity");
        let loader = CatalogLoader { inner };
        loader.refresh().await;
    })
}
