//! The incremental store: an ordered, deduplicated record collection.

use crate::constants::CATALOG_KEY;
use crate::error::StorageError;
use crate::storage::{KeyValueStore, VersionedStorage};
use crate::types::{IdentityKey, Record};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Schema version of persisted catalog snapshots.
///
/// Snapshots carrying any other version are discarded on read, never
/// migrated. Bump this whenever [`CatalogSnapshot`] or [`Record`] changes
/// shape.
pub const CATALOG_SCHEMA_VERSION: &str = "1.1";

/// Records keyed by identity, in first-seen order.
///
/// Merging only ever appends: a key that is already present keeps its first
/// record and its position.
#[derive(Debug, Clone, Default)]
pub struct IncrementalStore {
    entries: IndexMap<IdentityKey, Record>,
}

/// What a merge did with its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub duplicates: usize,
}

impl IncrementalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every record whose key is not yet present.
    pub fn merge<I>(&mut self, records: I) -> MergeReport
    where
        I: IntoIterator<Item = Record>,
    {
        let mut report = MergeReport::default();
        for record in records {
            let key = IdentityKey::of(&record);
            if self.entries.contains_key(&key) {
                report.duplicates += 1;
                continue;
            }
            self.entries.insert(key, record);
            report.added += 1;
        }
        report
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&Record> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in display order.
    pub fn keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.entries.keys()
    }

    /// Records in display order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &Record)> {
        self.entries.iter()
    }
}

/// Everything needed to resume browsing where the last session stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub records: Vec<Record>,
    pub cursor: u32,
    pub has_more: bool,
    /// Consecutive pages without valid records at the cursor.
    pub empty_streak: u32,
    pub last_sync: Option<DateTime<Local>>,
}

impl CatalogSnapshot {
    /// Rebuilds a store from the snapshot, re-deriving keys.
    pub fn to_store(&self) -> IncrementalStore {
        let mut store = IncrementalStore::new();
        store.merge(self.records.iter().cloned());
        store
    }
}

/// Persistence boundary of the store.
#[derive(Clone)]
pub struct CatalogPersistence {
    storage: VersionedStorage,
}

impl CatalogPersistence {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage: VersionedStorage::new(backend, CATALOG_SCHEMA_VERSION),
        }
    }

    pub fn save(&self, snapshot: &CatalogSnapshot) -> Result<(), StorageError> {
        self.storage.set(CATALOG_KEY, snapshot)
    }

    pub fn load(&self) -> Option<CatalogSnapshot> {
        self.storage.get(CATALOG_KEY)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(CATALOG_KEY)
    }
}
