// src/favorites.rs
//! The user's favorites: a persisted set of identity keys.
//!
//! The set lives independently of the catalog, so refreshing or exhausting
//! the feed never touches it. Writes go straight to storage; when storage
//! refuses, the failure is logged and the in-memory set stays authoritative
//! for the rest of the session.

use crate::constants::FAVORITES_KEY;
use crate::storage::{KeyValueStore, VersionedStorage};
use crate::types::IdentityKey;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Schema version of the persisted favorites list.
pub const FAVORITES_SCHEMA_VERSION: &str = "1.0";

pub struct Favorites {
    keys: BTreeSet<IdentityKey>,
    storage: VersionedStorage,
}

impl Favorites {
    /// Loads the persisted set, starting empty when nothing usable is stored.
    pub fn load(backend: Arc<dyn KeyValueStore>) -> Self {
        let storage = VersionedStorage::new(backend, FAVORITES_SCHEMA_VERSION);
        let keys: BTreeSet<IdentityKey> = storage
            .get::<Vec<IdentityKey>>(FAVORITES_KEY)
            .unwrap_or_default()
            .into_iter()
            .collect();
        log::debug!("Loaded {} favorites", keys.len());
        Self { keys, storage }
    }

    /// Flips membership of `key` and persists. Returns the new membership.
    pub fn toggle(&mut self, key: &IdentityKey) -> bool {
        let now_favorite = if self.keys.remove(key) {
            false
        } else {
            self.keys.insert(key.clone());
            true
        };
        self.persist();
        now_favorite
    }

    pub fn is_favorite(&self, key: &IdentityKey) -> bool {
        self.keys.contains(key)
    }

    pub fn clear_all(&mut self) {
        self.keys.clear();
        self.persist();
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.keys.iter()
    }

    fn persist(&self) {
        let keys: Vec<&IdentityKey> = self.keys.iter().collect();
        if let Err(e) = self.storage.set(FAVORITES_KEY, &keys) {
            log::error!("Error saving favorites: {}", e);
        }
    }
}
