// src/storage.rs
//! Versioned key-value persistence.
//!
//! Every logical key holds one envelope `{value, version, timestamp}`.
//! Envelopes written under a different schema version are treated as absent:
//! there is no migration, a reader that does not recognize the version gets
//! its default instead.
//!
//! Operations are synchronous and best-effort at the call sites that use
//! them; a broken backend never takes the in-memory state down with it.

use crate::constants::STORAGE_PREFIX;
use crate::error::StorageError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// A flat string-to-string store.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One JSON file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$XDG_DATA_HOME/pricelist` or `~/.local/share/pricelist`.
    pub fn default_dir() -> PathBuf {
        std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local").join("share")
            })
            .join("pricelist")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.key_to_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.key_to_path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.key_to_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, also used to simulate a full or broken backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    rejecting_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write and remove fail (or succeed again).
    pub fn reject_writes(&self, reject: bool) {
        self.rejecting_writes.store(reject, Ordering::SeqCst);
    }

    /// Raw contents under `key`, bypassing the envelope.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.rejecting_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Versioned envelopes
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    version: String,
    timestamp: i64,
}

/// Typed access to a backend with a fixed schema version.
#[derive(Clone)]
pub struct VersionedStorage {
    backend: Arc<dyn KeyValueStore>,
    version: &'static str,
}

impl VersionedStorage {
    pub fn new(backend: Arc<dyn KeyValueStore>, version: &'static str) -> Self {
        Self { backend, version }
    }

    fn full_key(key: &str) -> String {
        format!("{}_{}", STORAGE_PREFIX, key)
    }

    /// Reads the value under `key`.
    ///
    /// Missing entries, unreadable entries and entries from another schema
    /// version all come back as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = Self::full_key(key);
        let stored = match self.backend.read(&full_key) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                log::error!("Storage error getting {}: {}", key, e);
                return None;
            }
        };

        let envelope: Envelope<serde_json::Value> = match serde_json::from_str(&stored) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("Storage error getting {}: {}", key, e);
                return None;
            }
        };

        if envelope.version != self.version {
            log::warn!(
                "Storage version mismatch for {}. Expected {}, got {}",
                key,
                self.version,
                envelope.version
            );
            return None;
        }

        match serde_json::from_value(envelope.value) {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Storage error decoding {}: {}", key, e);
                None
            }
        }
    }

    /// Writes `value` under `key`, stamped with the current version and time.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let envelope = Envelope {
            value,
            version: self.version.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string(&envelope)?;
        self.backend.write(&Self::full_key(key), &json)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(&Self::full_key(key))
    }
}
