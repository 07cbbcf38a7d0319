//! Identity keys and the text normalization they are built on.

use super::{RawRecord, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercases, maps Arabic-Indic digits to ASCII and trims.
///
/// Total and pure: empty input yields an empty string.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => {
                char::from(b'0' + (c as u32 - 0x0660) as u8)
            }
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Deterministic identity of a record, used for deduplication.
///
/// `id:<identifier>` when the record carries an external identifier,
/// `n:<normalized name>|a:<normalized localized name>` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Derives the key of a validated record.
    pub fn of(record: &Record) -> Self {
        Self::derive(record.id.as_deref(), &record.name, record.arabic.as_deref())
    }

    /// Derives the key straight from the wire shape, preferring `product_id`.
    pub fn of_raw(raw: &RawRecord) -> Self {
        let id = raw.identifier();
        Self::derive(
            id.as_deref(),
            raw.name.as_deref().unwrap_or_default(),
            raw.arabic.as_deref(),
        )
    }

    fn derive(id: Option<&str>, name: &str, arabic: Option<&str>) -> Self {
        match id.filter(|id| !id.is_empty()) {
            Some(id) => Self(format!("id:{}", id)),
            None => Self(format!(
                "n:{}|a:{}",
                normalize(name),
                normalize(arabic.unwrap_or_default())
            )),
        }
    }

    /// Wraps an already-derived key, e.g. one read back from storage.
    pub fn from_raw_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
