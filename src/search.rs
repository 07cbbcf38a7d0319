// src/search.rs
//! Substring search over the loaded catalog.
//!
//! Matching runs on normalized text on both sides, so `"ABRIL"` finds
//! `"abril"` and `"٥٠٠"` finds `"500"`. There is no ranking: results keep
//! catalog order.

use crate::types::{normalize, Record};

/// Returns the records whose name or localized name contains `query`.
///
/// A blank query matches everything.
pub fn search<'a, I>(records: I, query: &str) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let needle = normalize(query);
    records
        .into_iter()
        .filter(|record| needle.is_empty() || matches(record, &needle))
        .collect()
}

fn matches(record: &Record, needle: &str) -> bool {
    normalize(&record.name).contains(needle)
        || record
            .arabic
            .as_deref()
            .is_some_and(|arabic| normalize(arabic).contains(needle))
}
