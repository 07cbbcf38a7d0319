//! Catalog records: the loose wire shape and the validated domain shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record exactly as the feed delivers it.
///
/// Every field is optional and loosely typed: identifiers show up as strings
/// or numbers, prices as numbers or numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arabic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldprice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RawRecord {
    /// External identifier, `product_id` taking precedence over `id`.
    pub fn identifier(&self) -> Option<String> {
        self.product_id
            .as_ref()
            .and_then(scalar_text)
            .or_else(|| self.id.as_ref().and_then(scalar_text))
    }

    /// Price as a number, if it is one (or a string holding one).
    pub fn numeric_price(&self) -> Option<f64> {
        self.price.as_ref().and_then(numeric)
    }
}

/// A validated catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arabic: Option<String>,
    pub price: f64,
    #[serde(rename = "oldprice", default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Record {
    /// Validates a raw record.
    ///
    /// Returns `None` unless the name is non-blank and the price is a finite
    /// number greater than zero.
    pub fn from_raw(raw: RawRecord) -> Option<Self> {
        let price = raw.numeric_price()?;
        if !is_valid(raw.name.as_deref(), price) {
            return None;
        }
        let id = raw.identifier();
        Some(Self {
            id,
            name: raw.name?,
            arabic: raw.arabic.filter(|a| !a.is_empty()),
            price,
            old_price: raw.oldprice.as_ref().and_then(numeric),
            category: raw.category,
            manufacturer: raw.manufacturer,
            description: raw.description,
        })
    }

    /// Whether the price dropped compared to the previous one.
    pub fn is_discounted(&self) -> bool {
        self.old_price.is_some_and(|old| old > self.price)
    }
}

impl From<Record> for RawRecord {
    fn from(record: Record) -> Self {
        Self {
            id: record.id.map(Value::String),
            product_id: None,
            name: Some(record.name),
            arabic: record.arabic,
            price: serde_json::Number::from_f64(record.price).map(Value::Number),
            oldprice: record
                .old_price
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            category: record.category,
            manufacturer: record.manufacturer,
            description: record.description,
        }
    }
}

/// The ingestion rule shared by every stage that filters records.
pub fn is_valid(name: Option<&str>, price: f64) -> bool {
    name.is_some_and(|n| !n.trim().is_empty()) && price.is_finite() && price > 0.0
}

/// Coerces a JSON scalar into a number the way the feed expects.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
