//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use pricelist::{FetchError, PageSource, RawRecord};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

type Responder = dyn Fn(u32, usize) -> Result<Vec<RawRecord>, FetchError> + Send + Sync;

/// A page source answering from a closure of `(page, call_index)`.
pub struct ScriptedSource {
    respond: Box<Responder>,
    calls: Mutex<Vec<u32>>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(u32, usize) -> Result<Vec<RawRecord>, FetchError> + Send + Sync + 'static,
    {
        Self::with_delay(Duration::ZERO, respond)
    }

    /// Every fetch sleeps `delay` before answering.
    pub fn with_delay<F>(delay: Duration, respond: F) -> Arc<Self>
    where
        F: Fn(u32, usize) -> Result<Vec<RawRecord>, FetchError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
            delay,
        })
    }

    /// Pages requested so far, in order.
    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait::async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawRecord>, FetchError> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(page);
            calls.len() - 1
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(page, call)
    }
}

/// A valid raw record with an external identifier.
pub fn item(id: &str, name: &str, price: f64) -> RawRecord {
    serde_json::from_value(json!({"id": id, "name": name, "price": price})).unwrap()
}

/// `count` valid records, unique per page.
pub fn page_of(page: u32, count: usize) -> Vec<RawRecord> {
    (0..count)
        .map(|i| item(&format!("p{}-{}", page, i), &format!("Item {}-{}", page, i), 10.0))
        .collect()
}

pub fn transport_error() -> FetchError {
    FetchError::Transport {
        message: "connection reset by peer".to_string(),
    }
}
