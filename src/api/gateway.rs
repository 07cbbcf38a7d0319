// src/api/gateway.rs
//! In-process model of the proxy endpoint.
//!
//! The gateway does what the deployed proxy does for one page request:
//! throttle the caller, validate the page number, call the raw upstream
//! under a timeout, normalize whatever comes back and drop unusable entries.
//! Every failure carries the HTTP status the proxy would answer with, so the
//! client-side classification is identical whether pages come over the
//! network or through [`GatewayPageSource`].

use super::rate_limit::FixedWindowRateLimiter;
use super::{validate_page, PageSource};
use crate::constants::{MAX_PAGE, REQUEST_TIMEOUT};
use crate::error::{AppError, FetchError};
use crate::types::{numeric, RawRecord, Record};
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const UPSTREAM_PAGE_FIELD: &str = "lastpricesForFlutter";
const UPSTREAM_USER_AGENT: &str = "DWAPrices-App/1.0";

// ---------------------------------------------------------------------------
// Raw upstream
// ---------------------------------------------------------------------------

/// Failure talking to the raw upstream feed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("API responded with status: {0}")]
    Status(u16),

    #[error("Upstream request failed: {0}")]
    Transport(String),
}

/// The raw, unnormalized price feed behind the proxy.
#[async_trait::async_trait]
pub trait UpstreamFeed: Send + Sync {
    /// Returns the response body for `page` as text.
    async fn fetch_raw(&self, page: u32) -> Result<String, UpstreamError>;
}

/// The production upstream: a form-encoded POST per page.
pub struct FormUpstream {
    client: Client,
    url: Url,
}

impl FormUpstream {
    pub fn new(url: Url) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(UPSTREAM_USER_AGENT),
        );
        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait::async_trait]
impl UpstreamFeed for FormUpstream {
    async fn fetch_raw(&self, page: u32) -> Result<String, UpstreamError> {
        let page = page.to_string();
        let response = self
            .client
            .post(self.url.clone())
            .form(&[(UPSTREAM_PAGE_FIELD, page.as_str())])
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status().as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Why the gateway refused or failed a page request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Too many requests. Please try again later.")]
    RateLimited,

    #[error("Invalid page number")]
    InvalidPage(i64),

    #[error("Request timeout. Please try again.")]
    Timeout,

    #[error("External API returned invalid data.")]
    InvalidJson,

    #[error("Internal server error. Please try again later.")]
    Upstream(UpstreamError),
}

impl GatewayError {
    /// HTTP status the proxy answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimited => 429,
            Self::InvalidPage(_) => 400,
            Self::Timeout => 504,
            Self::InvalidJson => 502,
            Self::Upstream(_) => 500,
        }
    }
}

/// Reads the `page` field of a request body the way the proxy does:
/// anything that is not a number counts as page 0.
pub fn page_from_body(body: &Value) -> i64 {
    body.get("page")
        .and_then(numeric)
        .map(|page| page.trunc() as i64)
        .unwrap_or(0)
}

/// Serves page requests on top of an [`UpstreamFeed`].
pub struct PageGateway<U> {
    upstream: U,
    limiter: FixedWindowRateLimiter,
    timeout: Duration,
}

impl<U: UpstreamFeed> PageGateway<U> {
    pub fn new(upstream: U, limiter: FixedWindowRateLimiter) -> Self {
        Self {
            upstream,
            limiter,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn limiter(&self) -> &FixedWindowRateLimiter {
        &self.limiter
    }

    /// Handles a request body as the proxy receives it, `{"page": n}`.
    pub async fn handle_body(
        &self,
        caller: &str,
        body: &Value,
    ) -> Result<Vec<Record>, GatewayError> {
        self.handle(caller, page_from_body(body)).await
    }

    /// Handles one page request from `caller`.
    pub async fn handle(&self, caller: &str, page: i64) -> Result<Vec<Record>, GatewayError> {
        if !self.limiter.check(caller) {
            log::warn!("Rate limit exceeded for {}", caller);
            return Err(GatewayError::RateLimited);
        }

        let page = u32::try_from(page)
            .ok()
            .filter(|p| *p <= MAX_PAGE)
            .ok_or(GatewayError::InvalidPage(page))?;

        let body = match tokio::time::timeout(self.timeout, self.upstream.fetch_raw(page)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                log::error!("Upstream error for page {}: {}", page, e);
                return Err(GatewayError::Upstream(e));
            }
            Err(_) => return Err(GatewayError::Timeout),
        };

        let json: Value = serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to parse upstream response as JSON: {}", e);
            GatewayError::InvalidJson
        })?;

        let items = match json {
            Value::Array(items) => items,
            _ => Vec::new(),
        };

        Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| normalize_upstream_record(item, index, page))
            .collect())
    }
}

/// Normalizes one upstream entry, returning `None` when it is unusable.
///
/// Entries without an identifier get a positional one, `"{page}-{index}-{name}"`.
pub fn normalize_upstream_record(item: Value, index: usize, page: u32) -> Option<Record> {
    let mut raw: RawRecord = serde_json::from_value(item).unwrap_or_default();
    if raw.identifier().is_none() {
        let name = raw.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("unknown");
        raw.id = Some(Value::String(format!("{}-{}-{}", page, index, name)));
    }
    Record::from_raw(raw)
}

// ---------------------------------------------------------------------------
// Gateway as a page source
// ---------------------------------------------------------------------------

/// Feeds the loader straight from a [`PageGateway`], without a network hop
/// to a deployed proxy.
pub struct GatewayPageSource<U> {
    gateway: Arc<PageGateway<U>>,
    caller: String,
    timeout: Duration,
}

impl<U: UpstreamFeed> GatewayPageSource<U> {
    pub fn new(gateway: Arc<PageGateway<U>>, caller: impl Into<String>) -> Self {
        Self {
            gateway,
            caller: caller.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

#[async_trait::async_trait]
impl<U: UpstreamFeed> PageSource for GatewayPageSource<U> {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawRecord>, FetchError> {
        validate_page(page)?;
        let body = json!({ "page": page });
        let handled =
            tokio::time::timeout(self.timeout, self.gateway.handle_body(&self.caller, &body))
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))?;

        match handled {
            Ok(records) => Ok(records.into_iter().map(RawRecord::from).collect()),
            Err(e) => Err(FetchError::from_status(e.status_code(), e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_field_parsing_is_lenient() {
        assert_eq!(page_from_body(&json!({"page": 3})), 3);
        assert_eq!(page_from_body(&json!({"page": "7"})), 7);
        assert_eq!(page_from_body(&json!({"page": "x"})), 0);
        assert_eq!(page_from_body(&json!({})), 0);
        assert_eq!(page_from_body(&json!({"page": -2})), -2);
    }

    #[test]
    fn positional_ids_fill_missing_identifiers() {
        let record =
            normalize_upstream_record(json!({"name": "Abril", "price": "20"}), 4, 2).unwrap();
        assert_eq!(record.id.as_deref(), Some("2-4-Abril"));
        assert_eq!(record.price, 20.0);

        let record =
            normalize_upstream_record(json!({"id": 15, "name": "Abril", "price": 1}), 0, 0)
                .unwrap();
        assert_eq!(record.id.as_deref(), Some("15"));
    }

    #[test]
    fn unusable_entries_are_dropped() {
        assert!(normalize_upstream_record(json!({"name": "X", "price": "n/a"}), 0, 0).is_none());
        assert!(normalize_upstream_record(json!({"price": 3}), 0, 0).is_none());
        assert!(normalize_upstream_record(json!("garbage"), 0, 0).is_none());
    }

    struct EmptyFeed;

    #[async_trait::async_trait]
    impl UpstreamFeed for EmptyFeed {
        async fn fetch_raw(&self, _page: u32) -> Result<String, UpstreamError> {
            Ok("[]".to_string())
        }
    }

    #[tokio::test]
    async fn request_bodies_are_read_leniently() {
        let gateway = PageGateway::new(EmptyFeed, FixedWindowRateLimiter::default());
        assert_eq!(gateway.handle_body("a", &json!({"page": "4"})).await, Ok(Vec::new()));
        assert_eq!(gateway.handle_body("a", &json!({})).await, Ok(Vec::new()));
        assert_eq!(
            gateway.handle_body("a", &json!({"page": 1001})).await,
            Err(GatewayError::InvalidPage(1001))
        );
        assert_eq!(
            gateway.handle_body("a", &json!({"page": -3})).await,
            Err(GatewayError::InvalidPage(-3))
        );
    }

    #[test]
    fn statuses_match_the_proxy_contract() {
        assert_eq!(GatewayError::RateLimited.status_code(), 429);
        assert_eq!(GatewayError::InvalidPage(-1).status_code(), 400);
        assert_eq!(GatewayError::Timeout.status_code(), 504);
        assert_eq!(GatewayError::InvalidJson.status_code(), 502);
        assert_eq!(
            GatewayError::Upstream(UpstreamError::Status(503)).status_code(),
            500
        );
    }
}
