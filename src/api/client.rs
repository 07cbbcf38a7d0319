// src/api/client.rs
//! HTTP page source for the proxy endpoint.
//!
//! A thin wrapper around reqwest: one POST per page, a client-side timeout,
//! and classification of whatever went wrong. Parsing stops at the raw
//! record shape; validation belongs to the loader.

use super::{validate_page, PageSource};
use crate::constants::ERROR_BODY_PREVIEW_LENGTH;
use crate::error::{AppError, FetchError};
use crate::types::RawRecord;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Body of a page request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
}

/// Pulls pages from a deployed proxy endpoint.
#[derive(Clone)]
pub struct HttpPageSource {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpPageSource {
    /// Creates a source for `endpoint` with a per-request `timeout`.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .default_headers(Self::create_headers())
            .build()?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    fn create_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post_page(&self, page: u32) -> Result<Vec<RawRecord>, FetchError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&PageRequest { page })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        log::debug!("POST {} page={} -> {}", self.endpoint, page, status);

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
            return Err(FetchError::from_status(status.as_u16(), message));
        }

        parse_page_body(&body)
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawRecord>, FetchError> {
        validate_page(page)?;
        match tokio::time::timeout(self.timeout, self.post_page(page)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

/// Decodes a page body into raw records.
///
/// The body must be a JSON array. Elements that do not even have the loose
/// record shape are skipped; they could never pass validation.
pub fn parse_page_body(body: &str) -> Result<Vec<RawRecord>, FetchError> {
    let json: Value = serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse {
        reason: format!("{} (body: {})", e, preview(body)),
    })?;

    let Value::Array(items) = json else {
        return Err(FetchError::MalformedResponse {
            reason: format!("expected a JSON array, got: {}", preview(body)),
        });
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawRecord>(item) {
            Ok(raw) => Some(raw),
            Err(e) => {
                log::debug!("Skipping unreadable record: {}", e);
                None
            }
        })
        .collect())
}

/// Extracts the `error` field the proxy puts in failure bodies.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

fn preview(body: &str) -> String {
    if body.chars().count() > ERROR_BODY_PREVIEW_LENGTH {
        let cut: String = body.chars().take(ERROR_BODY_PREVIEW_LENGTH).collect();
        format!("{}...", cut)
    } else {
        body.to_string()
    }
}
