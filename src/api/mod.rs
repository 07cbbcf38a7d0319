//! Upstream interaction: the ability to pull one page of the price list.
//!
//! The loader depends on [`PageSource`], never on HTTP details. Two sources
//! ship with the crate: [`HttpPageSource`] talks to a deployed proxy
//! endpoint, [`GatewayPageSource`] runs the proxy's contract in-process in
//! front of the raw upstream feed.

pub mod client;
pub mod gateway;
pub mod rate_limit;

use crate::constants::MAX_PAGE;
use crate::error::FetchError;
use crate::types::{RawRecord, ValidationError};

/// The ability to retrieve one page of raw records.
///
/// Implementations issue exactly one request per call and never retry;
/// retries are layered on top by [`RetryPolicy`](crate::error_recovery::RetryPolicy).
/// An empty page is a successful result.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawRecord>, FetchError>;
}

#[async_trait::async_trait]
impl<S: PageSource + ?Sized> PageSource for std::sync::Arc<S> {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawRecord>, FetchError> {
        (**self).fetch_page(page).await
    }
}

/// Rejects page numbers the proxy endpoint would refuse anyway.
pub fn validate_page(page: u32) -> Result<u32, ValidationError> {
    if page > MAX_PAGE {
        return Err(ValidationError::PageOutOfRange {
            page,
            max: MAX_PAGE,
        });
    }
    Ok(page)
}

pub use client::HttpPageSource;
pub use gateway::{FormUpstream, GatewayPageSource, PageGateway, UpstreamFeed};
pub use rate_limit::FixedWindowRateLimiter;
