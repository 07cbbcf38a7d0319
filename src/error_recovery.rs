// src/error_recovery.rs
//! Retry with linear backoff for page fetches.

use crate::constants::{MAX_RETRIES, RETRY_BASE_DELAY};
use crate::error::FetchError;
use std::time::Duration;

/// Bounded retry around a single page request.
///
/// Retry `n` (1-based) waits `n * base_delay`. Failures that are not
/// [retryable](FetchError::is_retryable) return immediately. The attempt
/// counter lives inside one [`run`](Self::run) call, so nothing carries over
/// from one page to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: RETRY_BASE_DELAY,
        }
    }
}

/// Result of a retried operation together with how many retries it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, FetchError>,
    pub retries: u32,
}

impl RetryPolicy {
    /// Backoff before retry number `retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }

    /// Runs `operation` until it succeeds, fails permanently or the retries
    /// are used up. The last failure is returned in the latter two cases.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        retries,
                    }
                }
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    log::warn!(
                        "Attempt {} failed ({}), retrying after {:?}",
                        retries,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Attempted {
                        result: Err(e),
                        retries,
                    }
                }
            }
        }
    }
}
