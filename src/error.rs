// src/error.rs
//! Application error types with structured error handling.
//!
//! Error types form the vocabulary for failure modes in the system.
//! Each variant tells what went wrong and where, so the retry layer can
//! decide what is worth another attempt and the loader can pick the
//! message shown to the user.

use crate::types::ValidationError;
use std::time::Duration;
use thiserror::Error;

/// Shown when the upstream refuses further requests for now.
pub const MSG_RATE_LIMITED: &str = "تم تجاوز الحد المسموح من الطلبات. يرجى المحاولة بعد قليل.";
/// Shown when a request (ours or the proxy's) ran out of time.
pub const MSG_TIMEOUT: &str = "انتهت مهلة الاتصال. يرجى المحاولة مرة أخرى.";
/// Shown for server-side failures and unusable response bodies.
pub const MSG_SERVER_ERROR: &str = "خطأ في الخادم. يرجى المحاولة لاحقاً.";
/// Fallback for everything else.
pub const MSG_LOAD_FAILED: &str = "فشل في تحميل البيانات";

/// Classification of a failed page fetch.
///
/// The classification is what the retry policy and the loader dispatch on;
/// the payloads are only for logs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The client-side bound on one request was exceeded.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 429 from the proxy endpoint.
    #[error("Rate limited by the proxy endpoint")]
    RateLimited,

    /// HTTP 504: the proxy gave up waiting for its upstream.
    #[error("Upstream timed out")]
    UpstreamTimeout,

    /// Any other HTTP 5xx.
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// The body was not a JSON array of records.
    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// A non-success status that is neither 429 nor 5xx.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection, DNS or body-read failure.
    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// Rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl FetchError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited,
            504 => Self::UpstreamTimeout,
            500..=599 => Self::ServerError { status, message },
            _ => Self::Http { status, message },
        }
    }

    /// Whether another attempt at the same page may succeed.
    ///
    /// Throttling and server-side failures are surfaced to the user at once;
    /// only local timeouts and generic transport/HTTP failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Http { .. } | Self::Transport { .. }
        )
    }

    /// Localized, human-readable message for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited => MSG_RATE_LIMITED,
            Self::UpstreamTimeout | Self::Timeout(_) => MSG_TIMEOUT,
            Self::ServerError { .. } | Self::MalformedResponse { .. } => MSG_SERVER_ERROR,
            Self::Http { .. } | Self::Transport { .. } | Self::Validation(_) => MSG_LOAD_FAILED,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Self::MalformedResponse {
                reason: err.to_string(),
            };
        }
        Self::Transport {
            message: err.to_string(),
        }
    }
}

/// Failure of the key-value persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Failed to build HTTP client: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type alias for convenience
pub type Result<T, E = AppError> = std::result::Result<T, E>;
