// src/lib.rs
//! pricelist library: incremental loading of a paged remote price list.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Error handling**: `AppError`, `FetchError`, `StorageError`, `ValidationError`
//! - **Configuration**: `CatalogConfig`, `CommandLineInput`
//! - **Domain types**: `Record`, `RawRecord`, `IdentityKey`, `normalize`
//! - **Upstream**: `PageSource`, `HttpPageSource`, `PageGateway`, `GatewayPageSource`
//! - **Catalog**: `CatalogLoader`, `IncrementalStore`, `RetryPolicy`
//! - **User state**: `Favorites`, versioned storage backends

pub mod api;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod error_recovery;
pub mod favorites;
pub mod search;
pub mod storage;
pub mod types;

// --- Error Handling ---
pub use crate::error::{AppError, FetchError, StorageError};
pub use crate::types::ValidationError;

// --- Configuration ---
pub use crate::config::{CatalogConfig, CommandLineInput, FeedSource};

// --- Domain Types ---
pub use crate::types::{normalize, IdentityKey, RawRecord, Record};

// --- Upstream ---
pub use crate::api::{
    FixedWindowRateLimiter, FormUpstream, GatewayPageSource, HttpPageSource, PageGateway,
    PageSource, UpstreamFeed,
};

// --- Catalog ---
pub use crate::catalog::{
    CatalogLoader, IncrementalStore, LoadOutcome, LoadPhase, LoaderSettings, LoaderStatus,
};
pub use crate::error_recovery::RetryPolicy;

// --- User State ---
pub use crate::favorites::Favorites;
pub use crate::search::search;
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore, VersionedStorage};
