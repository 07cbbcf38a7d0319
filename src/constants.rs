// src/constants.rs
//! Domain constants that define the operational boundaries of the loader.
//!
//! Each constant is named for the domain concept it constrains, not its
//! technical role. Reading these constants should tell you how the catalog
//! grows: how much one load pulls in, when the feed is considered exhausted,
//! how patiently failures are retried and how often everything is refreshed.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Batch boundaries
// ---------------------------------------------------------------------------

/// Valid records one `load_more` tries to gather before it stops fetching.
pub const ITEMS_PER_BATCH: usize = 4;

/// Hard cap on records added by a single `load_more`.
///
/// A page can carry far more than a batch; anything past this cap is dropped
/// for the current load.
pub const MAX_ITEMS_PER_LOAD: usize = 24;

/// Consecutive pages without a single valid record after which the feed is
/// treated as exhausted.
pub const EXHAUSTION_THRESHOLD: u32 = 6;

// ---------------------------------------------------------------------------
// Upstream boundaries
// ---------------------------------------------------------------------------

/// Highest page number the proxy endpoint accepts.
pub const MAX_PAGE: u32 = 1000;

/// Client-side bound on one page request, independent of any server timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Retries after the first failed attempt of one page request.
pub const MAX_RETRIES: u32 = 3;

/// Unit of the linear backoff; retry `n` waits `n * RETRY_BASE_DELAY`.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// Inactivity after a successful load before the catalog is rebuilt from page 0.
pub const AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

// ---------------------------------------------------------------------------
// Proxy endpoint rate limit
// ---------------------------------------------------------------------------

/// Length of one fixed rate-limit window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Requests a single caller may make inside one window.
pub const RATE_LIMIT_MAX_REQUESTS: u32 = 30;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Prefix shared by every persisted key.
pub const STORAGE_PREFIX: &str = "dwa";

/// Logical key under which the favorites set is stored.
pub const FAVORITES_KEY: &str = "favs";

/// Logical key under which the last catalog snapshot is stored.
pub const CATALOG_KEY: &str = "catalog";

// ---------------------------------------------------------------------------
// Error display
// ---------------------------------------------------------------------------

/// Maximum characters shown when previewing malformed response bodies.
pub const ERROR_BODY_PREVIEW_LENGTH: usize = 200;
