use crate::constants::{
    AUTO_REFRESH_INTERVAL, EXHAUSTION_THRESHOLD, ITEMS_PER_BATCH, MAX_ITEMS_PER_LOAD, MAX_RETRIES,
    REQUEST_TIMEOUT, RETRY_BASE_DELAY,
};
use crate::error::AppError;
use crate::storage::FileStore;
use crate::types::ValidationError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Parsed command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    /// Proxy endpoint serving `POST {"page": n}` (e.g. "https://example.com/api/drugs")
    #[arg(short, long, env = "PRICELIST_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Raw upstream feed; pages are proxied in-process instead of through --endpoint
    #[arg(short, long, env = "PRICELIST_UPSTREAM", conflicts_with = "endpoint")]
    pub upstream: Option<String>,

    /// Number of batches to load (0 = until the feed is exhausted)
    #[arg(short, long, default_value_t = 1)]
    pub batches: u32,

    /// Only print records whose name contains this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// Flip the favorite flag of this identity key before listing
    #[arg(long)]
    pub toggle_favorite: Option<String>,

    /// Only print favorited records
    #[arg(long, default_value_t = false)]
    pub favorites_only: bool,

    /// Remove every favorite before listing
    #[arg(long, default_value_t = false)]
    pub clear_favorites: bool,

    /// Start from the catalog snapshot of the previous run
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// Delete the saved catalog snapshot before loading
    #[arg(long, default_value_t = false, conflicts_with = "resume")]
    pub clear_cache: bool,

    /// Directory for favorites and catalog snapshots
    #[arg(short = 'd', long)]
    pub storage_dir: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Valid records one batch aims for
    #[arg(long, default_value_t = ITEMS_PER_BATCH)]
    pub batch_size: usize,

    /// Retries per page after the first failed attempt
    #[arg(long, default_value_t = MAX_RETRIES)]
    pub retries: u32,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Where pages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// A deployed proxy endpoint.
    Proxy(Url),
    /// The raw upstream, proxied in-process.
    Upstream(Url),
}

/// Resolved configuration, validated and ready to build a loader.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub feed: FeedSource,
    pub request_timeout: Duration,
    pub items_per_batch: usize,
    pub max_items_per_load: usize,
    pub exhaustion_threshold: u32,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub auto_refresh: Option<Duration>,
    pub storage_dir: PathBuf,
    pub batches: u32,
    pub search: Option<String>,
    pub toggle_favorite: Option<String>,
    pub favorites_only: bool,
    pub clear_favorites: bool,
    pub resume: bool,
    pub clear_cache: bool,
    pub verbose: bool,
}

impl CatalogConfig {
    /// Resolves a complete configuration from CLI input and environment.
    pub fn resolve(cli: CommandLineInput) -> Result<Self, AppError> {
        let feed = match (cli.endpoint, cli.upstream) {
            (Some(endpoint), _) => FeedSource::Proxy(parse_url(&endpoint)?),
            (None, Some(upstream)) => FeedSource::Upstream(parse_url(&upstream)?),
            (None, None) => {
                return Err(AppError::MissingConfiguration(
                    "either --endpoint (PRICELIST_ENDPOINT) or --upstream (PRICELIST_UPSTREAM) must be set"
                        .to_string(),
                ))
            }
        };

        let items_per_batch = bounded("batch-size", cli.batch_size as u64, 1, MAX_ITEMS_PER_LOAD as u64)?;
        let timeout = bounded("timeout", cli.timeout, 1, 300)?;
        let max_retries = bounded("retries", cli.retries.into(), 0, 10)?;

        Ok(CatalogConfig {
            feed,
            request_timeout: Duration::from_secs(timeout),
            items_per_batch: items_per_batch as usize,
            max_retries: max_retries as u32,
            storage_dir: cli
                .storage_dir
                .map(PathBuf::from)
                .unwrap_or_else(FileStore::default_dir),
            batches: cli.batches,
            search: cli.search.filter(|q| !q.trim().is_empty()),
            toggle_favorite: cli.toggle_favorite,
            favorites_only: cli.favorites_only,
            clear_favorites: cli.clear_favorites,
            resume: cli.resume,
            clear_cache: cli.clear_cache,
            verbose: cli.verbose,
            ..Self::default()
        })
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            feed: FeedSource::Proxy(Self::example_endpoint()),
            request_timeout: REQUEST_TIMEOUT,
            items_per_batch: ITEMS_PER_BATCH,
            max_items_per_load: MAX_ITEMS_PER_LOAD,
            exhaustion_threshold: EXHAUSTION_THRESHOLD,
            max_retries: MAX_RETRIES,
            retry_base_delay: RETRY_BASE_DELAY,
            auto_refresh: Some(AUTO_REFRESH_INTERVAL),
            storage_dir: PathBuf::from(".pricelist"),
            batches: 1,
            search: None,
            toggle_favorite: None,
            favorites_only: false,
            clear_favorites: false,
            resume: false,
            clear_cache: false,
            verbose: false,
        }
    }
}

impl CatalogConfig {
    fn example_endpoint() -> Url {
        Url::parse("http://localhost:3000/api/drugs").expect("Example endpoint should always be valid")
    }
}

fn parse_url(input: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(input).map_err(|e| ValidationError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::InvalidUrl {
            url: input.to_string(),
            reason: "Only HTTP and HTTPS URLs are supported".to_string(),
        });
    }
    Ok(url)
}

fn bounded(field: &'static str, value: u64, min: u64, max: u64) -> Result<u64, ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfBounds {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}
