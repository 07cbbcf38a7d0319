// src/main.rs

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use pricelist::catalog::CatalogPersistence;
use pricelist::{
    CatalogConfig, CatalogLoader, CommandLineInput, Favorites, FeedSource, FileStore,
    FixedWindowRateLimiter, FormUpstream, GatewayPageSource, HttpPageSource, IdentityKey,
    KeyValueStore, LoadOutcome, LoaderSettings, PageGateway, PageSource, Record,
};
use std::fs;
use std::sync::Arc;

/// Caller identity used for the in-process gateway's rate limit.
const LOCAL_CALLER: &str = "local";

/// Sets up logging configuration.
fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let log_file_path = std::env::temp_dir().join("pricelist.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "{m}{n}"
    };

    let stderr_appender = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr_appender)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file_appender)),
        )
        .build(
            Root::builder()
                .appender("stderr")
                .appender("file")
                .build(log_level),
        )?;

    log4rs::init_config(config)?;
    log::info!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

/// Builds the page source the configuration asks for.
fn build_source(config: &CatalogConfig) -> anyhow::Result<Arc<dyn PageSource>> {
    let source: Arc<dyn PageSource> = match &config.feed {
        FeedSource::Proxy(endpoint) => {
            let source = HttpPageSource::new(endpoint.clone(), config.request_timeout)?;
            log::info!("Reading pages from proxy endpoint {}", source.endpoint());
            Arc::new(source)
        }
        FeedSource::Upstream(upstream) => {
            log::info!("Proxying pages in-process from {}", upstream);
            let gateway = PageGateway::new(
                FormUpstream::new(upstream.clone())?,
                FixedWindowRateLimiter::default(),
            )
            .with_timeout(config.request_timeout);
            Arc::new(
                GatewayPageSource::new(Arc::new(gateway), LOCAL_CALLER)
                    .with_timeout(config.request_timeout),
            )
        }
    };
    Ok(source)
}

/// Loads the requested number of batches, stopping early on failure or
/// exhaustion.
async fn load_batches(loader: &CatalogLoader, batches: u32) {
    let mut loaded = 0;
    while batches == 0 || loaded < batches {
        match loader.load_more().await {
            LoadOutcome::Loaded { merge, .. } => {
                loaded += 1;
                log::info!("Batch {}: {} new records", loaded, merge.added);
            }
            LoadOutcome::Skipped => break,
            LoadOutcome::Failed(e) => {
                log::debug!("Load failed: {:?}", e);
                break;
            }
        }
    }
}

fn print_record(key: &IdentityKey, record: &Record, favorite: bool) {
    let star = if favorite { "★" } else { " " };
    let old_price = match record.old_price {
        Some(old) if record.is_discounted() => format!(" (was {:.2})", old),
        _ => String::new(),
    };
    let arabic = record
        .arabic
        .as_deref()
        .map(|a| format!(" / {}", a))
        .unwrap_or_default();
    println!(
        "{} {}  {}{}  {:.2}{}",
        star, key, record.name, arabic, record.price, old_price
    );
}

async fn run(config: &CatalogConfig) -> anyhow::Result<()> {
    let store = FileStore::new(&config.storage_dir);
    log::info!("Keeping favorites and snapshots in {}", store.dir().display());
    let backend: Arc<dyn KeyValueStore> = Arc::new(store);

    if config.clear_cache {
        CatalogPersistence::new(backend.clone())
            .clear()
            .context("clearing the catalog snapshot failed")?;
        println!("✓ Catalog snapshot cleared");
    }

    let source = build_source(config)?;
    let settings = LoaderSettings {
        // One-shot process: nothing would be around to see the refresh.
        auto_refresh: None,
        ..LoaderSettings::from(config)
    };
    let loader = CatalogLoader::with_persistence(source, settings, backend.clone());
    let mut favorites = Favorites::load(backend);

    if config.clear_favorites {
        favorites.clear_all();
        println!("✓ Favorites cleared");
    }

    if let Some(key) = &config.toggle_favorite {
        let key = IdentityKey::from_raw_key(key.as_str());
        if favorites.toggle(&key) {
            println!("✓ Added {} to favorites", key);
        } else {
            println!("✓ Removed {} from favorites", key);
        }
    }

    if config.resume && loader.restore_snapshot() {
        println!("📦 Resumed {} records from the previous run", loader.len());
    }

    load_batches(&loader, config.batches).await;

    let entries = match &config.search {
        Some(query) => loader.search(query),
        None => loader.entries(),
    };
    for (key, record) in &entries {
        let favorite = favorites.is_favorite(key);
        if config.favorites_only && !favorite {
            continue;
        }
        print_record(key, record, favorite);
    }

    let status = loader.status();
    let synced = status
        .last_sync
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "📄 {} records loaded (next page {}, last sync {}, {} favorites){}",
        status.records,
        status.cursor,
        synced,
        favorites.count(),
        if status.has_more { "" } else { ", end of feed" }
    );

    if let Some(failure) = status.error {
        eprintln!("⚠️  {}", failure.message);
        return Err(failure.error).context("loading the price list failed");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLineInput::parse();

    setup_logging(cli.verbose)?;

    let config = CatalogConfig::resolve(cli)?;

    run(&config).await
}
