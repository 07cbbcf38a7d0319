mod common;

use common::{item, page_of, transport_error, ScriptedSource};
use pretty_assertions::assert_eq;
use pricelist::catalog::MergeReport;
use pricelist::constants::{AUTO_REFRESH_INTERVAL, MAX_ITEMS_PER_LOAD};
use pricelist::error::{MSG_LOAD_FAILED, MSG_RATE_LIMITED, MSG_SERVER_ERROR};
use pricelist::{
    CatalogLoader, Favorites, FetchError, IdentityKey, KeyValueStore, LoadOutcome, LoadPhase,
    LoaderSettings, MemoryStore, RawRecord,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn loader(source: Arc<ScriptedSource>) -> CatalogLoader {
    CatalogLoader::new(source, LoaderSettings::default())
}

fn names(loader: &CatalogLoader) -> Vec<String> {
    loader
        .entries()
        .into_iter()
        .map(|(_, record)| record.name)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn fills_one_batch_across_sparse_pages() {
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 1)));
    let loader = loader(source.clone());

    let outcome = loader.load_more().await;

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            pages: 4,
            merge: MergeReport {
                added: 4,
                duplicates: 0
            },
            exhausted: false,
        }
    );
    assert_eq!(source.calls(), vec![0, 1, 2, 3]);
    let status = loader.status();
    assert_eq!(status.cursor, 4);
    assert_eq!(status.phase, LoadPhase::Idle);
    assert!(status.last_sync.is_some());
}

#[tokio::test(start_paused = true)]
async fn consecutive_loads_continue_from_the_cursor() {
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 4)));
    let loader = loader(source.clone());

    loader.load_more().await;
    loader.load_more().await;

    assert_eq!(source.calls(), vec![0, 1]);
    assert_eq!(loader.len(), 8);
    assert_eq!(loader.status().cursor, 2);
}

#[tokio::test(start_paused = true)]
async fn one_load_adds_at_most_the_cap() {
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 100)));
    let loader = loader(source.clone());

    loader.load_more().await;

    assert_eq!(loader.len(), MAX_ITEMS_PER_LOAD);
    assert_eq!(source.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_feed_is_exhausted_after_six_pages() {
    let source = ScriptedSource::new(|_, _| Ok(Vec::new()));
    let loader = loader(source.clone());

    let outcome = loader.load_more().await;

    assert!(matches!(
        outcome,
        LoadOutcome::Loaded {
            pages: 6,
            exhausted: true,
            ..
        }
    ));
    assert_eq!(source.calls(), vec![0, 1, 2, 3, 4, 5]);
    let status = loader.status();
    assert!(!status.has_more);
    assert_eq!(status.empty_streak, 6);
    assert_eq!(status.cursor, 6);

    assert_eq!(loader.load_more().await, LoadOutcome::Skipped);
    assert_eq!(source.call_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn pages_of_only_invalid_records_count_as_empty() {
    let source = ScriptedSource::new(|page, _| {
        let junk: Vec<RawRecord> = vec![
            serde_json::from_value(json!({"name": "", "price": 5})).unwrap(),
            serde_json::from_value(json!({"name": "Free", "price": 0})).unwrap(),
            serde_json::from_value(json!({"name": "NaN", "price": "n/a"})).unwrap(),
        ];
        if page == 0 {
            let mut mixed = junk;
            mixed.push(item("ok", "Valid", 3.0));
            Ok(mixed)
        } else {
            Ok(junk)
        }
    });
    let loader = loader(source.clone());

    loader.load_more().await;

    assert_eq!(names(&loader), vec!["Valid".to_string()]);
    // page 0 held one valid record, pages 1..=6 none
    assert_eq!(source.call_count(), 7);
    assert!(!loader.has_more());
    loader.with_store(|store| {
        assert!(store.records().all(|r| !r.name.is_empty() && r.price > 0.0));
    });
}

#[tokio::test(start_paused = true)]
async fn a_valid_page_resets_the_empty_streak() {
    // empty, empty, one record, then empty forever
    let source = ScriptedSource::new(|page, _| match page {
        2 => Ok(page_of(page, 1)),
        _ => Ok(Vec::new()),
    });
    let loader = loader(source.clone());

    loader.load_more().await;

    assert_eq!(loader.len(), 1);
    assert_eq!(source.calls(), vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert!(!loader.has_more());
}

#[tokio::test(start_paused = true)]
async fn duplicates_across_pages_collapse_to_the_first() {
    let source = ScriptedSource::new(|page, _| {
        Ok(vec![
            item("shared", &format!("Shared from page {}", page), 1.0),
            item(&format!("own-{}", page), "Own", 2.0),
        ])
    });
    let loader = loader(source.clone());

    let outcome = loader.load_more().await;

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            pages: 2,
            merge: MergeReport {
                added: 3,
                duplicates: 1
            },
            exhausted: false,
        }
    );
    let entries = loader.entries();
    assert_eq!(entries[0].0, IdentityKey::from_raw_key("id:shared"));
    assert_eq!(entries[0].1.name, "Shared from page 0");
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let source = ScriptedSource::new(|page, call| {
        if call < 2 {
            Err(transport_error())
        } else {
            Ok(page_of(page, 4))
        }
    });
    let loader = loader(source.clone());

    let outcome = loader.load_more().await;

    assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
    assert_eq!(source.calls(), vec![0, 0, 0]);
    assert_eq!(loader.len(), 4);
    let status = loader.status();
    assert_eq!(status.retries, 2);
    assert_eq!(status.error, None);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_an_error_and_keep_the_store() {
    let source = ScriptedSource::new(|_, _| Err(transport_error()));
    let loader = loader(source.clone());

    let outcome = loader.load_more().await;

    assert_eq!(outcome, LoadOutcome::Failed(transport_error()));
    assert_eq!(source.call_count(), 4);
    assert!(loader.is_empty());
    let status = loader.status();
    assert_eq!(status.phase, LoadPhase::Error);
    assert_eq!(status.cursor, 0);
    assert_eq!(loader.error_message(), Some(MSG_LOAD_FAILED));
    assert!(!loader.is_loading());
}

#[tokio::test(start_paused = true)]
async fn failure_mid_batch_discards_the_partial_batch() {
    let source = ScriptedSource::new(|page, _| match page {
        0 => Ok(page_of(0, 1)),
        _ => Err(FetchError::from_status(503, "unavailable")),
    });
    let loader = loader(source.clone());

    let outcome = loader.load_more().await;

    assert!(matches!(outcome, LoadOutcome::Failed(FetchError::ServerError { .. })));
    assert_eq!(source.calls(), vec![0, 1]);
    assert!(loader.is_empty());
    assert_eq!(loader.status().cursor, 0);
    assert_eq!(loader.error_message(), Some(MSG_SERVER_ERROR));
}

#[tokio::test(start_paused = true)]
async fn throttling_is_not_retried_and_clearing_the_error_is_explicit() {
    let source = ScriptedSource::new(|page, call| {
        if call == 0 {
            Err(FetchError::RateLimited)
        } else {
            Ok(page_of(page, 4))
        }
    });
    let loader = loader(source.clone());

    assert_eq!(
        loader.load_more().await,
        LoadOutcome::Failed(FetchError::RateLimited)
    );
    assert_eq!(source.call_count(), 1);
    assert_eq!(loader.error_message(), Some(MSG_RATE_LIMITED));

    loader.clear_error();
    assert_eq!(loader.status().phase, LoadPhase::Idle);
    assert_eq!(loader.error_message(), None);

    assert!(matches!(loader.load_more().await, LoadOutcome::Loaded { .. }));
    assert_eq!(loader.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn a_new_load_clears_the_previous_error() {
    let source = ScriptedSource::new(|page, call| {
        if call == 0 {
            Err(FetchError::UpstreamTimeout)
        } else {
            Ok(page_of(page, 4))
        }
    });
    let loader = loader(source);

    loader.load_more().await;
    assert_eq!(loader.status().phase, LoadPhase::Error);

    loader.load_more().await;
    assert_eq!(loader.status().phase, LoadPhase::Idle);
    assert_eq!(loader.error_message(), None);
}

#[tokio::test(start_paused = true)]
async fn load_more_while_loading_is_a_no_op() {
    let source = ScriptedSource::with_delay(Duration::from_secs(1), |page, _| Ok(page_of(page, 4)));
    let loader = loader(source.clone());

    let (first, second) = tokio::join!(loader.load_more(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(loader.is_loading());
        assert_eq!(loader.status().phase, LoadPhase::Loading);
        loader.load_more().await
    });

    assert!(matches!(first, LoadOutcome::Loaded { .. }));
    assert_eq!(second, LoadOutcome::Skipped);
    assert_eq!(source.calls(), vec![0]);
    assert_eq!(loader.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn refresh_while_loading_is_a_no_op() {
    let source = ScriptedSource::with_delay(Duration::from_secs(1), |page, _| Ok(page_of(page, 4)));
    let loader = loader(source.clone());

    let (_, refreshed) = tokio::join!(loader.load_more(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        loader.refresh().await
    });

    assert_eq!(refreshed, LoadOutcome::Skipped);
    assert_eq!(source.calls(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn refresh_resets_the_catalog_but_not_favorites() {
    let source = ScriptedSource::new(|page, call| {
        if call == 0 {
            Ok(page_of(page, 4))
        } else {
            Err(FetchError::RateLimited)
        }
    });
    let loader = loader(source.clone());
    let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut favorites = Favorites::load(backend);

    loader.load_more().await;
    let (favorite_key, _) = loader.entries().remove(0);
    favorites.toggle(&favorite_key);

    loader.refresh().await;

    assert!(loader.is_empty());
    let status = loader.status();
    assert_eq!(status.cursor, 0);
    assert!(status.has_more);
    assert_eq!(status.empty_streak, 0);
    assert!(favorites.is_favorite(&favorite_key));
    assert_eq!(favorites.count(), 1);
    assert_eq!(source.calls(), vec![0, 0]);
}

#[tokio::test(start_paused = true)]
async fn refresh_revives_an_exhausted_feed() {
    let source = ScriptedSource::new(|page, call| {
        if call < 6 {
            Ok(Vec::new())
        } else {
            Ok(page_of(page, 4))
        }
    });
    let loader = loader(source.clone());

    loader.load_more().await;
    assert!(!loader.has_more());

    let outcome = loader.refresh().await;

    assert!(matches!(outcome, LoadOutcome::Loaded { exhausted: false, .. }));
    assert!(loader.has_more());
    assert_eq!(loader.len(), 4);
    assert_eq!(loader.status().cursor, 1);
    assert_eq!(source.calls().last(), Some(&0));
}

#[tokio::test(start_paused = true)]
async fn auto_refresh_reloads_from_the_first_page() {
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 4)));
    let loader = loader(source.clone());

    loader.load_more().await;
    loader.load_more().await;
    assert_eq!(loader.status().cursor, 2);
    assert!(loader.auto_refresh_scheduled());

    tokio::time::sleep(AUTO_REFRESH_INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(source.calls(), vec![0, 1]);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.calls(), vec![0, 1, 0]);
    assert_eq!(loader.status().cursor, 1);
    assert_eq!(loader.len(), 4);
    // the refresh's own load scheduled the next one
    assert!(loader.auto_refresh_scheduled());
}

#[tokio::test(start_paused = true)]
async fn every_load_postpones_the_auto_refresh() {
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 4)));
    let loader = loader(source.clone());

    loader.load_more().await;
    tokio::time::sleep(AUTO_REFRESH_INTERVAL / 2).await;
    loader.load_more().await;
    tokio::time::sleep(AUTO_REFRESH_INTERVAL / 2 + Duration::from_secs(1)).await;

    // the first timer was canceled by the second load
    assert_eq!(source.calls(), vec![0, 1]);
    assert_eq!(loader.len(), 8);
}

#[tokio::test(start_paused = true)]
async fn canceled_auto_refresh_never_fires() {
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 4)));
    let loader = loader(source.clone());

    loader.load_more().await;
    assert!(loader.cancel_auto_refresh());
    tokio::time::sleep(AUTO_REFRESH_INTERVAL * 2).await;

    assert_eq!(source.calls(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn disabled_auto_refresh_schedules_nothing() {
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 4)));
    let loader = CatalogLoader::new(
        source,
        LoaderSettings {
            auto_refresh: None,
            ..LoaderSettings::default()
        },
    );

    loader.load_more().await;
    assert!(!loader.auto_refresh_scheduled());
}

#[tokio::test(start_paused = true)]
async fn snapshots_let_a_new_session_resume() {
    let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 4)));
    let first = CatalogLoader::with_persistence(
        source.clone(),
        LoaderSettings::default(),
        backend.clone(),
    );
    first.load_more().await;
    first.load_more().await;

    let second = CatalogLoader::with_persistence(source, LoaderSettings::default(), backend);
    assert!(second.restore_snapshot());

    assert_eq!(names(&second), names(&first));
    assert_eq!(second.records(), first.records());
    assert_eq!(second.status().cursor, 2);
    assert!(!second.restore_snapshot());
}

#[tokio::test(start_paused = true)]
async fn snapshot_write_failures_do_not_fail_the_load() {
    let backend = Arc::new(MemoryStore::new());
    backend.reject_writes(true);
    let source = ScriptedSource::new(|page, _| Ok(page_of(page, 4)));
    let loader = CatalogLoader::with_persistence(source, LoaderSettings::default(), backend);

    assert!(matches!(loader.load_more().await, LoadOutcome::Loaded { .. }));
    assert_eq!(loader.len(), 4);
    assert_eq!(loader.status().phase, LoadPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn search_runs_over_loaded_records() {
    let source = ScriptedSource::new(|_, _| {
        Ok(vec![
            serde_json::from_value(json!({"id": 1, "name": "Abril 250", "arabic": "ابريل ٢٥٠", "price": 30})).unwrap(),
            serde_json::from_value(json!({"id": 2, "name": "Panadol", "arabic": "بنادول", "price": 20})).unwrap(),
            item("3", "Brufen", 15.0),
            item("4", "Cataflam", 25.0),
        ])
    });
    let loader = loader(source);
    loader.load_more().await;

    let hits = loader.search("ABRIL");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, IdentityKey::from_raw_key("id:1"));
    assert_eq!(loader.search("٢٥٠").len(), 1);
    assert_eq!(loader.search("ابريل").len(), 1);
    assert_eq!(loader.search("").len(), 4);
}

#[tokio::test(start_paused = true)]
async fn failed_load_after_a_good_one_keeps_everything_in_place() {
    // page 0 fills a batch, pages 1 and 2 are empty, page 3 never answers
    let source = ScriptedSource::new(|page, _| match page {
        0 => Ok(page_of(0, 4)),
        1 | 2 => Ok(Vec::new()),
        _ => Err(transport_error()),
    });
    let loader = loader(source.clone());

    loader.load_more().await;
    let before = loader.status();
    let records_before = loader.records();
    assert_eq!(before.cursor, 1);

    let outcome = loader.load_more().await;

    assert_eq!(outcome, LoadOutcome::Failed(transport_error()));
    assert_eq!(source.calls(), vec![0, 1, 2, 3, 3, 3, 3]);
    assert_eq!(loader.records(), records_before);
    let after = loader.status();
    assert_eq!(after.cursor, before.cursor);
    assert_eq!(after.empty_streak, before.empty_streak);
    assert_eq!(after.has_more, before.has_more);
    assert_eq!(after.last_sync, before.last_sync);
    assert_eq!(after.phase, LoadPhase::Error);
    assert_eq!(after.retries, 3);
}

#[tokio::test(start_paused = true)]
async fn restored_sessions_keep_exhaustion_and_refresh_on_schedule() {
    let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let source = ScriptedSource::new(|page, _| match page {
        0 => Ok(page_of(0, 4)),
        _ => Ok(Vec::new()),
    });
    let first = CatalogLoader::with_persistence(
        source.clone(),
        LoaderSettings::default(),
        backend.clone(),
    );
    first.load_more().await;
    first.load_more().await;
    assert!(!first.has_more());
    first.cancel_auto_refresh();

    let second = CatalogLoader::with_persistence(source.clone(), LoaderSettings::default(), backend);
    assert!(second.restore_snapshot());

    let status = second.status();
    assert_eq!(status.empty_streak, 6);
    assert!(!status.has_more);
    assert_eq!(status.cursor, 7);
    assert_eq!(second.load_more().await, LoadOutcome::Skipped);
    assert!(second.auto_refresh_scheduled());

    let calls_before = source.call_count();
    tokio::time::sleep(AUTO_REFRESH_INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(source.calls()[calls_before], 0);
    assert!(second.has_more());
    assert_eq!(second.len(), 4);
}
