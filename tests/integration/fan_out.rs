//! Fan-out driver, rate limiter and merge behaviour

use crate::support::{options, ScriptedFetcher};
use listing_harvest::fanout::{merge_by_identity, FanoutDriver, RateLimiter, COMBINED_FILE};
use listing_harvest::store::{FileStore, StorePaths};
use listing_harvest::{ListingPage, PageResult, PropertyRecord};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

fn titled(id: u64, title: &str) -> PropertyRecord {
    PropertyRecord::try_from(json!({ "applicationId": id, "title": title })).unwrap()
}

fn title_of(record: &PropertyRecord) -> &str {
    record.get("title").and_then(|t| t.as_str()).unwrap_or_default()
}

#[tokio::test]
async fn test_workers_cover_range_and_write_combined_output() {
    let dir = TempDir::new().unwrap();
    let shared = ScriptedFetcher::default();
    let driver = FanoutDriver::new(dir.path(), options(1, 1));

    let records = driver
        .run(1, 10, 3, 0.0, |_, _| Ok(shared.clone()))
        .await
        .unwrap();

    let ids: BTreeSet<String> = records.iter().filter_map(|r| r.identity()).collect();
    assert_eq!(ids.len(), 10);

    let mut fetched = shared.fetched();
    fetched.sort_unstable();
    assert_eq!(fetched, (1..=10).collect::<Vec<_>>());

    for (start, end) in [(1, 4), (5, 7), (8, 10)] {
        let store = FileStore::new(StorePaths::for_worker(dir.path(), start, end));
        assert_eq!(store.load_checkpoint().unwrap(), end);
    }

    let combined = std::fs::read_to_string(dir.path().join(COMBINED_FILE)).unwrap();
    let combined: Vec<PropertyRecord> = serde_json::from_str(&combined).unwrap();
    assert_eq!(combined.len(), 10);
}

#[tokio::test]
async fn test_later_range_wins_on_identity_collision() {
    let dir = TempDir::new().unwrap();
    let driver = FanoutDriver::new(dir.path(), options(1, 1));

    // Every page yields the same identity, titled by page number
    let records = driver
        .run(1, 6, 2, 0.0, |_, _| {
            let mut fetcher = ScriptedFetcher::default();
            for page in 1..=6 {
                let listing = ListingPage {
                    records: vec![titled(42, &format!("page {}", page))],
                    is_last: false,
                    total_pages: None,
                };
                fetcher = fetcher.script(page, vec![PageResult::Items(listing)]);
            }
            Ok(fetcher)
        })
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(title_of(&records[0]), "page 6");
}

#[tokio::test]
async fn test_crashed_worker_does_not_sink_siblings() {
    let dir = TempDir::new().unwrap();
    let driver = FanoutDriver::new(dir.path(), options(1, 1));

    let records = driver
        .run(1, 9, 3, 0.0, |start, _| {
            Ok(ScriptedFetcher {
                panic_on: (start == 4).then_some(5),
                ..Default::default()
            })
        })
        .await
        .unwrap();

    let ids: BTreeSet<String> = records.iter().filter_map(|r| r.identity()).collect();
    let expected: BTreeSet<String> = [1, 2, 3, 7, 8, 9].iter().map(|p| p.to_string()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_factory_error_fails_the_fan_out() {
    let dir = TempDir::new().unwrap();
    let driver = FanoutDriver::new(dir.path(), options(1, 1));

    let result = driver
        .run(1, 4, 2, 0.0, |_, _| -> Result<ScriptedFetcher, _> {
            Err(listing_harvest::HarvestError::Auth("no client".to_string()))
        })
        .await;

    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_spaces_concurrent_callers() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(250)));
    let stamps = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let limiter = Arc::clone(&limiter);
        let stamps = Arc::clone(&stamps);
        handles.push(tokio::spawn(async move {
            for _ in 0..3 {
                limiter.acquire().await;
                stamps.lock().unwrap().push(Instant::now());
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut stamps = stamps.lock().unwrap().clone();
    stamps.sort();
    assert_eq!(stamps.len(), 12);
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(250));
    }
}

#[test]
fn test_merge_is_idempotent_and_deterministic() {
    let worker_a = vec![titled(1, "a1"), titled(2, "a2")];
    let worker_b = vec![titled(2, "b2"), titled(3, "b3")];

    let doubled = merge_by_identity(vec![worker_a.clone(), worker_a.clone()]);
    assert_eq!(doubled, worker_a);

    let merged = merge_by_identity(vec![worker_a, worker_b]);
    let titles: Vec<&str> = merged.iter().map(title_of).collect();
    assert_eq!(titles, vec!["a1", "b2", "b3"]);
}
