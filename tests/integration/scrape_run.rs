//! Orchestrator runs against on-disk state

use crate::support::{empty_page, items, options, ScriptedFetcher};
use listing_harvest::store::{FileStore, StorePaths, StateStore};
use listing_harvest::{Orchestrator, PageResult, Phase};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> FileStore {
    FileStore::new(StorePaths::for_worker(dir.path(), 1, 10))
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_refetching() {
    let dir = TempDir::new().unwrap();

    // First run loses authentication for good at page 6
    let broken = ScriptedFetcher::default().script(6, vec![PageResult::AuthExpired]);
    let mut first = Orchestrator::new(broken.clone(), store_in(&dir), options(1, 10));
    let partial = first.run().await;

    assert_eq!(first.phase(), Phase::Aborted);
    assert_eq!(partial.len(), 5);
    assert_eq!(store_in(&dir).load_checkpoint().unwrap(), 5);

    let healthy = ScriptedFetcher::default();
    let mut second = Orchestrator::new(healthy.clone(), store_in(&dir), options(1, 10));
    let records = second.run().await;

    assert_eq!(second.phase(), Phase::Done);
    assert_eq!(healthy.fetched(), vec![6, 7, 8, 9, 10]);
    assert_eq!(records.len(), 10);

    let state = store_in(&dir).load().unwrap();
    assert_eq!(state.last_completed_page, 10);
    assert_eq!(state.records.len(), 10);
}

#[tokio::test]
async fn test_rerun_after_completion_is_a_no_op() {
    let dir = TempDir::new().unwrap();

    let mut first = Orchestrator::new(ScriptedFetcher::default(), store_in(&dir), options(1, 4));
    first.run().await;

    let idle = ScriptedFetcher::default();
    let mut second = Orchestrator::new(idle.clone(), store_in(&dir), options(1, 4));
    let records = second.run().await;

    assert!(idle.fetched().is_empty());
    assert_eq!(*idle.auth_calls.lock().unwrap(), 0);
    assert_eq!(records.len(), 4);
}

#[tokio::test]
async fn test_empty_page_is_terminal() {
    let dir = TempDir::new().unwrap();
    let ids: Vec<u64> = (1..=16).collect();
    let fetcher = ScriptedFetcher::default()
        .script(40, vec![items(&ids)])
        .script(41, vec![empty_page()]);

    let mut orchestrator = Orchestrator::new(fetcher.clone(), store_in(&dir), options(40, 60));
    let records = orchestrator.run().await;

    assert_eq!(fetcher.fetched(), vec![40, 41]);
    assert_eq!(records.len(), 16);
    assert_eq!(store_in(&dir).load_checkpoint().unwrap(), 41);
}

#[tokio::test]
async fn test_failed_pages_survive_between_runs() {
    let dir = TempDir::new().unwrap();
    let mut opts = options(1, 5);
    opts.retry_failed = false;

    let flaky = ScriptedFetcher::default().script(3, vec![PageResult::Failure]);
    let mut first = Orchestrator::new(flaky, store_in(&dir), opts);
    first.run().await;

    assert_eq!(store_in(&dir).load_failed_pages().unwrap(), BTreeSet::from([3]));

    let recovered = ScriptedFetcher::default();
    let mut retry = Orchestrator::new(recovered.clone(), store_in(&dir), options(1, 5));
    let records = retry.retry_failed_only().await;

    assert_eq!(recovered.fetched(), vec![3]);
    assert!(store_in(&dir).load_failed_pages().unwrap().is_empty());
    assert_eq!(records.len(), 5);
    assert_eq!(store_in(&dir).load_records().unwrap().len(), 5);
}
