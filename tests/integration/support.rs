//! Shared helpers for the integration tests

use async_trait::async_trait;
use listing_harvest::config::Config;
use listing_harvest::fetcher::PageFetcher;
use listing_harvest::{HarvestError, ListingPage, PageResult, PropertyRecord, ScrapeOptions};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A fetcher whose responses are decided by a per-page script
///
/// Unscripted pages return one record whose id is the page number.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    pub scripts: HashMap<u32, Vec<PageResult>>,
    pub log: Arc<Mutex<Vec<u32>>>,
    pub auth_calls: Arc<Mutex<u32>>,
    pub panic_on: Option<u32>,
}

impl ScriptedFetcher {
    pub fn script(mut self, page: u32, results: Vec<PageResult>) -> Self {
        self.scripts.insert(page, results);
        self
    }

    pub fn fetched(&self) -> Vec<u32> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn authenticate(&mut self) -> Result<(), HarvestError> {
        *self.auth_calls.lock().unwrap() += 1;
        Ok(())
    }

    async fn fetch(&mut self, page: u32, _max_attempts: u32) -> PageResult {
        if self.panic_on == Some(page) {
            panic!("scripted worker crash on page {}", page);
        }
        self.log.lock().unwrap().push(page);

        match self.scripts.get_mut(&page) {
            Some(results) if results.len() > 1 => results.remove(0),
            Some(results) if !results.is_empty() => results[0].clone(),
            _ => items(&[u64::from(page)]),
        }
    }
}

pub fn record(id: u64) -> PropertyRecord {
    PropertyRecord::try_from(json!({ "applicationId": id })).unwrap()
}

pub fn items(ids: &[u64]) -> PageResult {
    PageResult::Items(ListingPage {
        records: ids.iter().copied().map(record).collect(),
        is_last: false,
        total_pages: None,
    })
}

pub fn empty_page() -> PageResult {
    PageResult::Items(ListingPage {
        is_last: true,
        ..Default::default()
    })
}

/// Options for a fast run over `[start, end]`
pub fn options(start: u32, end: u32) -> ScrapeOptions {
    ScrapeOptions {
        start_page: start,
        end_page: Some(end),
        ..ScrapeOptions::from_config(&Config::default()).without_delays()
    }
}
