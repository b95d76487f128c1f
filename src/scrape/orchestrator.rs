//! Scrape orchestrator - the sequential page loop
//!
//! One orchestrator drives one page fetcher over one page range:
//! - Restoring the checkpoint, records and failed-page ledger on start
//! - Resolving the end page (explicit, sitemap estimate, or default)
//! - Fetching pages in increasing order and accumulating records
//! - Re-authenticating once when the token is rejected
//! - Checkpointing on batch size or page interval, and at the end
//! - Re-fetching failed pages with a larger attempt budget

use crate::config::{seconds, Config};
use crate::fetcher::{jittered, PageFetcher};
use crate::model::{PageResult, PropertyRecord};
use crate::pagination::SitemapOracle;
use crate::store::StateStore;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Parameters of one scrape run
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOptions {
    pub start_page: u32,

    /// Last page to fetch; `None` means estimate it
    pub end_page: Option<u32>,

    /// Records collected before a checkpoint is forced
    pub batch_size: usize,

    /// Checkpoint whenever the page number is a multiple of this
    pub checkpoint_interval: u32,

    pub max_attempts: u32,

    /// Attempt budget for pages from the failed ledger
    pub retry_max_attempts: u32,

    /// Re-fetch failed pages once the range is exhausted
    pub retry_failed: bool,

    /// Stop on the oracle's last-page signals and estimate the end from the sitemap
    pub detect_last_page: bool,

    /// End page when nothing better is known
    pub default_end_page: u32,

    /// Politeness delay between pages and after re-authentication
    pub page_delay: (Duration, Duration),

    /// Delay between failed-page retries
    pub retry_delay: (Duration, Duration),
}

impl ScrapeOptions {
    pub fn from_config(config: &Config) -> Self {
        let scrape = &config.scrape;
        Self {
            start_page: scrape.start_page,
            end_page: None,
            batch_size: scrape.batch_size,
            checkpoint_interval: scrape.checkpoint_interval,
            max_attempts: scrape.max_attempts,
            retry_max_attempts: scrape.retry_max_attempts,
            retry_failed: true,
            detect_last_page: true,
            default_end_page: scrape.default_end_page,
            page_delay: (
                seconds(scrape.min_delay),
                seconds(scrape.max_delay),
            ),
            retry_delay: (
                seconds(scrape.min_delay * 1.5),
                seconds(scrape.max_delay * 1.5),
            ),
        }
    }

    /// Drops every delay; used for tests and cache-only replays
    pub fn without_delays(mut self) -> Self {
        self.page_delay = (Duration::ZERO, Duration::ZERO);
        self.retry_delay = (Duration::ZERO, Duration::ZERO);
        self
    }
}

/// States of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Authenticating,
    Fetching,
    CheckpointingSave,
    RetryingFailed,
    Done,
    Aborted,
}

/// Drives a `PageFetcher` across a page range, persisting through a `StateStore`
pub struct Orchestrator<F, S> {
    fetcher: F,
    store: S,
    oracle: Option<SitemapOracle>,
    options: ScrapeOptions,
    phase: Phase,
    records: Vec<PropertyRecord>,
    failed_pages: BTreeSet<u32>,
    last_completed_page: u32,
}

impl<F: PageFetcher, S: StateStore> Orchestrator<F, S> {
    pub fn new(fetcher: F, store: S, options: ScrapeOptions) -> Self {
        Self {
            fetcher,
            store,
            oracle: None,
            options,
            phase: Phase::Init,
            records: Vec::new(),
            failed_pages: BTreeSet::new(),
            last_completed_page: 0,
        }
    }

    /// Uses the sitemap to estimate the end page when none is given
    pub fn with_sitemap_oracle(mut self, oracle: SitemapOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_completed_page(&self) -> u32 {
        self.last_completed_page
    }

    pub fn failed_pages(&self) -> &BTreeSet<u32> {
        &self.failed_pages
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs the scrape and returns every accumulated record
    ///
    /// An aborted run returns what was accumulated so far; inspect `phase`,
    /// `last_completed_page` and `failed_pages` to tell it from a clean one.
    pub async fn run(&mut self) -> Vec<PropertyRecord> {
        let started = Instant::now();
        self.enter(Phase::Init);

        if !self.restore() {
            return std::mem::take(&mut self.records);
        }

        let mut end_page = resolve_end_page(&self.options, self.oracle.as_ref()).await;

        if self.last_completed_page >= end_page {
            tracing::info!(
                "Already finished up to page {} (end page {}), nothing to fetch",
                self.last_completed_page,
                end_page
            );
            self.enter(Phase::Done);
            return std::mem::take(&mut self.records);
        }

        self.enter(Phase::Authenticating);
        if let Err(e) = self.fetcher.authenticate().await {
            tracing::error!("Unable to proceed without token: {}", e);
            self.enter(Phase::Aborted);
            return std::mem::take(&mut self.records);
        }

        self.enter(Phase::Fetching);
        let first_page = self
            .last_completed_page
            .saturating_add(1)
            .max(self.options.start_page);

        let mut current = first_page;
        let mut last_attempted = None;
        let mut batch_len = 0usize;
        let mut aborted = false;

        while current <= end_page {
            tracing::info!("Scraping page {} of {}", current, end_page);

            let Some(result) = self
                .fetch_with_reauth(current, self.options.max_attempts, Phase::Fetching)
                .await
            else {
                tracing::error!("Authentication lost at page {}, aborting run", current);
                aborted = true;
                break;
            };
            let mut reached_end = false;
            match result {
                PageResult::Items(listing) => {
                    if self.options.detect_last_page {
                        if let Some(total) = listing.total_pages {
                            if total >= current && total < end_page {
                                tracing::info!("Response reports {} pages, narrowing end page", total);
                                end_page = total;
                            }
                        }
                    }

                    if listing.is_empty() && self.options.detect_last_page {
                        tracing::info!("No properties found on page {}, reached the end", current);
                        reached_end = true;
                    } else {
                        tracing::info!(
                            "Successfully fetched page {} with {} properties",
                            current,
                            listing.records.len()
                        );
                        reached_end = self.options.detect_last_page && listing.is_last;
                        batch_len += listing.records.len();
                        self.records.extend(listing.records);
                    }
                }
                PageResult::Failure => {
                    tracing::warn!("Skipping page {} due to failure", current);
                    self.failed_pages.insert(current);
                }
                PageResult::AuthExpired => {
                    // fetch_with_reauth never yields this
                    aborted = true;
                    break;
                }
            }

            last_attempted = Some(current);

            if reached_end {
                tracing::info!("Detected last page at {}", current);
                break;
            }

            let on_interval = self.options.checkpoint_interval > 0
                && current % self.options.checkpoint_interval == 0;
            if batch_len >= self.options.batch_size || on_interval {
                if self.checkpoint(current) {
                    batch_len = 0;
                }
                self.enter(Phase::Fetching);
            }

            current += 1;
            if current <= end_page {
                tokio::time::sleep(jittered(self.options.page_delay)).await;
            }
        }

        // Final flush reflects the last page actually processed
        match last_attempted {
            Some(page) => {
                self.checkpoint(page.max(self.last_completed_page));
            }
            None => tracing::debug!("No page processed, leaving the checkpoint untouched"),
        }

        if aborted {
            self.enter(Phase::Aborted);
        } else if self.options.retry_failed && !self.failed_pages.is_empty() {
            self.retry_failed_pages().await;
            if self.phase != Phase::Aborted {
                self.enter(Phase::Done);
            }
        } else {
            self.enter(Phase::Done);
        }

        tracing::info!(
            "Run finished in {:?}: {} records, last page {}, {} failed pages",
            started.elapsed(),
            self.records.len(),
            self.last_completed_page,
            self.failed_pages.len()
        );

        std::mem::take(&mut self.records)
    }

    /// Only re-fetches the pages recorded in the failed ledger
    pub async fn retry_failed_only(&mut self) -> Vec<PropertyRecord> {
        self.enter(Phase::Init);
        if !self.restore() {
            return std::mem::take(&mut self.records);
        }

        if self.failed_pages.is_empty() {
            tracing::info!("No failed pages to retry");
        } else {
            self.retry_failed_pages().await;
        }

        if self.phase != Phase::Aborted {
            self.enter(Phase::Done);
        }
        std::mem::take(&mut self.records)
    }

    fn enter(&mut self, phase: Phase) {
        tracing::trace!("Orchestrator {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Loads prior state; returns false (and aborts) if it can't be read
    fn restore(&mut self) -> bool {
        match self.store.load() {
            Ok(state) => {
                if state.last_completed_page > 0 || !state.records.is_empty() {
                    tracing::info!(
                        "Resuming after page {} with {} records and {} failed pages",
                        state.last_completed_page,
                        state.records.len(),
                        state.failed_pages.len()
                    );
                }
                self.last_completed_page = state.last_completed_page;
                self.records = state.records;
                self.failed_pages = state.failed_pages;
                true
            }
            Err(e) => {
                // Starting over would overwrite the unreadable documents
                tracing::error!("Failed to load saved state: {}", e);
                self.enter(Phase::Aborted);
                false
            }
        }
    }

    /// Fetches a page, re-authenticating once if the token was rejected
    ///
    /// Returns `None` when authentication can't be recovered.
    async fn fetch_with_reauth(
        &mut self,
        page: u32,
        max_attempts: u32,
        resume: Phase,
    ) -> Option<PageResult> {
        let result = self.fetcher.fetch(page, max_attempts).await;
        if result != PageResult::AuthExpired {
            return Some(result);
        }

        tracing::info!("Refreshing authentication token");
        self.enter(Phase::Authenticating);
        if let Err(e) = self.fetcher.authenticate().await {
            tracing::error!("Failed to refresh token after auth error: {}", e);
            return None;
        }
        self.enter(resume);

        tokio::time::sleep(jittered(self.options.page_delay)).await;

        match self.fetcher.fetch(page, max_attempts).await {
            PageResult::AuthExpired => {
                tracing::error!("Fresh token rejected for page {}", page);
                None
            }
            result => Some(result),
        }
    }

    /// Persists records, ledger and checkpoint; returns whether it succeeded
    ///
    /// A failed write keeps the in-memory state for the next flush.
    fn checkpoint(&mut self, page: u32) -> bool {
        self.enter(Phase::CheckpointingSave);
        let page = page.max(self.last_completed_page);

        match self.store.save_all(&self.records, page, &self.failed_pages) {
            Ok(()) => {
                self.last_completed_page = page;
                tracing::info!("Saved checkpoint at page {}", page);
                true
            }
            Err(e) => {
                tracing::error!("Checkpoint at page {} failed: {}", page, e);
                false
            }
        }
    }

    async fn retry_failed_pages(&mut self) {
        self.enter(Phase::RetryingFailed);
        let pages: Vec<u32> = self.failed_pages.iter().copied().collect();
        tracing::info!("Retrying {} failed pages", pages.len());

        let mut recovered = 0usize;
        for page in pages {
            tracing::info!("Retrying page {}", page);

            if let Err(e) = self.fetcher.authenticate().await {
                tracing::error!("Failed to get auth token for retries: {}", e);
                self.enter(Phase::Aborted);
                break;
            }

            let result = self
                .fetch_with_reauth(page, self.options.retry_max_attempts, Phase::RetryingFailed)
                .await;

            match result {
                Some(PageResult::Items(listing)) => {
                    tracing::info!(
                        "Successfully fetched page {} on retry with {} properties",
                        page,
                        listing.records.len()
                    );
                    recovered += listing.records.len();
                    self.records.extend(listing.records);
                    self.failed_pages.remove(&page);

                    // Records go to disk before the ledger forgets the page
                    if let Err(e) = self.store.save_records(&self.records) {
                        tracing::error!("Failed to save records after retrying page {}: {}", page, e);
                    }
                }
                Some(_) => tracing::warn!("Failed to fetch page {} again", page),
                None => {
                    tracing::error!("Failed to refresh token during retries");
                    self.enter(Phase::Aborted);
                }
            }

            if let Err(e) = self.store.save_failed_pages(&self.failed_pages) {
                tracing::error!("Failed to save failed-page ledger: {}", e);
            }

            if self.phase == Phase::Aborted {
                break;
            }

            tokio::time::sleep(jittered(self.options.retry_delay)).await;
        }

        tracing::info!(
            "Retry results: {} properties fetched, {} pages still failed",
            recovered,
            self.failed_pages.len()
        );
    }
}

/// Explicit end page first, then the sitemap estimate, then the default
async fn resolve_end_page(options: &ScrapeOptions, oracle: Option<&SitemapOracle>) -> u32 {
    if let Some(end_page) = options.end_page {
        return end_page;
    }

    match oracle {
        Some(oracle) if options.detect_last_page => {
            let end_page = oracle.estimate_upper_bound().await;
            tracing::info!("Auto-detected last page: {}", end_page);
            end_page
        }
        _ => {
            tracing::info!("Using default last page: {}", options.default_end_page);
            options.default_end_page
        }
    }
}
