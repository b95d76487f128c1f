//! Concurrent fan-out over disjoint page ranges

use super::merge::merge_by_identity;
use super::partition;
use super::rate_limit::{RateLimitedFetcher, RateLimiter};
use crate::fetcher::PageFetcher;
use crate::model::PropertyRecord;
use crate::scrape::{Orchestrator, ScrapeOptions};
use crate::store::{write_document, FileStore, StorePaths};
use crate::HarvestError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// File the merged records of all workers are written to
pub const COMBINED_FILE: &str = "all_properties_combined.json";

/// Runs one orchestrator per page range, all paced by a single rate limiter
#[derive(Debug, Clone)]
pub struct FanoutDriver {
    output_dir: PathBuf,
    options: ScrapeOptions,
}

impl FanoutDriver {
    /// Creates a driver
    ///
    /// # Arguments
    ///
    /// * `output_dir` - Directory for the per-worker state files and the combined output
    /// * `options` - Template for every worker; the page range is overridden per worker
    pub fn new(output_dir: impl Into<PathBuf>, options: ScrapeOptions) -> Self {
        Self {
            output_dir: output_dir.into(),
            options,
        }
    }

    /// Scrapes `[start_page, end_page]` with `workers` concurrent workers
    ///
    /// `make_fetcher` builds each worker's own fetcher for its `(start, end)`
    /// range; a factory error means the fan-out can't start and is returned.
    /// A worker that dies after starting only costs its own records.
    ///
    /// # Returns
    ///
    /// The records of every finished worker, merged by identity in range order
    pub async fn run<F, M>(
        &self,
        start_page: u32,
        end_page: u32,
        workers: usize,
        rate_limit: f64,
        make_fetcher: M,
    ) -> Result<Vec<PropertyRecord>, HarvestError>
    where
        F: PageFetcher + 'static,
        M: Fn(u32, u32) -> Result<F, HarvestError>,
    {
        let started = Instant::now();
        let ranges = partition(start_page, end_page, workers);
        if ranges.is_empty() {
            tracing::warn!("No pages to scrape between {} and {}", start_page, end_page);
            return Ok(Vec::new());
        }

        let limiter = Arc::new(RateLimiter::per_second(rate_limit));
        tracing::info!(
            "Starting {} workers over pages {}-{} at {} req/sec",
            ranges.len(),
            start_page,
            end_page,
            rate_limit
        );

        let fetchers = ranges
            .iter()
            .map(|&(start, end)| make_fetcher(start, end))
            .collect::<Result<Vec<_>, _>>()?;

        let mut handles = Vec::with_capacity(ranges.len());
        for ((start, end), fetcher) in ranges.into_iter().zip(fetchers) {
            let fetcher = RateLimitedFetcher::new(fetcher, Arc::clone(&limiter));
            let store = FileStore::new(StorePaths::for_worker(&self.output_dir, start, end));
            let options = ScrapeOptions {
                start_page: start,
                end_page: Some(end),
                ..self.options.clone()
            };

            let mut orchestrator = Orchestrator::new(fetcher, store, options);
            let span = tracing::info_span!("worker", start, end);
            let handle = tokio::spawn(async move { orchestrator.run().await }.instrument(span));
            handles.push(((start, end), handle));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        for ((start, end), handle) in handles {
            match handle.await {
                Ok(records) => {
                    tracing::info!("Worker {}-{} returned {} records", start, end, records.len());
                    outputs.push(records);
                }
                Err(e) => {
                    tracing::warn!("Worker {}-{} failed, its pages are missing: {}", start, end, e);
                }
            }
        }

        let merged = merge_by_identity(outputs);
        tracing::info!(
            "Fan-out finished in {:?} with {} unique records",
            started.elapsed(),
            merged.len()
        );

        let combined = self.output_dir.join(COMBINED_FILE);
        match write_document(&combined, &merged) {
            Ok(()) => tracing::info!("Saved combined results to {}", combined.display()),
            Err(e) => tracing::error!("Failed to save combined results: {}", e),
        }

        Ok(merged)
    }
}
