//! Upper-bound estimation from the site's sitemap index
//!
//! The index lists shard files named `sitemap-listing-<N>.xml`. Each shard is
//! assumed to reference at most ~1000 listings, so the highest shard index
//! bounds the total record count and from it the page count.

use super::RECORDS_PER_SHARD;
use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::path::PathBuf;

/// What a sitemap index says about listing shards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SitemapSummary {
    /// Highest `sitemap-listing-<N>.xml` index found (0 when none match)
    pub highest_listing: u32,

    /// Number of `<sitemap>` entries in the index
    pub total_sitemaps: usize,
}

/// Parses a sitemap index document
///
/// # Returns
///
/// * `Some(SitemapSummary)` - The document contains at least one `<sitemap>` entry
/// * `None` - The document is not a sitemap index
pub fn parse_sitemap_index(content: &str) -> Option<SitemapSummary> {
    let document = Html::parse_document(content);
    let sitemap_selector = Selector::parse("sitemap").ok()?;
    let loc_selector = Selector::parse("loc").ok()?;
    let shard_pattern = Regex::new(r"sitemap-listing-(\d+)\.xml").ok()?;

    let mut total_sitemaps = 0;
    let mut highest_listing = 0;

    for sitemap in document.select(&sitemap_selector) {
        total_sitemaps += 1;

        for loc in sitemap.select(&loc_selector) {
            let text = loc.text().collect::<String>();
            let shard = shard_pattern
                .captures(text.trim())
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok());

            if let Some(shard) = shard {
                highest_listing = highest_listing.max(shard);
            }
        }
    }

    if total_sitemaps == 0 {
        return None;
    }

    Some(SitemapSummary {
        highest_listing,
        total_sitemaps,
    })
}

/// Converts the highest shard index into a page count
///
/// Shards are numbered from 0, so index `n` implies `n + 1` shards.
pub fn pages_for_shards(highest_listing: u32, page_size: u32) -> u32 {
    let estimated_records = (u64::from(highest_listing) + 1) * u64::from(RECORDS_PER_SHARD);
    let pages = estimated_records.div_ceil(u64::from(page_size.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Estimates the last page from the remote sitemap or a local copy
#[derive(Debug, Clone)]
pub struct SitemapOracle {
    client: Client,
    sitemap_url: String,
    local_path: PathBuf,
    user_agents: Vec<String>,
    page_size: u32,
    fallback: u32,
}

impl SitemapOracle {
    /// Creates an oracle
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for the remote fetch
    /// * `base_url` - Site root; the index is read from `<base_url>/sitemap.xml`
    /// * `local_path` - Local copy consulted when the remote fetch fails
    /// * `page_size` - Records per page
    /// * `fallback` - Page bound used when no sitemap can be read
    pub fn new(
        client: Client,
        base_url: &str,
        local_path: impl Into<PathBuf>,
        page_size: u32,
        fallback: u32,
    ) -> Self {
        Self {
            client,
            sitemap_url: format!("{}/sitemap.xml", base_url.trim_end_matches('/')),
            local_path: local_path.into(),
            user_agents: Vec::new(),
            page_size,
            fallback,
        }
    }

    /// Rotates these user agents on the remote fetch
    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.user_agents = user_agents;
        self
    }

    /// Returns an advisory upper bound on the page count
    ///
    /// Never fails: any fetch or parse problem yields the fallback.
    pub async fn estimate_upper_bound(&self) -> u32 {
        let content = match self.fetch_remote().await {
            Some(content) => Some(content),
            None => self.read_local(),
        };

        let highest = content
            .as_deref()
            .and_then(parse_sitemap_index)
            .map(|summary| summary.highest_listing)
            .filter(|highest| *highest > 0);

        match highest {
            Some(highest) => {
                let pages = pages_for_shards(highest, self.page_size);
                tracing::info!("Estimated last page from sitemap: {}", pages);
                pages
            }
            None => {
                tracing::warn!(
                    "Couldn't detect last page, using fallback: {}",
                    self.fallback
                );
                self.fallback
            }
        }
    }

    async fn fetch_remote(&self) -> Option<String> {
        let user_agent = self.user_agents.choose(&mut rand::rng()).cloned();
        let mut request = self.client.get(&self.sitemap_url);
        if let Some(user_agent) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, user_agent);
        }

        let result = async {
            request
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        }
        .await;

        match result {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!("Failed to fetch sitemap from {}: {}", self.sitemap_url, e);
                None
            }
        }
    }

    fn read_local(&self) -> Option<String> {
        if !self.local_path.exists() {
            return None;
        }

        match std::fs::read_to_string(&self.local_path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::error!(
                    "Failed to read local sitemap {}: {}",
                    self.local_path.display(),
                    e
                );
                None
            }
        }
    }
}
