//! HTTP page fetcher
//!
//! This module owns the authenticated session against the listing API:
//! - Building the pooled HTTP client with fixed timeouts
//! - Obtaining the session token from the site root's cookie
//! - Issuing one page request with a rotated user agent
//! - Classifying each response and applying the retry policy
//!
//! # Response Handling
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Cache hit | Return items, no network |
//! | No token | `AuthExpired` |
//! | HTTP 200, valid body | Cache it, return items |
//! | HTTP 200, malformed body | Jittered delay, retry |
//! | HTTP 401 / 403 | `AuthExpired`, no further attempts |
//! | HTTP 429 | Exponential backoff, retry |
//! | HTTP 5xx | Jittered attempt-scaled delay, retry |
//! | Other status / network error | Jittered attempt-scaled delay, retry |
//! | Attempts exhausted | `Failure` |

use crate::cache::{cache_key, ResponseCache};
use crate::config::{Config, ScrapeConfig};
use crate::fetcher::retry::{RetryCause, RetryPolicy};
use crate::fetcher::PageFetcher;
use crate::model::{ListingPage, PageRequest, PageResult, PropertyRecord, SearchFilters, ITEMS_FIELD};
use crate::pagination::{detect_total_pages, is_last_page};
use crate::HarvestError;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;

const ACCEPT_VALUE: &str = "application/json, text/plain, */*";

/// Builds the pooled HTTP client
///
/// reqwest has no dedicated read timeout, so `read-timeout` bounds the whole
/// request while `connect-timeout` bounds connection setup.
pub fn build_http_client(config: &ScrapeConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.read_timeout())
        .pool_max_idle_per_host(config.pool_max_idle)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Parses a search response body into a listing page
///
/// # Returns
///
/// * `Ok(ListingPage)` - The body is a JSON object with an item array of objects
/// * `Err(String)` - Description of what made the body unusable
pub fn parse_listing_body(body: &str) -> Result<ListingPage, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON: {}", e))?;

    let items = value
        .get(ITEMS_FIELD)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing '{}'", ITEMS_FIELD))?;

    let records = items
        .iter()
        .cloned()
        .map(PropertyRecord::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|item| format!("non-object listing entry: {}", item))?;

    Ok(ListingPage {
        records,
        is_last: is_last_page(&value),
        total_pages: detect_total_pages(&value),
    })
}

/// Page fetcher talking to the real listing API
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    api_url: String,
    token_cookie: String,
    accept_language: String,
    user_agents: Vec<String>,
    filters: SearchFilters,
    cache: Option<ResponseCache>,
    retry: RetryPolicy,
    token: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher from the configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The full configuration
    /// * `cache` - Response cache to consult before any request, if enabled
    pub fn from_config(config: &Config, cache: Option<ResponseCache>) -> Result<Self, HarvestError> {
        let client = build_http_client(&config.scrape)?;

        Ok(Self {
            client,
            base_url: config.api.base_url.clone(),
            api_url: config.api.api_url.clone(),
            token_cookie: config.api.token_cookie.clone(),
            accept_language: config.api.accept_language.clone(),
            user_agents: config.api.user_agents.clone(),
            filters: SearchFilters::from(&config.filters),
            cache,
            retry: RetryPolicy::from_config(&config.scrape),
            token: None,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn pick_user_agent(&self) -> Option<String> {
        self.user_agents.choose(&mut rand::rng()).cloned()
    }

    fn cached_page(&self, page: u32) -> Option<ListingPage> {
        let cache = self.cache.as_ref()?;
        let key = cache_key(page, &self.filters);
        let payload = cache.get(&key)?;

        match parse_listing_body(&payload) {
            Ok(listing) => Some(listing),
            Err(e) => {
                tracing::debug!("Ignoring unusable cache entry {}: {}", key, e);
                None
            }
        }
    }

    fn store_in_cache(&self, page: u32, body: &str) {
        if let Some(cache) = &self.cache {
            cache.put(&cache_key(page, &self.filters), body);
        }
    }

    /// Sends one attempt and classifies the outcome
    async fn attempt(&self, page: u32, token: &str) -> Result<PageResult, RetryCause> {
        let mut request = self
            .client
            .post(&self.api_url)
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .header(ORIGIN, &self.base_url)
            .header(REFERER, &self.base_url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .json(&PageRequest::new(&self.filters, page));

        if let Some(user_agent) = self.pick_user_agent() {
            request = request.header(USER_AGENT, user_agent);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!("Request timeout on page {}: {}", page, e);
            } else {
                tracing::warn!("Connection error on page {}: {}", page, e);
            }
            RetryCause::Network
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response.text().await.map_err(|e| {
                    tracing::warn!("Failed to read body of page {}: {}", page, e);
                    RetryCause::Network
                })?;

                match parse_listing_body(&body) {
                    Ok(listing) => {
                        self.store_in_cache(page, &body);
                        Ok(PageResult::Items(listing))
                    }
                    Err(e) => {
                        tracing::warn!("Invalid response structure for page {}: {}", page, e);
                        Err(RetryCause::MalformedBody)
                    }
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!("Auth issue on page {}, status code: {}", page, status);
                Ok(PageResult::AuthExpired)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!("Rate limited on page {}", page);
                Err(RetryCause::RateLimited)
            }
            s if s.is_server_error() => {
                tracing::warn!("Server error {} on page {}", s, page);
                Err(RetryCause::ServerError)
            }
            s => {
                tracing::error!("Failed to fetch page {}, status: {}", page, s);
                Err(RetryCause::UnexpectedStatus)
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn authenticate(&mut self) -> Result<(), HarvestError> {
        tracing::info!("Requesting session token from {}", self.base_url);
        self.token = None;

        let mut request = self.client.get(&self.base_url);
        if let Some(user_agent) = self.pick_user_agent() {
            request = request.header(USER_AGENT, user_agent);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| HarvestError::Http {
                url: self.base_url.clone(),
                source,
            })?;

        let token = response
            .cookies()
            .find(|cookie| cookie.name() == self.token_cookie)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty());

        match token {
            Some(token) => {
                tracing::info!("Successfully obtained new auth token");
                self.token = Some(token);
                Ok(())
            }
            None => Err(HarvestError::Auth(format!(
                "no '{}' cookie in response from {}",
                self.token_cookie, self.base_url
            ))),
        }
    }

    async fn fetch(&mut self, page: u32, max_attempts: u32) -> PageResult {
        if let Some(listing) = self.cached_page(page) {
            return PageResult::Items(listing);
        }

        let Some(token) = self.token.clone() else {
            return PageResult::AuthExpired;
        };

        for attempt in 0..max_attempts {
            tracing::debug!(
                "Fetching page {} (attempt {}/{})",
                page,
                attempt + 1,
                max_attempts
            );

            match self.attempt(page, &token).await {
                Ok(PageResult::AuthExpired) => {
                    self.token = None;
                    return PageResult::AuthExpired;
                }
                Ok(result) => return result,
                Err(cause) => {
                    if attempt + 1 < max_attempts {
                        let delay = self.retry.delay_for(cause, attempt);
                        tracing::debug!("Retrying page {} in {:?} ({:?})", page, delay, cause);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::error!("Failed to fetch page {} after {} attempts", page, max_attempts);
        PageResult::Failure
    }
}
