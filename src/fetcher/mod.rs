//! Page fetching
//!
//! This module contains everything that turns a page number into a
//! `PageResult`:
//! - The `PageFetcher` capability the orchestrator drives
//! - The HTTP implementation with token handling and caching
//! - The consolidated retry/backoff policy

mod http;
mod retry;

pub use http::{build_http_client, parse_listing_body, HttpFetcher};
pub use retry::{jittered, RetryCause, RetryPolicy};

use crate::model::PageResult;
use crate::HarvestError;
use async_trait::async_trait;

/// A source of listing pages
///
/// Token acquisition is separate from fetching: `fetch` never
/// re-authenticates on its own, it reports `AuthExpired` and leaves the
/// refresh to the caller.
#[async_trait]
pub trait PageFetcher: Send {
    /// Acquires a fresh session token, replacing any existing one
    async fn authenticate(&mut self) -> Result<(), HarvestError>;

    /// Fetches one page, retrying transient failures up to `max_attempts` times
    async fn fetch(&mut self, page: u32, max_attempts: u32) -> PageResult;
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for Box<F> {
    async fn authenticate(&mut self) -> Result<(), HarvestError> {
        (**self).authenticate().await
    }

    async fn fetch(&mut self, page: u32, max_attempts: u32) -> PageResult {
        (**self).fetch(page, max_attempts).await
    }
}
