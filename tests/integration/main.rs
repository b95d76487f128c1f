//! Integration tests for listing-harvest
//!
//! The HTTP tests run the real fetcher against wiremock servers; the
//! orchestration tests drive scripted fetchers over on-disk state.

mod fan_out;
mod fetcher_http;
mod scrape_run;
mod support;
