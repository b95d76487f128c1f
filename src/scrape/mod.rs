//! Scrape orchestration
//!
//! The orchestrator owns one sequential pass over a page range. It is generic
//! over the page source and the persistence backend so the same loop runs
//! against the live API, a rate-limited fan-out worker, or a scripted fetcher
//! in tests.

mod orchestrator;

pub use orchestrator::{Orchestrator, Phase, ScrapeOptions};
