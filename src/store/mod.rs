//! Durable store for scrape progress
//!
//! Three JSON documents make up the persisted state of one scrape:
//! - a checkpoint `{last_page, timestamp}`
//! - the accumulated records (a JSON array of raw listings)
//! - the failed-page ledger `{failed_pages, timestamp, count}`
//!
//! Each document is rewritten whole on every save. There is no multi-file
//! commit: data is always written before the checkpoint advances, so after a
//! crash the data file is a superset of what the checkpoint claims.

mod files;

pub use files::{write_document, FileStore, StorePaths};

use crate::model::PropertyRecord;
use std::collections::BTreeSet;

/// State restored at the start of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeState {
    /// Highest page covered by a written checkpoint (0 when none)
    pub last_completed_page: u32,

    /// Records accumulated so far, in fetch order (not de-duplicated)
    pub records: Vec<PropertyRecord>,

    /// Pages whose fetch exhausted every attempt
    pub failed_pages: BTreeSet<u32>,
}

/// Persistence seam used by the orchestrator
pub trait StateStore: Send {
    /// Loads whatever state exists; missing documents yield empty defaults
    fn load(&self) -> crate::StoreResult<ScrapeState>;

    fn save_records(&self, records: &[PropertyRecord]) -> crate::StoreResult<()>;

    fn save_checkpoint(&self, last_page: u32) -> crate::StoreResult<()>;

    fn save_failed_pages(&self, failed: &BTreeSet<u32>) -> crate::StoreResult<()>;

    /// Writes records, then the failed ledger, then the checkpoint
    fn save_all(
        &self,
        records: &[PropertyRecord],
        last_page: u32,
        failed: &BTreeSet<u32>,
    ) -> crate::StoreResult<()> {
        self.save_records(records)?;
        self.save_failed_pages(failed)?;
        self.save_checkpoint(last_page)
    }
}
