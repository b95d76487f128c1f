//! Response cache
//!
//! One file per cache key under the cache directory, each holding a raw
//! response body. The file's modification time is the expiry clock: entries
//! older than the TTL read as misses and are removed by `sweep_expired`.

use crate::model::SearchFilters;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default lifetime of a cached response (24 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const ENTRY_EXTENSION: &str = "json";

/// Builds the cache key for a page
///
/// Only the filter fields that change the response go into the hash. Page
/// size and sub-district ids are fixed for a deployment and are left out.
pub fn cache_key(page: u32, filters: &SearchFilters) -> String {
    let city_ids = filters
        .city_id_list
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let canonical = format!(
        "page={};realEstateType={};realEstateDealType={};cityIdList=[{}];currencyId={}",
        page,
        filters.real_estate_type,
        filters.real_estate_deal_type,
        city_ids,
        filters.currency_id
    );

    let digest = Sha256::digest(canonical.as_bytes());
    format!("page_{}_{}", page, &hex::encode(digest)[..16])
}

/// File-backed, time-expiring response cache
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    /// Opens (creating if needed) a cache directory with the default TTL
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        Self::with_ttl(dir, DEFAULT_TTL)
    }

    pub fn with_ttl(dir: impl Into<PathBuf>, ttl: Duration) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    /// Returns the cached payload, or `None` on a miss or an expired entry
    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;

        if is_expired(modified, self.ttl) {
            tracing::debug!("Cache expired for {}", key);
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(payload) => {
                tracing::debug!("Cache hit for {}", key);
                Some(payload)
            }
            Err(e) => {
                tracing::warn!("Error reading cache for {}: {}", key, e);
                None
            }
        }
    }

    /// Stores a payload; failures are logged and reported as `false`
    pub fn put(&self, key: &str, payload: &str) -> bool {
        match fs::write(self.entry_path(key), payload) {
            Ok(()) => {
                tracing::debug!("Cached data for {}", key);
                true
            }
            Err(e) => {
                tracing::warn!("Error caching data for {}: {}", key, e);
                false
            }
        }
    }

    /// Deletes every expired entry and returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let removed = self.remove_entries(|modified| is_expired(modified, self.ttl));
        tracing::info!("Cleared {} expired cache files", removed);
        removed
    }

    /// Deletes every entry regardless of age
    pub fn clear(&self) -> usize {
        let removed = self.remove_entries(|_| true);
        tracing::info!("Cleared cache directory {} ({} files)", self.dir.display(), removed);
        removed
    }

    fn remove_entries(&self, should_remove: impl Fn(SystemTime) -> bool) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot list cache directory {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };

            if should_remove(modified) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }

        removed
    }
}

fn is_expired(modified: SystemTime, ttl: Duration) -> bool {
    // A clock that went backwards makes the entry look fresh
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > ttl)
        .unwrap_or(false)
}
