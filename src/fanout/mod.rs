//! Concurrent fan-out
//!
//! Splits one page range across several workers:
//! - Contiguous, gap-free partitioning of the range
//! - One orchestrator per sub-range, each with its own state files
//! - A single rate limiter shared by every worker's fetcher
//! - Identity-keyed merging of the worker outputs

mod driver;
mod merge;
mod rate_limit;

pub use driver::{FanoutDriver, COMBINED_FILE};
pub use merge::{dedup_by_identity, merge_by_identity};
pub use rate_limit::{RateLimitedFetcher, RateLimiter};

/// Splits `[start, end]` into at most `workers` contiguous ranges
///
/// The first `len % workers` ranges get one extra page. Ranges that would be
/// empty (more workers than pages) are skipped.
pub fn partition(start: u32, end: u32, workers: usize) -> Vec<(u32, u32)> {
    if workers == 0 || start > end {
        return Vec::new();
    }

    let total = u64::from(end - start) + 1;
    let workers = workers as u64;
    let base = total / workers;
    let remainder = total % workers;

    let mut ranges = Vec::new();
    let mut next = u64::from(start);
    for index in 0..workers {
        let size = base + u64::from(index < remainder);
        if size == 0 {
            continue;
        }
        let last = next + size - 1;
        // Both bounds lie within [start, end], so they fit in u32
        ranges.push((next as u32, last as u32));
        next = last + 1;
    }

    ranges
}
