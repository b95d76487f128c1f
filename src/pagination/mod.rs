//! Pagination oracle
//!
//! Decides from a search response whether paging has reached the end, and
//! (via the sitemap) estimates an upper page bound before a run starts.
//!
//! The response-level checks look at, in order:
//! 1. an empty item list
//! 2. an explicit `isLastPage` flag
//! 3. `currentPage >= totalPages`
//!
//! Metadata is read from either a `meta` or a `pagination` object.

mod sitemap;

pub use sitemap::{pages_for_shards, parse_sitemap_index, SitemapOracle, SitemapSummary};

use crate::model::ITEMS_FIELD;
use serde_json::Value;

/// Records assumed to sit behind one sitemap listing shard
pub const RECORDS_PER_SHARD: u32 = 1000;

/// Returns true when the response shows there are no further pages
///
/// Without any usable signal this returns false; the caller then relies on
/// the empty-page signal of a later request.
pub fn is_last_page(body: &Value) -> bool {
    if let Some(items) = body.get(ITEMS_FIELD).and_then(Value::as_array) {
        if items.is_empty() {
            return true;
        }
    }

    for meta in metadata_objects(body) {
        if let Some(flag) = meta.get("isLastPage").and_then(Value::as_bool) {
            return flag;
        }
    }

    for meta in metadata_objects(body) {
        let current = meta.get("currentPage").and_then(Value::as_u64);
        let total = meta.get("totalPages").and_then(Value::as_u64);
        if let (Some(current), Some(total)) = (current, total) {
            return current >= total;
        }
    }

    false
}

/// Extracts the total page count a response reports, if any
///
/// Accepts `totalPages`, `totalCount`/`pageSize`, or `lastPage`.
pub fn detect_total_pages(body: &Value) -> Option<u32> {
    for meta in metadata_objects(body) {
        if let Some(total) = meta.get("totalPages").and_then(Value::as_u64) {
            return u32::try_from(total).ok();
        }

        let count = meta.get("totalCount").and_then(Value::as_u64);
        let size = meta.get("pageSize").and_then(Value::as_u64);
        if let (Some(count), Some(size)) = (count, size) {
            if size > 0 {
                return u32::try_from(count.div_ceil(size)).ok();
            }
        }

        if let Some(last) = meta.get("lastPage").and_then(Value::as_u64) {
            return u32::try_from(last).ok();
        }
    }

    None
}

fn metadata_objects(body: &Value) -> impl Iterator<Item = &Value> {
    ["meta", "pagination"]
        .into_iter()
        .filter_map(move |key| body.get(key).filter(|v| v.is_object()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_items_is_last_regardless_of_meta() {
        let body = json!({
            "realStateItemModel": [],
            "meta": {"isLastPage": false, "currentPage": 1, "totalPages": 99}
        });
        assert!(is_last_page(&body));
    }

    #[test]
    fn test_explicit_flag() {
        let body = json!({"realStateItemModel": [{"applicationId": 1}], "meta": {"isLastPage": true}});
        assert!(is_last_page(&body));

        let body = json!({"realStateItemModel": [{"applicationId": 1}], "meta": {"isLastPage": false}});
        assert!(!is_last_page(&body));
    }

    #[test]
    fn test_current_vs_total_pages() {
        let at_end = json!({
            "realStateItemModel": [{"applicationId": 1}],
            "meta": {"currentPage": 12, "totalPages": 12}
        });
        assert!(is_last_page(&at_end));

        let before_end = json!({
            "realStateItemModel": [{"applicationId": 1}],
            "meta": {"currentPage": 11, "totalPages": 12}
        });
        assert!(!is_last_page(&before_end));
    }

    #[test]
    fn test_pagination_object_is_honoured() {
        let body = json!({
            "realStateItemModel": [{"applicationId": 1}],
            "pagination": {"currentPage": 4, "totalPages": 4}
        });
        assert!(is_last_page(&body));
    }

    #[test]
    fn test_no_signal_is_not_last() {
        let body = json!({"realStateItemModel": [{"applicationId": 1}]});
        assert!(!is_last_page(&body));
        assert!(!is_last_page(&json!({})));
    }

    #[test]
    fn test_detect_total_pages() {
        assert_eq!(detect_total_pages(&json!({"meta": {"totalPages": 40}})), Some(40));
        assert_eq!(
            detect_total_pages(&json!({"meta": {"totalCount": 33, "pageSize": 16}})),
            Some(3)
        );
        assert_eq!(
            detect_total_pages(&json!({"pagination": {"lastPage": 7}})),
            Some(7)
        );
        assert_eq!(
            detect_total_pages(&json!({"meta": {"totalCount": 10, "pageSize": 0}})),
            None
        );
        assert_eq!(detect_total_pages(&json!({"realStateItemModel": []})), None);
    }
}
