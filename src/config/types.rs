use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for any setting given in seconds (one day)
pub const MAX_SECONDS: f64 = 86_400.0;

/// Converts a seconds setting to a `Duration`, clamped to `[0, MAX_SECONDS]`
///
/// NaN becomes zero.
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_SECONDS)).unwrap_or(Duration::ZERO)
}

/// Main configuration structure for Listing-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub filters: FilterConfig,
    pub scrape: ScrapeConfig,
    pub output: OutputConfig,
    pub fanout: FanoutConfig,
}

/// Upstream endpoints and request identity
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Site root, fetched to obtain the session cookie
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Listing search endpoint (POST)
    #[serde(rename = "api-url")]
    pub api_url: String,

    /// Name of the cookie carrying the bearer token
    #[serde(rename = "token-cookie")]
    pub token_cookie: String,

    /// Local sitemap copy used when the remote one can't be fetched
    #[serde(rename = "sitemap-path")]
    pub sitemap_path: PathBuf,

    #[serde(rename = "accept-language")]
    pub accept_language: String,

    /// Rotated per request
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://home.ss.ge/".to_string(),
            api_url: "https://api-gateway.ss.ge/v1/RealEstate/LegendSearch".to_string(),
            token_cookie: "ss-session-token".to_string(),
            sitemap_path: PathBuf::from("sitemap.xml"),
            accept_language: "ka".to_string(),
            user_agents: [
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36 Edg/122.0.0.0",
                "Mozilla/5.0 (iPad; CPU OS 16_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1",
                "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:123.0) Gecko/20100101 Firefox/123.0",
            ]
            .iter()
            .map(|ua| ua.to_string())
            .collect(),
        }
    }
}

/// Fixed query shape sent with every page request
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    #[serde(rename = "real-estate-type")]
    pub real_estate_type: u32,

    #[serde(rename = "deal-type")]
    pub deal_type: u32,

    #[serde(rename = "city-id")]
    pub city_id: u32,

    #[serde(rename = "sub-district-ids")]
    pub sub_district_ids: Vec<u32>,

    #[serde(rename = "currency-id")]
    pub currency_id: u32,

    /// Records per page
    #[serde(rename = "page-size")]
    pub page_size: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            real_estate_type: 5,
            deal_type: 4,
            city_id: 95,
            sub_district_ids: vec![
                2, 3, 4, 5, 26, 27, 44, 45, 46, 47, 48, 49, 50, 6, 7, 8, 9, 10, 11, 13, 14, 15,
                16, 17, 18, 19, 24, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 53, 1, 28,
                29, 30, 31, 20, 21, 22, 23, 51, 52,
            ],
            currency_id: 1,
            page_size: 16,
        }
    }
}

/// Paging, retry and timing behaviour
///
/// All delays are expressed in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    #[serde(rename = "start-page")]
    pub start_page: u32,

    /// Used when neither an explicit end page nor a sitemap estimate is available
    #[serde(rename = "default-end-page")]
    pub default_end_page: u32,

    /// Records collected before a checkpoint is forced
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Checkpoint whenever the page number is a multiple of this
    #[serde(rename = "checkpoint-interval")]
    pub checkpoint_interval: u32,

    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Attempt budget when re-fetching pages from the failed ledger
    #[serde(rename = "retry-max-attempts")]
    pub retry_max_attempts: u32,

    /// Politeness delay between pages
    #[serde(rename = "min-delay")]
    pub min_delay: f64,

    #[serde(rename = "max-delay")]
    pub max_delay: f64,

    /// Jitter for malformed bodies, odd statuses and network errors
    #[serde(rename = "retry-min-delay")]
    pub retry_min_delay: f64,

    #[serde(rename = "retry-max-delay")]
    pub retry_max_delay: f64,

    #[serde(rename = "server-error-min-delay")]
    pub server_error_min_delay: f64,

    #[serde(rename = "server-error-max-delay")]
    pub server_error_max_delay: f64,

    /// Base of the exponential backoff applied to HTTP 429
    #[serde(rename = "rate-limit-backoff")]
    pub rate_limit_backoff: f64,

    #[serde(rename = "connect-timeout")]
    pub connect_timeout: f64,

    #[serde(rename = "read-timeout")]
    pub read_timeout: f64,

    /// Upper bound on idle pooled connections kept per host
    #[serde(rename = "pool-max-idle")]
    pub pool_max_idle: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            start_page: 1,
            default_end_page: 15972,
            batch_size: 100,
            checkpoint_interval: 22,
            max_attempts: 3,
            retry_max_attempts: 5,
            min_delay: 2.0,
            max_delay: 4.0,
            retry_min_delay: 4.0,
            retry_max_delay: 8.0,
            server_error_min_delay: 2.0,
            server_error_max_delay: 5.0,
            rate_limit_backoff: 5.0,
            connect_timeout: 15.0,
            read_timeout: 45.0,
            pool_max_idle: 50,
        }
    }
}

impl ScrapeConfig {
    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        seconds(self.read_timeout)
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,

    #[serde(rename = "checkpoint-file")]
    pub checkpoint_file: String,

    #[serde(rename = "data-file")]
    pub data_file: String,

    #[serde(rename = "failed-pages-file")]
    pub failed_pages_file: String,

    /// CSV export file name
    #[serde(rename = "processed-file")]
    pub processed_file: String,

    #[serde(rename = "cache-dir")]
    pub cache_dir: PathBuf,

    /// Cache entry lifetime in seconds
    #[serde(rename = "cache-ttl")]
    pub cache_ttl: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            checkpoint_file: "checkpoint.json".to_string(),
            data_file: "all_properties.json".to_string(),
            failed_pages_file: "failed_pages.json".to_string(),
            processed_file: "properties_cleaned.csv".to_string(),
            cache_dir: PathBuf::from("cache"),
            cache_ttl: 86_400,
        }
    }
}

impl OutputConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

/// Parallel fan-out settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub workers: usize,

    /// Requests per second across all workers
    #[serde(rename = "rate-limit")]
    pub rate_limit: f64,

    #[serde(rename = "worker-batch-size")]
    pub worker_batch_size: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            rate_limit: 0.25,
            worker_batch_size: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_clamps_out_of_range_values() {
        assert_eq!(seconds(2.5), Duration::from_millis(2500));
        assert_eq!(seconds(-1.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
        assert_eq!(seconds(1e30), Duration::from_secs(86_400));
    }

    #[test]
    fn test_huge_timeouts_do_not_panic() {
        let config = ScrapeConfig {
            connect_timeout: 1e30,
            read_timeout: f64::INFINITY,
            ..ScrapeConfig::default()
        };
        assert_eq!(config.connect_timeout(), Duration::from_secs(86_400));
        assert_eq!(config.read_timeout(), Duration::from_secs(86_400));
    }
}
