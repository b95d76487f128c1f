//! Retry and backoff policy for page fetches
//!
//! All delay math lives here; the fetch loop only classifies each failed
//! attempt and asks the policy how long to wait.

use crate::config::{seconds, ScrapeConfig};
use rand::Rng;
use std::time::Duration;

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    /// HTTP 200 with a body that isn't a valid search response
    MalformedBody,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// Any other unexpected status
    UnexpectedStatus,
    /// Timeout, connection reset, or another transport failure
    Network,
}

/// Backoff parameters shared by every fetch attempt loop
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Jitter range for malformed bodies, odd statuses and network errors
    pub jitter: (Duration, Duration),
    /// Jitter range for 5xx, scaled by the attempt number
    pub server_error_jitter: (Duration, Duration),
    /// Base of the 429 backoff, doubled on each attempt
    pub rate_limit_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            jitter: (
                seconds(config.retry_min_delay),
                seconds(config.retry_max_delay),
            ),
            server_error_jitter: (
                seconds(config.server_error_min_delay),
                seconds(config.server_error_max_delay),
            ),
            rate_limit_base: seconds(config.rate_limit_backoff),
        }
    }

    /// No waiting at all
    pub fn immediate() -> Self {
        Self {
            jitter: (Duration::ZERO, Duration::ZERO),
            server_error_jitter: (Duration::ZERO, Duration::ZERO),
            rate_limit_base: Duration::ZERO,
        }
    }

    /// Delay before the next attempt
    ///
    /// `attempt` is the zero-based index of the attempt that just failed.
    pub fn delay_for(&self, cause: RetryCause, attempt: u32) -> Duration {
        match cause {
            RetryCause::RateLimited => self.rate_limit_base * 2u32.saturating_pow(attempt),
            RetryCause::ServerError => jittered(self.server_error_jitter) * (attempt + 1),
            RetryCause::MalformedBody => jittered(self.jitter),
            RetryCause::UnexpectedStatus | RetryCause::Network => {
                jittered(self.jitter) * (attempt + 1)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScrapeConfig::default())
    }
}

/// Uniform random duration in `[min, max]`
pub fn jittered((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}
