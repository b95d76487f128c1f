//! Process-wide request pacing for fan-out workers

use crate::config::seconds;
use crate::fetcher::PageFetcher;
use crate::model::PageResult;
use crate::HarvestError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between any two permitted requests
///
/// The lock is held while sleeping, so concurrent callers are served one at a
/// time and every gap is at least `min_interval` regardless of which worker
/// issued the request.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Limiter allowing `rate` requests per second; zero or less disables pacing
    ///
    /// The interval is capped at `MAX_SECONDS`, so tiny rates don't overflow.
    pub fn per_second(rate: f64) -> Self {
        let min_interval = if rate.is_finite() && rate > 0.0 {
            seconds(1.0 / rate)
        } else {
            Duration::ZERO
        };
        Self::new(min_interval)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the interval since the previous request has elapsed
    pub async fn acquire(&self) {
        let mut last_request = self.last_request.lock().await;

        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}

/// A page fetcher that waits on a shared limiter before every call
pub struct RateLimitedFetcher<F> {
    inner: F,
    limiter: Arc<RateLimiter>,
}

impl<F: PageFetcher> RateLimitedFetcher<F> {
    /// Wraps `inner` so it shares `limiter` with every other wrapped fetcher
    pub fn new(inner: F, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for RateLimitedFetcher<F> {
    async fn authenticate(&mut self) -> Result<(), HarvestError> {
        self.limiter.acquire().await;
        self.inner.authenticate().await
    }

    async fn fetch(&mut self, page: u32, max_attempts: u32) -> PageResult {
        self.limiter.acquire().await;
        self.inner.fetch(page, max_attempts).await
    }
}
