//! Request pacing for polite crawling.
//!
//! The crawl talks to a single directory site, so pacing is global: every
//! request waits until at least `delay` (plus jitter) has passed since the
//! previous one, whatever its URL.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use agedcare_core::throttle::{ThrottledFetcher, ThrottleConfig};
//!
//! # use agedcare_core::traits::Fetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &str) -> Result<String, agedcare_core::error::AppError> { todo!() }
//! # }
//! let config = ThrottleConfig::new(Duration::from_secs(1))
//!     .with_jitter(Duration::from_millis(500));
//! let fetcher = ThrottledFetcher::new(MyFetcher, config);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Configuration for the throttled fetcher.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum gap between consecutive requests.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    /// Set to `Duration::ZERO` to disable.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Effective gap for a single wait (delay + random jitter).
    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// 1 second gap, 500ms jitter.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
        }
    }
}

/// A [`Fetcher`] wrapper that spaces out requests.
#[derive(Clone)]
pub struct ThrottledFetcher<F> {
    inner: F,
    config: ThrottleConfig,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    pub fn new(inner: F, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Sleep until the gap since the previous request has elapsed, then
    /// record now as the latest request.
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let required = self.config.effective_delay();
            let elapsed = prev.elapsed();
            if elapsed < required {
                let sleep_for = required - elapsed;
                tracing::debug!(sleep_ms = %sleep_for.as_millis(), "Throttling request");
                // Holding the lock keeps requests strictly one after another.
                tokio::time::sleep(sleep_for).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.wait_turn().await;
        self.inner.fetch(url).await
    }
}

// xorshift seeded from the clock; good enough for jitter.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
