use std::time::Duration;

use crate::error::AppError;
use crate::search::{DEFAULT_BASE_URL, Distance, SearchType};

/// Retry policy for a single fetch unit (one search page or one detail page).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Everything the crawl needs besides its collaborators.
///
/// Built once by the CLI and handed to [`crate::Crawler::new`].
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base_url: String,
    /// Run in this order for every location.
    pub search_types: Vec<SearchType>,
    pub distance: Distance,
    /// Cap on detail pages per (location, search type). `None` means unbounded.
    pub link_per_search: Option<usize>,
    /// Result pages requested per search.
    pub pages_per_search: u32,
    pub retry: RetryPolicy,
    /// Consecutive failed units after which the site is treated as unreachable.
    pub failure_threshold: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_types: SearchType::ALL.to_vec(),
            distance: Distance::default(),
            link_per_search: None,
            pages_per_search: 1,
            retry: RetryPolicy::default(),
            failure_threshold: 10,
        }
    }
}

impl CrawlConfig {
    /// Set the per-search link cap; `0` disables the cap.
    pub fn with_link_per_search(mut self, limit: usize) -> Self {
        self.link_per_search = (limit > 0).then_some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.search_types.is_empty() {
            return Err(AppError::ConfigError(
                "At least one search type is required".into(),
            ));
        }
        if self.pages_per_search == 0 {
            return Err(AppError::ConfigError(
                "PAGES_PER_SEARCH must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "NAV_RETRIES must be at least 1".into(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(AppError::ConfigError(
                "FAILURE_THRESHOLD must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid base URL '{}': {e}", self.base_url))
        })?;
        Ok(())
    }
}
