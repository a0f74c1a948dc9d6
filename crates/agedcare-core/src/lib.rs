pub mod circuit_breaker;
pub mod config;
pub mod crawl;
pub mod dedup;
pub mod error;
pub mod ledger;
pub mod models;
pub mod progress;
pub mod retry;
pub mod search;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{CrawlConfig, RetryPolicy};
pub use crawl::{CrawlReport, Crawler, RunState};
pub use error::AppError;
pub use models::{Location, ProgressCursor, ProviderDetails, ProviderRecord};
pub use search::{Distance, SearchType};
pub use traits::{Cleaner, Fetcher, Ledger, ProgressStore, ProviderExtractor};
