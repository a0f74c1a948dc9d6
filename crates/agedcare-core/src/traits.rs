use std::collections::HashSet;
use std::future::Future;

use crate::error::AppError;
use crate::models::{ProgressCursor, ProviderDetails, ProviderRecord};

/// Fetches rendered HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Converts raw HTML into readable text (Markdown).
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, AppError>;
}

/// Pulls provider data out of directory pages.
pub trait ProviderExtractor: Send + Sync + Clone {
    /// Detail-page links on a search-results page, in discovery order.
    ///
    /// A page with no results yields an empty list, not an error.
    fn extract_links(&self, html: &str, page_url: &str) -> Result<Vec<String>, AppError>;

    /// Provider fields from a detail page.
    ///
    /// Returns [`AppError::ExtractionError`] when the page is not a usable
    /// provider page, including when no telephone number can be found.
    fn extract_provider(&self, html: &str, page_url: &str) -> Result<ProviderDetails, AppError>;
}

/// Durable cursor of the last fully processed location.
pub trait ProgressStore {
    /// Returns [`ProgressCursor::initial`] when nothing has been persisted yet.
    fn load(&self) -> Result<ProgressCursor, AppError>;

    /// Persist `index` as the last completed location. Must be atomic.
    fn advance(&mut self, index: usize) -> Result<ProgressCursor, AppError>;
}

/// Append-only store of output rows.
pub trait Ledger {
    /// Write one row and make it durable before returning.
    fn append(&mut self, record: &ProviderRecord) -> Result<(), AppError>;

    /// Telephone numbers of every row written so far, as stored.
    fn read_all_telephones(&self) -> Result<HashSet<String>, AppError>;
}
