#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod cleaner;
pub mod extractor;
pub mod fetcher;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use cleaner::HtmdCleaner;
pub use extractor::HtmlProviderExtractor;
pub use fetcher::ReqwestFetcher;
