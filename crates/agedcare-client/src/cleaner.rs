use std::sync::Arc;

use agedcare_core::error::AppError;
use agedcare_core::traits::Cleaner;
use htmd::HtmlToMarkdown;

/// HTML-to-Markdown cleaner using htmd.
///
/// Reduces a page fragment to its readable text so the extractor's patterns
/// only see what a visitor would see. Page chrome (scripts, styles,
/// navigation, footers, embedded media) is dropped.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "noscript", "iframe", "svg", "form", "button",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for HtmdCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map_err(|e| AppError::CleanerError(e.to_string()))
    }
}
