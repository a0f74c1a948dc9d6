//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` so clones share state and tests can assert on recorded
//! calls after the crawler has consumed its copy.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::crawl::{CrawlEvent, CrawlReporter};
use crate::error::AppError;
use crate::models::{ProgressCursor, ProviderDetails, ProviderRecord};
use crate::traits::{Fetcher, Ledger, ProgressStore, ProviderExtractor};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

enum Reply {
    Always(String),
    Once(VecDeque<Result<String, AppError>>),
}

struct Route {
    patterns: Vec<String>,
    reply: Reply,
}

impl Route {
    fn matches(&self, url: &str) -> bool {
        self.patterns.iter().all(|p| url.contains(p.as_str()))
    }
}

/// Mock fetcher routing URLs to canned bodies.
///
/// A route matches when the URL contains every one of its patterns. Routes
/// are tried in insertion order; a `route` reply is consumed once, a `page`
/// reply is returned every time. Unmatched URLs get the fallback body, or an
/// HTTP 404 error if there is none.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<Vec<Route>>>,
    fallback: Option<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body returned for every matching URL.
    pub fn page(self, patterns: &[&str], body: &str) -> Self {
        self.push(patterns, Reply::Always(body.to_string()))
    }

    /// One response for the next matching URL; chain calls to queue more.
    pub fn route(self, patterns: &[&str], response: Result<String, AppError>) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            let existing = routes.iter_mut().find(|r| {
                r.patterns.iter().map(String::as_str).eq(patterns.iter().copied())
                    && matches!(r.reply, Reply::Once(_))
            });
            if let Some(Route {
                reply: Reply::Once(queue),
                ..
            }) = existing
            {
                queue.push_back(response);
                return self.clone();
            }
        }
        self.push(patterns, Reply::Once(VecDeque::from([response])))
    }

    pub fn fallback(mut self, body: &str) -> Self {
        self.fallback = Some(body.to_string());
        self
    }

    fn push(self, patterns: &[&str], reply: Reply) -> Self {
        self.routes.lock().unwrap().push(Route {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            reply,
        });
        self
    }

    /// Every URL fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of fetched URLs containing `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(pattern))
            .count()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());

        let mut routes = self.routes.lock().unwrap();
        for route in routes.iter_mut().filter(|r| r.matches(url)) {
            match &mut route.reply {
                Reply::Always(body) => return Ok(body.clone()),
                Reply::Once(queue) => {
                    if let Some(response) = queue.pop_front() {
                        return response;
                    }
                }
            }
        }

        match &self.fallback {
            Some(body) => Ok(body.clone()),
            None => Err(AppError::HttpError(format!("HTTP 404 for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Extractor over a tiny line format instead of HTML.
///
/// Search pages list one `link <url>` per line. Detail pages carry
/// `name: ...` and `tel: ...` lines; a page without `tel:` is an extraction
/// error, as is a page containing `garbled`.
#[derive(Clone, Default)]
pub struct MockExtractor;

impl MockExtractor {
    pub fn search_page(links: &[&str]) -> String {
        links
            .iter()
            .map(|l| format!("link {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn detail_page(name: &str, tel: &str) -> String {
        format!("name: {name}\ntel: {tel}")
    }
}

impl ProviderExtractor for MockExtractor {
    fn extract_links(&self, html: &str, _page_url: &str) -> Result<Vec<String>, AppError> {
        if html.contains("garbled") {
            return Err(AppError::ExtractionError("unrecognised results page".into()));
        }
        Ok(html
            .lines()
            .filter_map(|l| l.strip_prefix("link "))
            .map(|l| l.trim().to_string())
            .collect())
    }

    fn extract_provider(&self, html: &str, page_url: &str) -> Result<ProviderDetails, AppError> {
        if html.contains("garbled") {
            return Err(AppError::ExtractionError(format!("not a provider page: {page_url}")));
        }
        let field = |key: &str| {
            html.lines()
                .find_map(|l| l.strip_prefix(key))
                .map(|v| v.trim().to_string())
        };
        let telephone = field("tel:")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::ExtractionError(format!("no telephone on {page_url}")))?;

        Ok(ProviderDetails {
            company_name: field("name:").unwrap_or_default(),
            telephone,
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// Ledger kept in memory; can be told to fail on the nth append.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    pub rows: Arc<Mutex<Vec<ProviderRecord>>>,
    fail_on_append: Arc<Mutex<Option<usize>>>,
}

impl MemoryLedger {
    pub fn with_rows(rows: Vec<ProviderRecord>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            ..Default::default()
        }
    }

    /// The append after `successful` more rows fails with a persistence error.
    pub fn failing_after(successful: usize) -> Self {
        Self {
            fail_on_append: Arc::new(Mutex::new(Some(successful))),
            ..Default::default()
        }
    }

    pub fn telephones(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.telephone.clone())
            .collect()
    }
}

impl Ledger for MemoryLedger {
    fn append(&mut self, record: &ProviderRecord) -> Result<(), AppError> {
        let mut fail = self.fail_on_append.lock().unwrap();
        if let Some(remaining) = fail.as_mut() {
            if *remaining == 0 {
                return Err(AppError::PersistenceError("disk full".into()));
            }
            *remaining -= 1;
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn read_all_telephones(&self) -> Result<HashSet<String>, AppError> {
        Ok(self.telephones().into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryProgress
// ---------------------------------------------------------------------------

/// Progress store kept in memory, recording every advance.
#[derive(Clone, Default)]
pub struct MemoryProgress {
    cursor: Arc<Mutex<ProgressCursor>>,
    pub advances: Arc<Mutex<Vec<usize>>>,
}

impl MemoryProgress {
    pub fn at(index: usize) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(ProgressCursor::at(index))),
            ..Default::default()
        }
    }

    pub fn last_completed(&self) -> Option<usize> {
        self.cursor.lock().unwrap().last_completed
    }
}

impl ProgressStore for MemoryProgress {
    fn load(&self) -> Result<ProgressCursor, AppError> {
        Ok(self.cursor.lock().unwrap().clone())
    }

    fn advance(&mut self, index: usize) -> Result<ProgressCursor, AppError> {
        let cursor = ProgressCursor::at(index);
        *self.cursor.lock().unwrap() = cursor.clone();
        self.advances.lock().unwrap().push(index);
        Ok(cursor)
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps a short label per event.
#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlReporter for RecordingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let label = match event {
            CrawlEvent::Resuming { skipped, .. } => format!("resuming:{skipped}"),
            CrawlEvent::LocationStarted { index, .. } => format!("location:{index}"),
            CrawlEvent::SearchStarted { search_type, page, .. } => {
                format!("search:{search_type}:{page}")
            }
            CrawlEvent::NoResults { .. } => "no-results".to_string(),
            CrawlEvent::SearchSkipped { .. } => "search-skipped".to_string(),
            CrawlEvent::RecordAdded { record, .. } => format!("added:{}", record.telephone),
            CrawlEvent::DuplicateSkipped { telephone, .. } => format!("duplicate:{telephone}"),
            CrawlEvent::LinkSkipped { .. } => "link-skipped".to_string(),
            CrawlEvent::LocationCompleted { index, .. } => format!("completed:{index}"),
            CrawlEvent::Completed { .. } => "done".to_string(),
            CrawlEvent::Aborted { .. } => "aborted".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}
