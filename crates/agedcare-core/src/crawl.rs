//! The resumable crawl: locations → search types → result pages → links.
//!
//! Ordering contract:
//! - a row is appended (and synced) to the ledger before its telephone enters
//!   the dedup store;
//! - the progress cursor moves to a location only after every search type of
//!   that location has been attempted and all its rows are on disk.
//!
//! Anything short of a fatal error is logged, counted, and skipped. Fatal
//! errors stop the run with the cursor left at the last completed location.

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::CrawlConfig;
use crate::dedup::{DedupStore, normalize_telephone};
use crate::error::AppError;
use crate::models::{Location, ProviderRecord};
use crate::retry::retry_with_backoff;
use crate::search::{SearchType, search_url};
use crate::traits::{Fetcher, Ledger, ProgressStore, ProviderExtractor};

/// Where the crawler is in the search space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    /// Loading the cursor and seeding dedup from the ledger.
    Resuming,
    ProcessingLocation(usize),
    ProcessingSearchType(usize, usize),
    ProcessingLink(usize, usize, usize),
    Completed,
    Aborted,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub locations_total: usize,
    /// Locations skipped because an earlier run completed them.
    pub locations_skipped: usize,
    pub locations_processed: usize,
    pub searches_run: usize,
    pub links_attempted: usize,
    pub records_added: usize,
    pub duplicates_skipped: usize,
    pub extraction_failures: usize,
    /// Search pages or detail pages given up on after retries.
    pub units_skipped: usize,
    pub last_completed: Option<usize>,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} locations processed ({} already done), {} records added, \
             {} duplicates skipped, {} extraction failures, {} fetches skipped",
            self.locations_processed,
            self.locations_total,
            self.locations_skipped,
            self.records_added,
            self.duplicates_skipped,
            self.extraction_failures,
            self.units_skipped,
        )
    }
}

/// Events emitted by the crawler for monitoring/logging.
#[derive(Debug)]
pub enum CrawlEvent<'a> {
    Resuming {
        skipped: usize,
        total: usize,
        known_telephones: usize,
    },
    LocationStarted {
        index: usize,
        total: usize,
        location: &'a Location,
    },
    SearchStarted {
        index: usize,
        search_type: SearchType,
        page: u32,
        url: &'a str,
    },
    NoResults {
        index: usize,
        search_type: SearchType,
    },
    SearchSkipped {
        index: usize,
        search_type: SearchType,
        error: &'a AppError,
    },
    RecordAdded {
        index: usize,
        record: &'a ProviderRecord,
    },
    DuplicateSkipped {
        index: usize,
        telephone: &'a str,
        url: &'a str,
    },
    LinkSkipped {
        index: usize,
        url: &'a str,
        error: &'a AppError,
    },
    LocationCompleted {
        index: usize,
        total: usize,
    },
    Completed {
        report: &'a CrawlReport,
    },
    Aborted {
        last_completed: Option<usize>,
        error: &'a AppError,
        report: &'a CrawlReport,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::Resuming {
                skipped,
                total,
                known_telephones,
            } => {
                tracing::info!(
                    skipped,
                    total,
                    known_telephones,
                    "Starting crawl ({} locations already completed)",
                    skipped
                );
            }
            CrawlEvent::LocationStarted {
                index,
                total,
                location,
            } => {
                tracing::info!(
                    index,
                    postcode = %location.postcode,
                    "Location {}/{}: {}",
                    index + 1,
                    total,
                    location.search_query()
                );
            }
            CrawlEvent::SearchStarted {
                index,
                search_type,
                page,
                url,
            } => {
                tracing::info!(index, %search_type, page, %url, "Searching");
            }
            CrawlEvent::NoResults { index, search_type } => {
                tracing::info!(index, %search_type, "No results");
            }
            CrawlEvent::SearchSkipped {
                index,
                search_type,
                error,
            } => {
                tracing::warn!(index, %search_type, %error, "Search skipped");
            }
            CrawlEvent::RecordAdded { index, record } => {
                tracing::info!(
                    index,
                    company = %record.company_name,
                    telephone = %record.telephone,
                    "Record added"
                );
            }
            CrawlEvent::DuplicateSkipped {
                index,
                telephone,
                url,
            } => {
                tracing::info!(index, %telephone, %url, "Duplicate telephone, skipped");
            }
            CrawlEvent::LinkSkipped { index, url, error } => {
                tracing::warn!(index, %url, %error, "Provider page skipped");
            }
            CrawlEvent::LocationCompleted { index, total } => {
                tracing::info!(index, "Progress saved after location {}/{}", index + 1, total);
            }
            CrawlEvent::Completed { report } => {
                tracing::info!("Crawl completed: {report}");
            }
            CrawlEvent::Aborted {
                last_completed,
                error,
                report,
            } => {
                tracing::error!(
                    ?last_completed,
                    %error,
                    "Crawl aborted after {report}; re-run to resume"
                );
            }
        }
    }
}

/// Walks the search space, writing new providers to the ledger.
///
/// Generic over its collaborators so it can run against mocks in tests.
pub struct Crawler<F, X, P, L>
where
    F: Fetcher,
    X: ProviderExtractor,
    P: ProgressStore,
    L: Ledger,
{
    fetcher: F,
    extractor: X,
    progress: P,
    ledger: L,
    config: CrawlConfig,
    dedup: DedupStore,
    breaker: CircuitBreaker,
    state: RunState,
    report: CrawlReport,
}

impl<F, X, P, L> Crawler<F, X, P, L>
where
    F: Fetcher,
    X: ProviderExtractor,
    P: ProgressStore,
    L: Ledger,
{
    pub fn new(fetcher: F, extractor: X, progress: P, ledger: L, config: CrawlConfig) -> Self {
        let breaker = CircuitBreaker::new("directory site", config.failure_threshold);
        Self {
            fetcher,
            extractor,
            progress,
            ledger,
            config,
            dedup: DedupStore::new(),
            breaker,
            state: RunState::NotStarted,
            report: CrawlReport::default(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Counters of the current (or last) run, also available after an abort.
    pub fn report(&self) -> &CrawlReport {
        &self.report
    }

    /// Crawl every location not covered by the saved cursor.
    ///
    /// Returns [`AppError::Aborted`] on a fatal error or cancellation; the
    /// cursor then still points at the last fully completed location.
    pub async fn run<R: CrawlReporter>(
        &mut self,
        locations: &[Location],
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CrawlReport, AppError> {
        self.report = CrawlReport {
            locations_total: locations.len(),
            ..Default::default()
        };
        self.state = RunState::Resuming;

        let cursor = match self.progress.load() {
            Ok(cursor) => cursor,
            Err(e) => return Err(self.abort(None, e, reporter)),
        };
        let mut last_completed = cursor.last_completed;

        self.dedup = DedupStore::new();
        match self.ledger.read_all_telephones() {
            Ok(telephones) => self.dedup.seed(telephones),
            Err(e) => return Err(self.abort(last_completed, e, reporter)),
        }

        if cursor.next_index() > locations.len() {
            tracing::warn!(
                last_completed = ?cursor.last_completed,
                locations = locations.len(),
                "Saved cursor is past the end of the location list"
            );
        }
        let start = cursor.next_index().min(locations.len());
        self.report.locations_skipped = start;
        self.report.last_completed = last_completed;
        reporter.report(CrawlEvent::Resuming {
            skipped: start,
            total: locations.len(),
            known_telephones: self.dedup.len(),
        });

        for (index, location) in locations.iter().enumerate().skip(start) {
            if cancel.is_cancelled() {
                return Err(self.abort(last_completed, AppError::Cancelled, reporter));
            }

            self.state = RunState::ProcessingLocation(index);
            reporter.report(CrawlEvent::LocationStarted {
                index,
                total: locations.len(),
                location,
            });

            if let Err(e) = self.process_location(index, location, cancel, reporter).await {
                return Err(self.abort(last_completed, e, reporter));
            }

            if let Err(e) = self.progress.advance(index) {
                return Err(self.abort(last_completed, e, reporter));
            }
            last_completed = Some(index);
            self.report.last_completed = last_completed;
            self.report.locations_processed += 1;
            reporter.report(CrawlEvent::LocationCompleted {
                index,
                total: locations.len(),
            });
        }

        self.state = RunState::Completed;
        reporter.report(CrawlEvent::Completed {
            report: &self.report,
        });
        Ok(self.report.clone())
    }

    async fn process_location<R: CrawlReporter>(
        &mut self,
        index: usize,
        location: &Location,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        let search_types = self.config.search_types.clone();
        for (j, search_type) in search_types.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            self.state = RunState::ProcessingSearchType(index, j);
            self.process_search(index, j, location, search_type, cancel, reporter)
                .await?;
        }
        Ok(())
    }

    /// One search type at one location, across result pages.
    ///
    /// Links are followed page by page, so later pages are only requested
    /// while the per-search cap has room.
    async fn process_search<R: CrawlReporter>(
        &mut self,
        index: usize,
        j: usize,
        location: &Location,
        search_type: SearchType,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        let cap = self.config.link_per_search;
        let mut seen_links: Vec<String> = Vec::new();
        let mut attempted = 0usize;

        for page in 1..=self.config.pages_per_search {
            if cap.is_some_and(|c| attempted >= c) {
                break;
            }

            let url = search_url(
                &self.config.base_url,
                location,
                search_type,
                self.config.distance,
                page,
            )?;
            reporter.report(CrawlEvent::SearchStarted {
                index,
                search_type,
                page,
                url: &url,
            });
            self.report.searches_run += 1;

            let links = match self.fetch_unit(&url, cancel).await {
                Ok(html) => self.extractor.extract_links(&html, &url),
                Err(e) => Err(e),
            };
            let links = match links {
                Ok(links) => links,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    if matches!(e, AppError::ExtractionError(_)) {
                        self.report.extraction_failures += 1;
                    } else {
                        self.report.units_skipped += 1;
                    }
                    reporter.report(CrawlEvent::SearchSkipped {
                        index,
                        search_type,
                        error: &e,
                    });
                    break;
                }
            };

            let fresh: Vec<String> = links
                .into_iter()
                .filter(|l| !seen_links.contains(l))
                .collect();
            if fresh.is_empty() {
                if page == 1 {
                    reporter.report(CrawlEvent::NoResults { index, search_type });
                }
                break;
            }

            for link in fresh {
                if cap.is_some_and(|c| attempted >= c) {
                    break;
                }
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                self.state = RunState::ProcessingLink(index, j, attempted);
                self.process_link(index, location, &link, cancel, reporter)
                    .await?;
                attempted += 1;
                seen_links.push(link);
            }
        }
        Ok(())
    }

    /// Fetch, extract, dedup, and append a single provider.
    async fn process_link<R: CrawlReporter>(
        &mut self,
        index: usize,
        location: &Location,
        url: &str,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        self.report.links_attempted += 1;

        let html = match self.fetch_unit(url, cancel).await {
            Ok(html) => html,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.report.units_skipped += 1;
                reporter.report(CrawlEvent::LinkSkipped {
                    index,
                    url,
                    error: &e,
                });
                return Ok(());
            }
        };

        let details = self
            .extractor
            .extract_provider(&html, url)
            .and_then(|d| {
                if normalize_telephone(&d.telephone).is_empty() {
                    Err(AppError::ExtractionError(format!("no telephone on {url}")))
                } else {
                    Ok(d)
                }
            });
        let details = match details {
            Ok(d) => d,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.report.extraction_failures += 1;
                reporter.report(CrawlEvent::LinkSkipped {
                    index,
                    url,
                    error: &e,
                });
                return Ok(());
            }
        };

        if self.dedup.contains(&details.telephone) {
            self.report.duplicates_skipped += 1;
            reporter.report(CrawlEvent::DuplicateSkipped {
                index,
                telephone: &details.telephone,
                url,
            });
            return Ok(());
        }

        let record = ProviderRecord::from_details(details, location);
        self.ledger.append(&record)?;
        self.dedup.add(&record.telephone);
        self.report.records_added += 1;
        reporter.report(CrawlEvent::RecordAdded {
            index,
            record: &record,
        });
        Ok(())
    }

    /// Fetch one page with retries, through the circuit breaker, abandoning
    /// the wait if the run is cancelled.
    async fn fetch_unit(
        &mut self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        let fetcher = &self.fetcher;
        let policy = &self.config.retry;
        let breaker = &mut self.breaker;

        tokio::select! {
            result = breaker.call(|| retry_with_backoff(policy, url, || fetcher.fetch(url))) => {
                result
            }
            () = cancel.cancelled() => Err(AppError::Cancelled),
        }
    }

    fn abort<R: CrawlReporter>(
        &mut self,
        last_completed: Option<usize>,
        error: AppError,
        reporter: &R,
    ) -> AppError {
        self.state = RunState::Aborted;
        self.report.last_completed = last_completed;
        reporter.report(CrawlEvent::Aborted {
            last_completed,
            error: &error,
            report: &self.report,
        });
        AppError::Aborted {
            last_completed,
            source: Box::new(error),
        }
    }
}
