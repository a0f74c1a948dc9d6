use std::time::Duration;

use agedcare_core::error::AppError;
use agedcare_core::traits::Fetcher;
use reqwest::{Client, StatusCode, header};

/// Desktop Chrome UA; the directory serves a stripped page to unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// HTTP fetcher using reqwest.
///
/// Downloads raw HTML with a browser-like User-Agent, `en-AU` language
/// preference, and a per-request timeout. Response statuses are mapped onto
/// the crawl's error taxonomy by [`classify_status`].
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-AU,en;q=0.9"),
        );

        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::FatalFetch(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        classify_status(response.status(), url)?;

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else {
                AppError::NetworkError(format!("Failed to read response body: {e}"))
            }
        })
    }
}

/// Map a non-success status onto an error.
///
/// - 403: the site is refusing us; retrying won't help, so the run stops.
/// - 429 and 5xx: transient, retried by the crawl.
/// - anything else (404, 410, ...): this page only.
pub fn classify_status(status: StatusCode, url: &str) -> Result<(), AppError> {
    if status.is_success() {
        return Ok(());
    }
    let code = status.as_u16();
    match status {
        StatusCode::FORBIDDEN => Err(AppError::FatalFetch(format!(
            "HTTP {code} for {url}: access blocked"
        ))),
        _ => Err(AppError::HttpError(format!("HTTP {code} for {url}"))),
    }
}
