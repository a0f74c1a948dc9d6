use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agedcare_core::error::AppError;
use agedcare_core::traits::Fetcher;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;

use crate::fetcher::DEFAULT_USER_AGENT;

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// The directory renders its result cards client-side, so when the plain
/// HTTP fetch returns an empty shell this fetcher gets the rendered DOM
/// instead. One Chromium process is shared by all clones; each fetch opens
/// a tab, waits for `<body>` plus a short settle delay, grabs the HTML, and
/// closes the tab.
///
/// ```rust,no_run
/// use agedcare_client::BrowserFetcher;
/// use agedcare_core::traits::Fetcher;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = BrowserFetcher::new().await?;
/// let html = fetcher.fetch("https://www.myagedcare.gov.au/find-a-provider").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
    settle: Duration,
}

impl BrowserFetcher {
    /// Launches headless Chromium with a 30 s navigation timeout.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    /// Launches headless Chromium with a custom navigation timeout.
    ///
    /// Failing to start the browser is fatal: no page can be fetched.
    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--lang=en-AU")
            .arg(format!("--user-agent={DEFAULT_USER_AGENT}"))
            .build()
            .map_err(|e| AppError::FatalFetch(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::FatalFetch(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
            settle: Duration::from_secs(2),
        })
    }

    /// Extra wait after `<body>` appears, for client-rendered result cards.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// `CHROME_BIN` first, then the usual install locations. Snap-packaged
    /// Chromium's wrapper drops headless flags, so its real binary is preferred.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let timeout = self.timeout;

        let result = tokio::time::timeout(timeout, async {
            let page = self.browser.new_page(url).await.map_err(|e| {
                AppError::NetworkError(format!("Failed to navigate to {url}: {e}"))
            })?;

            page.find_element("body")
                .await
                .map_err(|e| AppError::HttpError(format!("Page did not render body: {e}")))?;
            tokio::time::sleep(self.settle).await;

            let html = page
                .content()
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))?;

            let _ = page.close().await;
            Ok::<String, AppError>(html)
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }
}
