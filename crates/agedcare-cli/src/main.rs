use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use agedcare_client::{HtmlProviderExtractor, ReqwestFetcher};
use agedcare_core::crawl::TracingCrawlReporter;
use agedcare_core::ledger::{CsvLedger, read_telephones};
use agedcare_core::progress::JsonProgressTracker;
use agedcare_core::search::DEFAULT_BASE_URL;
use agedcare_core::throttle::{ThrottleConfig, ThrottledFetcher};
use agedcare_core::traits::{Fetcher, ProgressStore};
use agedcare_core::{CrawlConfig, Crawler, Distance, Location, RetryPolicy, SearchType};

#[derive(Parser)]
#[command(
    name = "agedcare",
    version,
    about = "Resumable crawler for the My Aged Care provider directory"
)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(flatten)]
    crawl: CrawlArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every location not yet completed (the default)
    Run,

    /// Show how far the crawl has got without fetching anything
    Status,
}

#[derive(Args)]
struct PathArgs {
    /// JSON list of postcodes or {postcode, locality, state} objects
    #[arg(long, global = true, default_value = "input/postcodes.json")]
    input: PathBuf,

    /// CSV file new providers are appended to
    #[arg(long, global = true, default_value = "output/output.csv")]
    output: PathBuf,

    /// Resume cursor file
    #[arg(long, global = true, default_value = "output/progress.json")]
    progress: PathBuf,
}

#[derive(Args)]
struct CrawlArgs {
    /// Search radius in km (5, 10, 20, 50, 250); empty for no filter.
    /// Falls back to $DISTANCE, then 250.
    #[arg(long, global = true)]
    distance: Option<String>,

    /// Detail pages followed per location and search type; 0 or unset = all
    #[arg(long, global = true, env = "LINK_PER_SEARCH")]
    link_per_search: Option<usize>,

    /// Result pages requested per search
    #[arg(long, global = true, env = "PAGES_PER_SEARCH", default_value_t = 1)]
    pages_per_search: u32,

    /// Search types, in the order they run for each location
    #[arg(
        long = "search-type",
        global = true,
        env = "SEARCH_TYPES",
        value_delimiter = ',',
        default_values_t = SearchType::ALL
    )]
    search_types: Vec<SearchType>,

    /// Attempts per page, including the first
    #[arg(long, global = true, env = "NAV_RETRIES", default_value_t = 3)]
    nav_retries: u32,

    /// Backoff unit between attempts; attempt n waits n times this
    #[arg(long, global = true, env = "RETRY_BACKOFF_MS", default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Consecutive failed pages after which the site is treated as down
    #[arg(long, global = true, env = "FAILURE_THRESHOLD", default_value_t = 10)]
    failure_threshold: u32,

    /// Minimum gap between requests
    #[arg(long, global = true, env = "REQUEST_DELAY_MS", default_value_t = 1000)]
    request_delay_ms: u64,

    /// Random extra gap added to each request
    #[arg(long, global = true, env = "REQUEST_JITTER_MS", default_value_t = 500)]
    request_jitter_ms: u64,

    /// Per-page fetch timeout
    #[arg(long, global = true, env = "FETCH_TIMEOUT_SECS", default_value_t = 30)]
    fetch_timeout_secs: u64,

    /// Results endpoint of the directory
    #[arg(long, global = true, env = "AGEDCARE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Render pages in headless Chromium (needs the `browser` feature)
    #[arg(long, global = true, default_value_t = false)]
    browser: bool,

    /// Extra wait after a rendered page's body appears, with `--browser`
    #[arg(long, global = true, env = "BROWSER_SETTLE_MS", default_value_t = 2000)]
    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    browser_settle_ms: u64,
}

impl CrawlArgs {
    fn crawl_config(&self) -> Result<CrawlConfig> {
        let distance = resolve_distance(
            self.distance.as_deref(),
            std::env::var("DISTANCE").ok().as_deref(),
        )?;

        let config = CrawlConfig {
            base_url: self.base_url.clone(),
            search_types: self.search_types.clone(),
            distance,
            link_per_search: None,
            pages_per_search: self.pages_per_search,
            retry: RetryPolicy {
                max_attempts: self.nav_retries,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            failure_threshold: self.failure_threshold,
        }
        .with_link_per_search(self.link_per_search.unwrap_or(0));

        config.validate()?;
        Ok(config)
    }

    fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig::new(Duration::from_millis(self.request_delay_ms))
            .with_jitter(Duration::from_millis(self.request_jitter_ms))
    }
}

/// `--distance` wins over `$DISTANCE`; an empty value means no filter, so
/// the environment is read by hand rather than through clap.
fn resolve_distance(flag: Option<&str>, env: Option<&str>) -> Result<Distance> {
    match flag.or(env) {
        Some(value) => value
            .parse::<Distance>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid DISTANCE"),
        None => Ok(Distance::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("agedcare=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&cli.paths, &cli.crawl).await,
        Commands::Status => cmd_status(&cli.paths),
    }
}

async fn cmd_run(paths: &PathArgs, args: &CrawlArgs) -> Result<()> {
    let config = args.crawl_config()?;
    let locations = Location::load_all(&paths.input)
        .with_context(|| format!("Failed to load locations from {}", paths.input.display()))?;
    let ledger = CsvLedger::open(&paths.output)
        .with_context(|| format!("Failed to open {}", paths.output.display()))?;
    let progress = JsonProgressTracker::new(&paths.progress);

    tracing::info!(
        locations = locations.len(),
        search_types = config.search_types.len(),
        distance = %config.distance,
        link_per_search = ?config.link_per_search,
        output = %paths.output.display(),
        "Starting crawl"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current page");
            on_signal.cancel();
        }
    });

    let timeout = Duration::from_secs(args.fetch_timeout_secs);
    if args.browser {
        #[cfg(feature = "browser")]
        {
            let fetcher = agedcare_client::BrowserFetcher::with_timeout(timeout)
                .await
                .context("Failed to start headless browser")?
                .with_settle_delay(Duration::from_millis(args.browser_settle_ms));
            let fetcher = ThrottledFetcher::new(fetcher, args.throttle());
            return crawl(fetcher, progress, ledger, config, &locations, &cancel).await;
        }
        #[cfg(not(feature = "browser"))]
        anyhow::bail!("--browser needs a build with `--features browser`");
    }

    let fetcher = ReqwestFetcher::with_timeout(timeout).context("Failed to create HTTP client")?;
    let fetcher = ThrottledFetcher::new(fetcher, args.throttle());
    crawl(fetcher, progress, ledger, config, &locations, &cancel).await
}

async fn crawl<F: Fetcher>(
    fetcher: F,
    progress: JsonProgressTracker,
    ledger: CsvLedger,
    config: CrawlConfig,
    locations: &[Location],
    cancel: &CancellationToken,
) -> Result<()> {
    let mut crawler = Crawler::new(
        fetcher,
        HtmlProviderExtractor::new(),
        progress,
        ledger,
        config,
    );

    let report = crawler
        .run(locations, cancel, &TracingCrawlReporter)
        .await
        .context("Crawl stopped; run again to resume")?;

    println!("{report}");
    Ok(())
}

fn cmd_status(paths: &PathArgs) -> Result<()> {
    let locations = Location::load_all(&paths.input)
        .with_context(|| format!("Failed to load locations from {}", paths.input.display()))?;
    let cursor = JsonProgressTracker::new(&paths.progress).load()?;
    let telephones = read_telephones(&paths.output)?;

    let done = cursor.next_index().min(locations.len());
    println!(
        "{done} of {} locations complete, {} providers in {}",
        locations.len(),
        telephones.len(),
        paths.output.display()
    );
    match locations.get(done) {
        Some(next) => println!("Next: {} (location {})", next.search_query(), done + 1),
        None => println!("Nothing left to crawl"),
    }
    if let Some(at) = cursor.updated_at {
        println!("Last progress saved {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}
