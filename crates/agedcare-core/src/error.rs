use thiserror::Error;

/// Application-wide error types for the crawler.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The site cannot be used at all (unreachable, blocked, browser gone).
    #[error("Fatal fetch error: {0}")]
    FatalFetch(String),

    /// Page structure did not yield the fields we need.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// HTML-to-Markdown conversion failed.
    #[error("Cleaner error: {0}")]
    CleanerError(String),

    /// The CSV ledger or the progress cursor could not be read or written.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Invalid configuration or input file.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The run was cancelled from outside (Ctrl-C).
    #[error("Run cancelled")]
    Cancelled,

    /// A fatal error stopped the run. `last_completed` is where a resume picks up.
    #[error("Run aborted (last completed location: {}): {source}", display_index(.last_completed))]
    Aborted {
        last_completed: Option<usize>,
        #[source]
        source: Box<AppError>,
    },
}

fn display_index(index: &Option<usize>) -> String {
    index.map_or_else(|| "none".to_string(), |i| i.to_string())
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout")
                    || msg.contains("connect")
                    || msg.contains("reset")
                    || msg.contains("HTTP 429")
                    || msg.contains("HTTP 5")
            }
            _ => false,
        }
    }

    /// Returns true if the run cannot continue after this error.
    ///
    /// Fatal errors abort the crawl without advancing the progress cursor.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::FatalFetch(_)
                | AppError::PersistenceError(_)
                | AppError::ConfigError(_)
                | AppError::Cancelled
                | AppError::Aborted { .. }
        )
    }

    /// Returns true if this failure should count towards the circuit breaker.
    pub fn should_trip_circuit(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout")
                    || msg.contains("connect")
                    || msg.contains("HTTP 5")
            }
            _ => false,
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::PersistenceError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::PersistenceError(err.to_string())
    }
}
