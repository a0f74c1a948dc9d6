//! Consecutive-failure circuit breaker for the crawl.
//!
//! Individual fetch units that keep failing after their retries are skipped,
//! but a long run of such failures means the site itself is gone (network
//! down, IP blocked). Once `failure_threshold` units in a row have failed
//! with a circuit-tripping error the breaker opens, and every further call
//! fails with [`AppError::FatalFetch`] so the run aborts with its cursor intact.
//!
//! ```text
//! CLOSED --[N consecutive failures]--> OPEN (terminal for this run)
//!   ^                |
//!   +--[success]-----+  (resets the count while closed)
//! ```

use std::fmt;
use std::future::Future;

use crate::error::AppError;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// The site is considered unreachable.
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    state: CircuitState,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run `operation` unless the breaker is open, recording its outcome.
    ///
    /// The error of a failing operation is returned as-is, except for the one
    /// that trips the breaker, which is turned into [`AppError::FatalFetch`].
    pub async fn call<T, F, Fut>(&mut self, operation: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if self.state == CircuitState::Open {
            return Err(self.open_error());
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) if e.should_trip_circuit() => {
                self.record_failure(e);
                if self.state == CircuitState::Open {
                    return Err(self.open_error());
                }
            }
            // Page-level problems (404s, odd markup) say nothing about the site.
            Err(_) => {}
        }
        result
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitState::Closed {
            self.consecutive_failures = 0;
        }
    }

    pub fn record_failure(&mut self, error: &AppError) {
        if self.state == CircuitState::Open {
            return;
        }
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());

        if self.consecutive_failures >= self.failure_threshold {
            tracing::error!(
                circuit = %self.name,
                failures = self.consecutive_failures,
                error = %error,
                "Circuit breaker opening; site looks unreachable"
            );
            self.state = CircuitState::Open;
        }
    }

    fn open_error(&self) -> AppError {
        AppError::FatalFetch(format!(
            "{} failed {} times in a row (last error: {})",
            self.name,
            self.consecutive_failures,
            self.last_error.as_deref().unwrap_or("unknown")
        ))
    }
}
