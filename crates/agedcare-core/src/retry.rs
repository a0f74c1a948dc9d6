//! Bounded retry for transient fetch failures.
//!
//! Only errors for which [`AppError::is_retryable`] holds are retried. Anything
//! else (extraction failures, 404s, fatal fetch errors) is returned on the
//! first attempt.

use std::future::Future;

use crate::config::RetryPolicy;
use crate::error::AppError;

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent.
///
/// # Backoff schedule (`backoff = 1s`, `max_attempts = 3`)
///
/// | Attempt | Sleep before it |
/// |---------|-----------------|
/// | 1       | none            |
/// | 2       | 1 s             |
/// | 3       | 2 s             |
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    %what,
                    attempt,
                    max_attempts,
                    error = %err,
                    delay_ms = %delay.as_millis(),
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
