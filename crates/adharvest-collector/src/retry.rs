//! Exponential back-off for the direct collection path.
//!
//! [`retry_with_backoff`] runs one chunk attempt at a time, sleeping
//! `base × 2^attempt` between failed attempts and pausing for the platform's
//! rate-limit delay after every attempt. Errors that
//! [`CollectError::is_retryable`] rejects are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::CollectError;

const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub base: Duration,
    /// Pause after every attempt, successful or not.
    pub pause_after_attempt: Duration,
}

impl BackoffPolicy {
    /// Delay before retry number `attempt + 1`. Capped at 60 s.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base.saturating_mul(factor).min(MAX_DELAY)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// uses up `policy.max_retries` retries. `operation` receives the zero-based
/// attempt number.
///
/// # Errors
///
/// Returns the last error from `operation`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: BackoffPolicy,
    mut operation: F,
) -> Result<T, CollectError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CollectError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = operation(attempt).await;
        if !policy.pause_after_attempt.is_zero() {
            tokio::time::sleep(policy.pause_after_attempt).await;
        }

        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = err.reason(),
                    error = %err,
                    "chunk attempt failed; retrying after back-off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
