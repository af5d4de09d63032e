//! Retry of fund operations on a busy store.
//!
//! Only [`RepositoryError::Busy`](crate::db::RepositoryError::Busy) is retried.
//! Business rejections, timeouts and other storage failures are returned as-is.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::FundError;

/// How often and how patiently a busy store is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay step; attempt `n` waits `backoff * n` before the next try.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub const fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }

    /// Run `attempt` until it succeeds, fails for a non-transient reason, or
    /// the attempts are used up.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or
    /// [`FundError::StorageContention`] once every attempt found the store busy.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, FundError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FundError>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(FundError::Storage(err)) if err.is_transient() => {
                    if tries >= self.max_attempts {
                        warn!(
                            operation,
                            attempt = tries,
                            max_attempts = self.max_attempts,
                            error = %err,
                            "Store busy, no more retries"
                        );
                        return Err(FundError::StorageContention {
                            attempts: tries,
                            source: err,
                        });
                    }
                    let delay = self.delay_for_attempt(tries);
                    warn!(
                        operation,
                        attempt = tries,
                        max_attempts = self.max_attempts,
                        error = %err,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Store busy, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => {
                    if tries > 1 && result.is_ok() {
                        info!(operation, attempt = tries, "Operation succeeded after retry");
                    }
                    return result;
                }
            }
        }
    }
}
