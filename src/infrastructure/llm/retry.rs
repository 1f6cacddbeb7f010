//! Retry policy with exponential backoff for LLM API requests.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use super::error::LlmApiError;

/// Exponential backoff: initial × 2^attempt, capped at the maximum.
///
/// Retries only transient errors (rate limits, 5xx, network failures).
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Run `operation`, retrying transient failures with backoff.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmApiError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        return Err(err);
                    }
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying LLM request"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}
