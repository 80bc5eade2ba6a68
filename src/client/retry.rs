//! Retry with exponential backoff
//!
//! Attempt `k` (1-indexed, `k >= 2`) waits `base_delay * 2^(k-2)` first, so the
//! default policy sleeps 1s then 2s. `Unauthenticated` and `Cancelled` end the
//! loop immediately; everything else is retried until attempts run out, then the
//! last error is returned. Backoff sleeps race the cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollingConfig;
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(polling: &PollingConfig) -> Self {
        Self::new(
            polling.max_attempts,
            Duration::from_millis(polling.retry_base_delay_ms),
        )
    }

    /// Sleep before `attempt`; zero for the first
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        if attempt > 1 {
            let delay = policy.delay_before(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => {
                debug!(attempt, error = %e, "Not retrying");
                return Err(e);
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "Fetch attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| FetchError::Network("no attempt was made".to_string())))
}
