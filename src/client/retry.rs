//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{BotError, Result};

/// Retry driver for collaborator calls.
///
/// Delay doubles per attempt with up to 25% jitter, capped at the
/// configured maximum. A provider retry-after hint overrides the
/// computed delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Backoff before the retry that follows failed attempt `attempt`
    /// (zero-based), jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped = base.min(self.config.max_delay_ms);
        let jitter = (capped as f64 * 0.25 * rand::random::<f64>()) as u64;
        Duration::from_millis(capped + jitter)
    }

    /// Runs `operation` until it succeeds or attempts run out; the last
    /// error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = BotError::Internal(format!("{label}: no attempts made"));
        for attempt in 0..attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt + 1 == attempts {
                        last_error = e;
                        break;
                    }
                    let delay = retry_after_hint(&e).unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label,
                        attempt + 1,
                        attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

pub(super) fn retry_after_hint(error: &BotError) -> Option<Duration> {
    match error {
        BotError::RateLimited {
            retry_after_secs: Some(secs),
        } => Some(Duration::from_secs(*secs)),
        _ => None,
    }
}
