//! Retry utilities for upstream requests with exponential backoff.
//!
//! Retried:
//! - Timeouts and connection failures
//! - 5xx server errors
//!
//! Not retried:
//! - 429 Too Many Requests (surfaced as `RateLimited` so callers can back off)
//! - Other 4xx client errors, 408 included

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use skycast_core::RetrySettings;

use crate::error::WeatherError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 4000;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial delay between retries (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.initial_delay_ms,
            settings.max_delay_ms,
        )
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Exponential backoff: initial_delay * 2^attempt
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Delay before retry `attempt`, preferring a server-provided hint
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay),
            None => self.delay_for_attempt(attempt),
        }
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Check if a status code is worth retrying
pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    if status.is_server_error() {
        return RetryDecision::Retry;
    }

    // 429 is classified as RateLimited by the caller, never retried here
    RetryDecision::NoRetry
}

/// Outcome of one attempt that did not succeed
#[derive(Debug)]
pub enum AttemptError {
    /// Network failure or 5xx; eligible for another attempt
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Stop immediately and surface this error
    Fatal(WeatherError),
}

/// Result of a retried operation plus the number of retries it took
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, WeatherError>,
    pub retries: u32,
}

/// Run `operation` until it succeeds, fails fatally, or the budget runs out.
///
/// Exhausting the budget yields `WeatherError::UpstreamUnavailable`.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = config.max_attempts();
    let mut retries = 0;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!("Request succeeded after {} retries", retries);
                }
                return RetryOutcome {
                    result: Ok(value),
                    retries,
                };
            }
            Err(AttemptError::Fatal(e)) => {
                tracing::debug!("Non-retryable error: {}", e);
                return RetryOutcome {
                    result: Err(e),
                    retries,
                };
            }
            Err(AttemptError::Transient {
                reason,
                retry_after,
            }) => {
                if attempt >= max_attempts {
                    tracing::error!("All {} attempts exhausted: {}", max_attempts, reason);
                    return RetryOutcome {
                        result: Err(WeatherError::UpstreamUnavailable {
                            attempts: attempt,
                            last_error: reason,
                        }),
                        retries,
                    };
                }

                let delay = config.delay_with_hint(retries, retry_after);
                tracing::warn!(
                    "Transient failure on attempt {} of {}: {}; retrying in {:?}",
                    attempt,
                    max_attempts,
                    reason,
                    delay
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
        }
    }
}
