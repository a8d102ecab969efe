//! Exponential backoff for transient remote failures.
//!
//! A flaky connection must not lose a job: polls and log fetches that
//! fail with a transient [`RemoteError`] are retried with increasing
//! delays until a retry budget is spent.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::RemoteError;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 5,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Consecutive-failure counter with a growing delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    delay: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let delay = config.initial_delay;
        Self {
            config,
            delay,
            failures: 0,
        }
    }

    /// Count a failure. Returns the delay to wait before the next attempt,
    /// or `None` once the retry budget is exhausted.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures > self.config.max_retries {
            return None;
        }
        let delay = self.delay;
        self.delay = next_delay(self.delay, &self.config);
        Some(delay)
    }

    /// Forget earlier failures after a success.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.delay = self.config.initial_delay;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Run `op` until it succeeds, fails permanently, or the retry budget is
/// spent. Returns `None` if `cancel` fires first.
pub async fn retry<T, F, Fut>(
    config: &BackoffConfig,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Option<Result<T, RemoteError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut backoff = Backoff::new(config.clone());
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = op() => result,
        };

        let error = match result {
            Ok(value) => return Some(Ok(value)),
            Err(e) if !e.is_transient() => return Some(Err(e)),
            Err(e) => e,
        };

        let Some(delay) = backoff.record_failure() else {
            return Some(Err(error));
        };
        tracing::warn!(
            attempt = backoff.failures(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "{what} failed, retrying",
        );

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
