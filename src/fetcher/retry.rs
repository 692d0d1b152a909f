//! Retry of transient fetch failures with exponential backoff.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, warn};

use super::LOG_TARGET;
use crate::error::Result;

/// How transient fetch failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts including the first; `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry, before jitter.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Runs `operation`, retrying it while it fails transiently.
///
/// Only errors for which [`crate::LiftError::is_transient`] holds are
/// retried; everything else is returned immediately.
pub(crate) fn retry_transient<T, F>(config: &RetryConfig, url: &Url, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = create_backoff(config);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match operation() {
            Ok(value) => {
                if attempts > 1 {
                    debug!(target: LOG_TARGET, url = %url, attempts, "fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempts < config.max_attempts => {
                let Some(delay) = backoff.next_backoff() else {
                    return Err(err);
                };
                warn!(
                    target: LOG_TARGET,
                    url = %url,
                    attempts,
                    error = %err,
                    retry_in_ms = delay.as_millis(),
                    "fetch failed, retrying"
                );
                std::thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

fn create_backoff(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_backoff)
        .with_max_interval(config.max_backoff)
        .with_multiplier(2.0)
        .with_randomization_factor(0.5)
        .with_max_elapsed_time(None)
        .build()
}
