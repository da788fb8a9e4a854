//! Bounded retry with capped exponential backoff for oracle calls.

use super::{Oracle, OracleError};
use crate::category::Category;
use crate::config::OracleConfig;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Add +/-25% jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// The oracle could not produce an answer.
#[derive(Debug, Error)]
#[error("{last_error} (after {attempts} attempts)")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub last_error: OracleError,
}

impl RetryPolicy {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            ..Self::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (1-based count of failures so far).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let mut ms = self.base_backoff.as_millis() as f64 * exp;
        if self.jitter && ms > 0.0 {
            let factor: f64 = rand::thread_rng().gen_range(-0.25..=0.25);
            ms *= 1.0 + factor;
        }
        Duration::from_millis(ms as u64).min(self.max_backoff)
    }

    /// Classify `line`, retrying transient failures.
    ///
    /// Backoff sleeps end early when `cancel` fires.
    pub async fn classify(
        &self,
        oracle: &dyn Oracle,
        line: &str,
        cancel: &CancellationToken,
    ) -> Result<Category, RetryError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match oracle.classify(line).await {
                Ok(category) => {
                    if attempts > 1 {
                        info!(attempts, "oracle succeeded after retry");
                    }
                    return Ok(category);
                }
                Err(e) => e,
            };

            if !err.is_retryable() || attempts >= self.max_attempts {
                return Err(RetryError {
                    attempts,
                    last_error: err,
                });
            }

            let delay = self.delay_for(attempts);
            warn!(attempts, ?delay, error = %err, "oracle call failed, retrying");

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError { attempts, last_error: OracleError::Cancelled });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
