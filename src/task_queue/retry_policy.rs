//! Retry policy for failed tasks.
//!
//! Implements exponential backoff with configurable parameters.

use crate::config::TaskQueueSettings;

/// Anything a task can fail with that the retry policy needs to judge.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of failed attempts after which a task is given up.
    pub max_attempts: u32,
    /// Backoff before the first retry, in seconds.
    pub initial_backoff_secs: u64,
    /// Cap for exponential growth, in seconds.
    pub max_backoff_secs: u64,
    /// Multiplier applied to backoff after each failed attempt.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &TaskQueueSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_backoff_secs: settings.initial_backoff_secs,
            max_backoff_secs: settings.max_backoff_secs,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Backoff after `failed_attempts` failures: `initial * multiplier^(failed_attempts - 1)`,
    /// capped at `max_backoff_secs`.
    pub fn backoff_secs(&self, failed_attempts: u32) -> u64 {
        let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_secs as f64) as u64
    }

    /// Unix timestamp of the next attempt after `failed_attempts` failures.
    pub fn next_retry_at(&self, failed_attempts: u32, now: i64) -> i64 {
        now + self.backoff_secs(failed_attempts) as i64
    }

    /// Whether a task that has now failed `failed_attempts` times should run again.
    pub fn should_retry(&self, error: &dyn RetryableError, failed_attempts: u32) -> bool {
        error.is_retryable() && failed_attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&TaskQueueSettings::default())
    }
}
