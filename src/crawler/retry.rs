//! Bounded retry with exponential backoff
//!
//! The policy decides, per failed renderer call, whether to try again and how
//! long to wait first. Only transient failure kinds are retried; a structural
//! mismatch is returned immediately.

use crate::config::{Config, RetryConfig};
use crate::RenderError;
use std::time::Duration;

/// Retry limits and delay curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, config: &RetryConfig) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.crawler.max_retries, &config.retry)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// `base * multiplier^(attempt - 1)`, capped at the maximum delay. With
    /// jitter enabled up to a fifth of the capped delay is added on top.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let capped_ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms) as u64;

        let jitter_ms = if self.jitter && capped_ms >= 5 {
            fastrand::u64(0..=capped_ms / 5)
        } else {
            0
        };

        Duration::from_millis(capped_ms + jitter_ms)
    }

    /// Starts tracking the attempts of one operation
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempts: 0,
        }
    }
}

/// Attempt tracker for one renderer operation
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    /// Number of failed attempts seen so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Registers a failed attempt
    ///
    /// # Returns
    ///
    /// * `Ok(delay)` - Retry after waiting `delay`
    /// * `Err(RenderError)` - Give up; the error carries the attempt count
    pub fn on_error(&mut self, error: RenderError) -> Result<Duration, RenderError> {
        self.attempts += 1;

        if !error.kind.is_retryable() || self.attempts >= self.policy.max_attempts {
            return Err(error.with_attempts(self.attempts));
        }

        Ok(self.policy.delay_for(self.attempts))
    }
}
