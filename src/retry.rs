//! Retry policy with exponential backoff and jitter.
//!
//! The policy only decides; the client owns the actual (cancellable) sleep.
//! Transient errors back off exponentially with a multiplicative jitter so
//! concurrent callers do not retry in lockstep. A server-supplied wait hint
//! always wins over the computed delay.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::ApiError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_JITTER_FACTOR: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Set the jitter factor (0.0 disables jitter).
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide whether attempt number `attempt` (1-based) should be retried
    /// after `error`, and if so how long to wait first.
    ///
    /// Returns `None` when the error is deterministic or the attempt ceiling
    /// is reached; the caller then surfaces the last classified error.
    pub fn next_delay(&self, attempt: u32, error: &ApiError) -> Option<Duration> {
        if !error.is_retryable() {
            debug!(kind = %error.kind(), "error is not retryable");
            return None;
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max_attempts = self.max_attempts, "retry attempts exhausted");
            return None;
        }

        // The server's own wait hint overrides the computed backoff.
        if let Some(hint) = error.retry_after() {
            debug!(wait_ms = hint.as_millis() as u64, "honoring server retry hint");
            return Some(hint);
        }

        Some(self.backoff_delay(attempt))
    }

    /// `base * 2^(attempt-1) * (1 + jitter)`, capped at the maximum delay.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let multiplier = 2_u64.saturating_pow(exponent);
        let capped = self
            .base_delay
            .as_millis()
            .saturating_mul(multiplier as u128)
            .min(self.max_delay.as_millis()) as f64;

        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_factor)
        } else {
            0.0
        };

        Duration::from_millis((capped * (1.0 + jitter)) as u64)
    }
}
