//! Token-bucket rate limiting for outbound API requests.
//!
//! One [`RateLimiter`] is shared by every concurrent caller of a client.
//! Tokens accumulate continuously between acquisitions, so short bursts up to
//! the bucket capacity pass immediately and sustained throughput converges to
//! the configured requests-per-second value.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ApiError;

/// Mutable bucket state; all mutation happens under one mutex.
struct Bucket {
    /// Maximum number of tokens, equal to the configured rate.
    capacity: f64,
    /// Tokens currently available; fractional between refills.
    tokens: f64,
    /// Refill rate in tokens per second.
    rate: f64,
    /// Timestamp of the last refill computation.
    last_refill: Instant,
}

impl Bucket {
    /// Credit tokens for the elapsed time, clamped at capacity.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Concurrency-safe token bucket bounding outbound request rate.
pub struct RateLimiter {
    /// `None` means limiting is disabled and every acquire succeeds.
    bucket: Option<Mutex<Bucket>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` sustained throughput
    /// with an equal burst capacity. A zero, negative or non-finite value
    /// disables limiting, which is the opt-out policy for environment-driven
    /// configuration.
    pub fn new(requests_per_second: f64) -> Self {
        if requests_per_second <= 0.0 || !requests_per_second.is_finite() {
            return Self { bucket: None };
        }

        // Capacity never drops below one full token: a fractional rate slows
        // the refill but must still let each acquire complete eventually.
        let capacity = requests_per_second.max(1.0);

        Self {
            bucket: Some(Mutex::new(Bucket {
                capacity,
                tokens: capacity,
                rate: requests_per_second,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Block until a token is available or the caller cancels.
    ///
    /// An already-cancelled token returns immediately. No ordering is
    /// guaranteed among concurrent waiters; each one sleeps only for its
    /// current token deficit and then recontends, so every waiter eventually
    /// acquires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), ApiError> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };

        if cancel.is_cancelled() {
            return Err(ApiError::cancelled());
        }

        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                bucket.refill(Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }
                // Time until one full token has accumulated.
                Duration::from_secs_f64((1.0 - bucket.tokens) / bucket.rate)
            };

            trace!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");

            tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::cancelled()),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
