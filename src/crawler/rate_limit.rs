//! Token-bucket rate limiting
//!
//! One limiter is shared by every outbound request of a crawl. Over any
//! window of length `T` it grants at most `capacity + T * refill_rate` tokens.

use crate::metrics;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Token-bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

/// Longest single sleep in [`RateLimiter::acquire`]; slower refills re-check
/// after this long.
const MAX_TOKEN_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> Result<(), Duration> {
        self.refill(now, capacity, refill_rate);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            let wait = Duration::try_from_secs_f64(missing / refill_rate).unwrap_or(MAX_TOKEN_WAIT);
            Err(wait.min(MAX_TOKEN_WAIT))
        }
    }
}

impl RateLimiter {
    /// Create a limiter whose bucket starts full.
    ///
    /// # Arguments
    /// * `capacity` - Maximum burst size, must be at least 1
    /// * `refill_rate` - Tokens added per second, must be positive
    pub fn new(capacity: u32, refill_rate: f64) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::InvalidCapacity);
        }
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(RateLimitError::InvalidRefillRate(refill_rate));
        }
        let capacity = f64::from(capacity);
        Ok(Self {
            capacity,
            refill_rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Bucket capacity
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Tokens added per second
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Wait until a token is available, then consume it.
    ///
    /// Refill, test and decrement happen under one lock, so concurrent callers
    /// never double-spend a token. Waiting happens outside the lock and the
    /// whole check is retried afterwards.
    pub async fn acquire(&self) {
        let started = Instant::now();
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_take(Instant::now(), self.capacity, self.refill_rate) {
                    Ok(()) => break,
                    Err(wait) => wait,
                }
            };
            trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            sleep(wait).await;
        }

        let waited = started.elapsed();
        if !waited.is_zero() {
            metrics::record_rate_limit_wait(waited);
        }
    }

    /// Consume a token only if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket
            .try_take(Instant::now(), self.capacity, self.refill_rate)
            .is_ok()
    }

    /// Tokens currently in the bucket, after refill
    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), self.capacity, self.refill_rate);
        bucket.tokens
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Capacity of zero would never grant a token
    #[error("rate limiter capacity must be at least 1")]
    InvalidCapacity,

    /// Refill rate must be a positive finite number
    #[error("rate limiter refill rate must be positive, got {0}")]
    InvalidRefillRate(f64),
}
