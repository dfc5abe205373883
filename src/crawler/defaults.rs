//! Crawl tuning constants

use std::time::Duration;

/// Maximum number of retries for a failed request (429 waits excluded).
pub const MAX_RETRIES: u32 = 3;

/// Fixed delay between retries of a failed request, in milliseconds.
pub const RETRY_BACKOFF_MS: u64 = 1000;

/// Wait applied to an HTTP 429 that carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Ceiling for any single HTTP 429 wait, whatever the server asks for.
pub const MAX_RETRY_AFTER_SECS: u64 = 300;

/// Token bucket capacity (burst size).
pub const RATE_LIMIT_CAPACITY: u32 = 5;

/// Token bucket refill rate, in tokens per second.
pub const RATE_LIMIT_REFILL_PER_SEC: f64 = 1.0;

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 20;

/// HTTP connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Checkpoint flush interval (flush every N newly processed leaves).
pub const CHECKPOINT_FLUSH_EVERY: usize = 50;

/// Flush interval for record writers (flush every N records).
pub const OUTPUT_FLUSH_EVERY: usize = 10;

/// Default checkpoint location, relative to the working directory.
pub const CHECKPOINT_FILE: &str = "fipe_checkpoint.json";

/// Clamp a server-requested 429 wait to the configured ceiling.
///
/// Falls back to `default_wait` when the server sent no `Retry-After`.
pub fn rate_limit_wait(requested: Option<Duration>, default_wait: Duration, ceiling: Duration) -> Duration {
    requested.unwrap_or(default_wait).min(ceiling)
}
