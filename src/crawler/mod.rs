//! Crawl orchestration and rate limiting
//!
//! # Overview
//!
//! 1. **Planning**: Choose tables and vehicle types with [`engine::CrawlPlan`]
//! 2. **Execution**: Walk the taxonomy with [`engine::CrawlEngine`]
//! 3. **Scheduling**: Price one model's leaves sequentially or concurrently via [`scheduler::LeafScheduler`]
//! 4. **Rate Limiting**: Throttle every request through [`rate_limit::RateLimiter`]
//! 5. **Reporting**: Stream progress, logs and records to an [`events::EventSink`]
//!
//! # Error Handling
//!
//! Fetch failures below the table listing never abort a crawl: failed
//! listings count as empty, failed leaves stay unprocessed for the next run.
//! [`CrawlError`] is reserved for what cannot be skipped.

pub mod defaults;
pub mod engine;
pub mod events;
pub mod progress;
pub mod rate_limit;
pub mod scheduler;

pub use engine::{CrawlEngine, CrawlPlan, CrawlStats, CrawlSummary, LeafOutcome, TablePhase, TableSelection};
pub use events::{EventSink, LogLevel, NullSink, Stage, TracingSink};
pub use progress::ProgressState;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use scheduler::{LeafScheduler, SchedulingMode};

use crate::fetcher::FetcherError;
use crate::resume::ResumeError;

/// Crawl errors
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The reference table listing failed, so there is nothing to crawl
    #[error("failed to list reference tables: {0}")]
    ReferenceTables(FetcherError),

    /// The checkpoint could not be written
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] ResumeError),
}
