//! Leaf scheduling
//!
//! Runs the leaves of one model either one after another or as a bounded
//! concurrent batch. In concurrent mode a single semaphore caps in-flight
//! leaves across the whole crawl, not just within one batch. The batch is
//! awaited as a whole before the caller moves to the next model.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// How leaves of one model are processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    /// One leaf at a time
    Sequential,
    /// Fan out over the batch, at most `max_in_flight` leaves at once
    Concurrent {
        /// Crawl-wide cap on in-flight leaves
        max_in_flight: usize,
    },
}

/// Runs leaf batches under a [`SchedulingMode`]
#[derive(Debug, Clone)]
pub struct LeafScheduler {
    mode: SchedulingMode,
    permits: Arc<Semaphore>,
}

impl LeafScheduler {
    /// Sequential scheduler
    pub fn sequential() -> Self {
        Self {
            mode: SchedulingMode::Sequential,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Concurrent scheduler with a crawl-wide cap (at least 1)
    pub fn concurrent(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            mode: SchedulingMode::Concurrent { max_in_flight },
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Sequential for a concurrency of 1, concurrent otherwise
    pub fn from_concurrency(concurrency: usize) -> Self {
        if concurrency <= 1 {
            Self::sequential()
        } else {
            Self::concurrent(concurrency)
        }
    }

    /// Active mode
    pub fn mode(&self) -> SchedulingMode {
        self.mode
    }

    /// Run `task` over every item and wait for all of them.
    ///
    /// Results are returned in item order regardless of completion order.
    pub async fn run_batch<'a, T, F, Fut>(&self, items: &'a [T], task: F) -> Vec<Fut::Output>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future,
    {
        match self.mode {
            SchedulingMode::Sequential => {
                let mut outputs = Vec::with_capacity(items.len());
                for item in items {
                    outputs.push(task(item).await);
                }
                outputs
            }
            SchedulingMode::Concurrent { .. } => {
                let futures = items.iter().map(|item| {
                    let permits = Arc::clone(&self.permits);
                    let fut = task(item);
                    async move {
                        // never closed
                        let _permit = permits.acquire_owned().await.ok();
                        fut.await
                    }
                });
                join_all(futures).await
            }
        }
    }
}

impl Default for LeafScheduler {
    fn default() -> Self {
        Self::sequential()
    }
}
