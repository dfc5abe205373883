//! Integration tests for rate limiting functionality

use fipe_crawler::crawler::{RateLimitError, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn test_rate_limiter_rejects_invalid_parameters() {
    assert!(matches!(RateLimiter::new(0, 1.0), Err(RateLimitError::InvalidCapacity)));
    assert!(matches!(RateLimiter::new(5, 0.0), Err(RateLimitError::InvalidRefillRate(_))));
    assert!(matches!(RateLimiter::new(5, -1.0), Err(RateLimitError::InvalidRefillRate(_))));
    assert!(RateLimiter::new(5, f64::NAN).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_burst_is_immediate() {
    let limiter = RateLimiter::new(5, 1.0).unwrap();
    let start = Instant::now();
    for _ in 0..5 {
        limiter.acquire().await;
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(!limiter.try_acquire().await);
}

#[tokio::test(start_paused = true)]
async fn test_window_bound_holds() {
    // capacity 5, 1 token/s: 15 tokens need at least 10 seconds
    let limiter = RateLimiter::new(5, 1.0).unwrap();
    let start = Instant::now();
    for _ in 0..15 {
        limiter.acquire().await;
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(10_500), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_shared_limiter_bounds_all_tasks() {
    let limiter = Arc::new(RateLimiter::new(4, 2.0).unwrap());
    let start = Instant::now();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                for _ in 0..4 {
                    limiter.acquire().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // 16 tokens, 4 up front, 12 more at 2/s
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_refill_is_capped_at_capacity() {
    let limiter = RateLimiter::new(3, 10.0).unwrap();
    limiter.acquire().await;
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(limiter.available_tokens().await, 3.0);
}
