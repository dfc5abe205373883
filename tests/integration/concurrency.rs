//! Integration tests for bounded concurrent leaf processing

use crate::support::{FakeFipeApi, RecordingSink};
use fipe_crawler::config::Dictionaries;
use fipe_crawler::crawler::{CrawlEngine, CrawlPlan, LeafScheduler};
use fipe_crawler::resume::{CheckpointStore, FlushPolicy};
use fipe_crawler::VehicleType;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn concurrent_engine(api: Arc<FakeFipeApi>, dir: &TempDir, max_in_flight: usize) -> CrawlEngine {
    let store = Arc::new(CheckpointStore::load(
        dir.path().join("checkpoint.json"),
        FlushPolicy::every(10),
    ));
    CrawlEngine::new(
        api,
        Arc::new(Dictionaries::default()),
        store,
        Arc::new(RecordingSink::default()),
    )
    .with_scheduler(LeafScheduler::concurrent(max_in_flight))
}

fn years(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}-1", 2000 + i)).collect()
}

#[tokio::test]
async fn test_concurrency_cap_is_respected() {
    let dir = TempDir::new().unwrap();
    let values = years(8);
    let values: Vec<&str> = values.iter().map(String::as_str).collect();
    let api = Arc::new(
        FakeFipeApi::new()
            .with_years(&values)
            .with_price_delay(Duration::from_millis(20)),
    );
    let engine = concurrent_engine(api.clone(), &dir, 3);

    let summary = engine
        .run(&CrawlPlan::all_tables(vec![VehicleType::Car]))
        .await
        .unwrap();

    assert_eq!(summary.stats.fetched, 8);
    assert!(api.peak_in_flight() <= 3, "peak was {}", api.peak_in_flight());
    assert!(api.peak_in_flight() >= 2, "leaves never overlapped");
}

#[tokio::test]
async fn test_each_leaf_fetched_exactly_once() {
    let dir = TempDir::new().unwrap();
    let values = years(4);
    let values: Vec<&str> = values.iter().map(String::as_str).collect();
    let api = Arc::new(
        FakeFipeApi::new()
            .with_models(&[(10, "Integra"), (11, "Legend")])
            .with_years(&values)
            .with_price_delay(Duration::from_millis(5)),
    );
    let engine = concurrent_engine(api.clone(), &dir, 4);

    let summary = engine
        .run(&CrawlPlan::all_tables(vec![VehicleType::Car]))
        .await
        .unwrap();

    let calls = api.price_calls();
    let distinct: HashSet<String> = calls.iter().map(|call| call.leaf()).collect();
    assert_eq!(calls.len(), 8);
    assert_eq!(distinct.len(), 8);
    assert_eq!(summary.stats.fetched, 8);
    assert_eq!(engine.store().processed_count().await, 8);
}

#[tokio::test]
async fn test_in_flight_duplicate_is_claimed_once() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeFipeApi::new()
            .with_years(&["2015-1", "2015-1", "2016-1"])
            .with_price_delay(Duration::from_millis(20)),
    );
    let engine = concurrent_engine(api.clone(), &dir, 3);

    let summary = engine
        .run(&CrawlPlan::all_tables(vec![VehicleType::Car]))
        .await
        .unwrap();

    assert_eq!(api.price_calls().len(), 2);
    assert_eq!(summary.stats.fetched, 2);
    assert_eq!(summary.stats.duplicates, 1);
}

#[tokio::test]
async fn test_concurrent_failures_stay_unmarked() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeFipeApi::new().with_years(&["2015-1", "2016-1", "2017-1"]));
    api.fail_year("2016-1");
    let engine = concurrent_engine(api.clone(), &dir, 3);

    let summary = engine
        .run(&CrawlPlan::all_tables(vec![VehicleType::Car]))
        .await
        .unwrap();

    assert_eq!(summary.stats.fetched, 2);
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(engine.store().processed_count().await, 2);
}
