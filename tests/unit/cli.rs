use clap::Parser;
use fipe_crawler::cli::{Cli, Commands, OutputFormat, ResumeMode, VehicleTypeArg};
use fipe_crawler::config::CrawlerConfig;
use fipe_crawler::crawler::TableSelection;
use fipe_crawler::resume::{CheckpointState, CheckpointStore, FlushPolicy};
use fipe_crawler::{LeafKey, VehicleType};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn crawl_defaults() {
    let cli = Cli::try_parse_from(["fipe-crawler", "crawl"]).unwrap();
    assert_eq!(cli.output_format, OutputFormat::Human);
    assert!(cli.max_retries.is_none());

    let Commands::Crawl(args) = &cli.command else {
        panic!("expected crawl command");
    };
    assert_eq!(args.resume, ResumeMode::On);
    assert_eq!(args.selection(), TableSelection::All);

    let plan = args.plan(&CrawlerConfig::default());
    assert_eq!(plan.vehicle_types, vec![VehicleType::Car, VehicleType::Truck]);
}

#[test]
fn crawl_vehicle_type_filters() {
    let cli = Cli::try_parse_from([
        "fipe-crawler",
        "crawl",
        "--vehicle-type",
        "motorcycle",
        "--vehicle-type",
        "car",
    ])
    .unwrap();
    let Commands::Crawl(args) = &cli.command else {
        panic!("expected crawl command");
    };
    assert_eq!(args.vehicle_types, vec![VehicleTypeArg::Motorcycle, VehicleTypeArg::Car]);
    assert_eq!(
        args.plan(&CrawlerConfig::default()).vehicle_types,
        vec![VehicleType::Car, VehicleType::Motorcycle]
    );

    assert!(Cli::try_parse_from(["fipe-crawler", "crawl", "--vehicle-type", "boat"]).is_err());
}

#[test]
fn crawl_table_conflicts_with_period() {
    let result = Cli::try_parse_from(["fipe-crawler", "crawl", "--table", "301", "--year", "2024"]);
    assert!(result.is_err());
}

#[test]
fn crawl_concurrency_is_bounded() {
    assert!(Cli::try_parse_from(["fipe-crawler", "crawl", "--concurrency", "0"]).is_err());
    assert!(Cli::try_parse_from(["fipe-crawler", "crawl", "--concurrency", "64"]).is_err());

    let cli = Cli::try_parse_from(["fipe-crawler", "crawl", "--concurrency", "8"]).unwrap();
    let Commands::Crawl(args) = &cli.command else {
        panic!("expected crawl command");
    };
    let mut config = CrawlerConfig::default();
    args.apply_overrides(&mut config).unwrap();
    assert_eq!(config.crawl.concurrency, 8);
}

#[test]
fn crawl_rejects_zero_flush_interval() {
    let cli = Cli::try_parse_from(["fipe-crawler", "crawl", "--flush-every", "0"]).unwrap();
    let Commands::Crawl(args) = &cli.command else {
        panic!("expected crawl command");
    };
    let mut config = CrawlerConfig::default();
    assert!(args.apply_overrides(&mut config).is_err());
}

#[test]
fn global_flags_override_config() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("fipe.toml");
    std::fs::write(
        &config_path,
        "[retry]\nmax_retries = 7\n\n[crawl]\ncheckpoint_path = \"from-config.json\"\n",
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "fipe-crawler",
        "tables",
        "--config",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    let config = cli.load_config().unwrap();
    assert_eq!(config.retry.max_retries, 7);
    assert_eq!(config.crawl.checkpoint_path, PathBuf::from("from-config.json"));

    let cli = Cli::try_parse_from([
        "fipe-crawler",
        "--config",
        config_path.to_str().unwrap(),
        "--max-retries",
        "0",
        "--checkpoint",
        "override.json",
        "--output-format",
        "json",
        "tables",
    ])
    .unwrap();
    assert_eq!(cli.output_format, OutputFormat::Json);
    let config = cli.load_config().unwrap();
    assert_eq!(config.retry.max_retries, 0);
    assert_eq!(config.crawl.checkpoint_path, PathBuf::from("override.json"));
}

#[test]
fn max_retries_range_is_enforced() {
    assert!(Cli::try_parse_from(["fipe-crawler", "--max-retries", "21", "crawl"]).is_err());
}

#[test]
fn missing_config_file_is_an_error() {
    let cli = Cli::try_parse_from(["fipe-crawler", "--config", "/nonexistent/fipe.toml", "crawl"]).unwrap();
    assert!(cli.load_config().is_err());
}

#[test]
fn tables_filters() {
    let cli = Cli::try_parse_from(["fipe-crawler", "tables", "--year", "2024", "--limit", "3"]).unwrap();
    let Commands::Tables(command) = &cli.command else {
        panic!("expected tables command");
    };
    assert_eq!(command.year.as_deref(), Some("2024"));
    assert_eq!(command.limit, Some(3));
}

#[tokio::test]
async fn checkpoint_reset_clears_processed_leaves() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checkpoint.json");

    let store = CheckpointStore::load(&path, FlushPolicy::every(1));
    store.set_current_table(Some(301)).await.unwrap();
    store
        .mark_processed(LeafKey::new(301, VehicleType::Car, "1", "10", "1992-1"))
        .await
        .unwrap();
    assert_eq!(CheckpointState::load(&path).unwrap().len(), 1);

    let cli = Cli::try_parse_from([
        "fipe-crawler",
        "--checkpoint",
        path.to_str().unwrap(),
        "checkpoint",
        "reset",
    ])
    .unwrap();
    let Commands::Checkpoint(command) = &cli.command else {
        panic!("expected checkpoint command");
    };
    command.execute(&cli).await.unwrap();

    let state = CheckpointState::load(&path).unwrap();
    assert!(state.is_empty());
    assert_eq!(state.current_table_id(), None);
}
