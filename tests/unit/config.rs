use fipe_crawler::config::{ConfigError, CrawlerConfig};
use fipe_crawler::fetcher::Endpoint;
use fipe_crawler::resume::FlushPolicy;
use fipe_crawler::VehicleType;
use std::time::Duration;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[http]
user_agent = "price-research/1.0"
timeout_secs = 5

[http.headers]
Referer = "http://localhost/"

[endpoints]
marcas = "http://localhost:8080/marcas"

[rate_limit]
capacity = 2
refill_per_sec = 0.5

[retry]
max_retries = 5
backoff_ms = 250
default_retry_after_secs = 30
max_retry_after_secs = 120

[crawl]
concurrency = 4
flush_every = 1
checkpoint_path = "state/checkpoint.json"
vehicle_types = ["car", "motorcycle", "truck"]

[dictionaries.fuel_types]
1 = "Gasolina"
9 = "Hidrogênio"
"#;

#[test]
fn load_full_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fipe.toml");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = CrawlerConfig::load(&path).unwrap();

    assert_eq!(config.http.user_agent, "price-research/1.0");
    assert_eq!(config.http.timeout_secs, 5);
    assert_eq!(config.http.headers.len(), 1);
    assert_eq!(config.endpoints.url(Endpoint::Brands), "http://localhost:8080/marcas");
    assert!(config
        .endpoints
        .url(Endpoint::Price)
        .starts_with("https://veiculos.fipe.org.br/"));
    assert_eq!(config.rate_limit.capacity, 2);
    assert_eq!(config.rate_limit.refill_per_sec, 0.5);
    assert_eq!(config.retry.backoff(), Duration::from_millis(250));
    assert_eq!(config.crawl.concurrency, 4);
    assert_eq!(config.crawl.flush_policy(), FlushPolicy::EveryRecord);
    assert_eq!(config.crawl.vehicle_types, VehicleType::ALL.to_vec());
    assert_eq!(config.dictionaries.fuel_label("9"), Some("Hidrogênio"));
    assert_eq!(config.dictionaries.fuel_label("3"), None);
    assert_eq!(config.dictionaries.month_code("março"), Some("03"));
}

#[test]
fn empty_file_yields_defaults() {
    let config = CrawlerConfig::from_toml_str("").unwrap();
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.backoff(), Duration::from_secs(1));
    assert_eq!(config.crawl.concurrency, 1);
    assert_eq!(config.crawl.flush_policy(), FlushPolicy::EveryKeys(50));
    assert_eq!(
        config.http.headers.get("X-Requested-With").map(String::as_str),
        Some("XMLHttpRequest")
    );
}

#[test]
fn missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = CrawlerConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn malformed_toml_is_parse_error() {
    let err = CrawlerConfig::from_toml_str("[rate_limit\ncapacity = 1").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let err = CrawlerConfig::from_toml_str("[crawl]\nvehicle_types = [\"boat\"]").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn out_of_range_values_are_rejected() {
    for content in [
        "[rate_limit]\ncapacity = 0",
        "[rate_limit]\nrefill_per_sec = -1.0",
        "[crawl]\nconcurrency = 0",
        "[crawl]\nvehicle_types = []",
        "[http]\ntimeout_secs = 0",
        "[http]\nuser_agent = \"  \"",
        "[endpoints]\nveiculo = \"\"",
        "[retry]\nmax_retry_after_secs = 0",
    ] {
        let err = CrawlerConfig::from_toml_str(content).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{content:?} gave {err:?}");
    }
}

#[test]
fn load_optional_without_path_uses_defaults() {
    let config = CrawlerConfig::load_optional(None).unwrap();
    assert_eq!(config.rate_limit.capacity, 5);
}
