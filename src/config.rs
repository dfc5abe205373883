//! Crawler configuration
//!
//! Loaded once at startup from a TOML file and passed explicitly to the
//! components that need it. Every section is optional; missing fields take
//! the defaults in [`crate::crawler::defaults`].

use crate::crawler::defaults;
use crate::fetcher::Endpoint;
use crate::resume::FlushPolicy;
use crate::VehicleType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors. These are the only errors fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Endpoint URL per API operation
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Token bucket parameters
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Traversal and checkpoint settings
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// Lookup tables for month, vehicle type and fuel codes
    #[serde(default)]
    pub dictionaries: Dictionaries,
}

impl CrawlerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("http.user_agent is empty".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be > 0".into()));
        }
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::Invalid("rate_limit.capacity must be > 0".into()));
        }
        if !(self.rate_limit.refill_per_sec.is_finite() && self.rate_limit.refill_per_sec > 0.0) {
            return Err(ConfigError::Invalid(
                "rate_limit.refill_per_sec must be a positive number".into(),
            ));
        }
        if self.retry.max_retry_after_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_retry_after_secs must be > 0".into(),
            ));
        }
        if self.crawl.concurrency == 0 {
            return Err(ConfigError::Invalid("crawl.concurrency must be > 0".into()));
        }
        if self.crawl.flush_every == 0 {
            return Err(ConfigError::Invalid("crawl.flush_every must be > 0".into()));
        }
        if self.crawl.vehicle_types.is_empty() {
            return Err(ConfigError::Invalid("crawl.vehicle_types is empty".into()));
        }
        for endpoint in Endpoint::ALL {
            if self.endpoints.url(endpoint).trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "endpoints.{} is empty",
                    endpoint.key()
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Extra headers sent with every request
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            headers: default_headers(),
        }
    }
}

/// Endpoint URLs, one per API operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Reference table listing
    #[serde(default = "default_tables_url")]
    pub tabelas: String,
    /// Brand listing
    #[serde(default = "default_brands_url")]
    pub marcas: String,
    /// Model listing
    #[serde(default = "default_models_url")]
    pub modelos: String,
    /// Model-year listing
    #[serde(default = "default_model_years_url")]
    pub ano_modelos: String,
    /// Price lookup
    #[serde(default = "default_price_url")]
    pub veiculo: String,
}

impl EndpointConfig {
    /// URL for an endpoint.
    pub fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::ReferenceTables => &self.tabelas,
            Endpoint::Brands => &self.marcas,
            Endpoint::Models => &self.modelos,
            Endpoint::ModelYears => &self.ano_modelos,
            Endpoint::Price => &self.veiculo,
        }
    }

    /// Point every endpoint at `base`, keeping the API's path names.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            tabelas: format!("{base}/ConsultarTabelaDeReferencia"),
            marcas: format!("{base}/ConsultarMarcas"),
            modelos: format!("{base}/ConsultarModelos"),
            ano_modelos: format!("{base}/ConsultarAnoModelo"),
            veiculo: format!("{base}/ConsultarValorComTodosParametros"),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Burst size
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Tokens added per second
    #[serde(default = "default_refill")]
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill(),
        }
    }
}

/// Retry policy for outbound requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt for non-429 failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between retries, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// 429 wait when the server sends no `Retry-After`
    #[serde(default = "default_retry_after")]
    pub default_retry_after_secs: u64,
    /// Ceiling for a single 429 wait
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_secs: u64,
}

impl RetryConfig {
    /// Backoff between failed attempts
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            default_retry_after_secs: default_retry_after(),
            max_retry_after_secs: default_max_retry_after(),
        }
    }
}

/// Traversal and checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum in-flight price fetches; 1 crawls sequentially
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Flush the checkpoint every N newly processed leaves
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// Checkpoint file location
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    /// Vehicle types crawled under each table
    #[serde(default = "default_vehicle_types")]
    pub vehicle_types: Vec<VehicleType>,
}

impl CrawlSettings {
    /// Checkpoint flush policy derived from `flush_every`
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::every(self.flush_every)
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            flush_every: default_flush_every(),
            checkpoint_path: default_checkpoint_path(),
            vehicle_types: default_vehicle_types(),
        }
    }
}

/// Code lookup tables.
///
/// Keys are matched as given: month names in lower case, vehicle type and
/// fuel codes as their decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dictionaries {
    /// Lower-case month name to two-digit code
    #[serde(default = "default_months")]
    pub months: BTreeMap<String, String>,
    /// Vehicle type code to label
    #[serde(default = "default_vehicle_type_labels")]
    pub vehicle_types: BTreeMap<String, String>,
    /// Fuel code to label
    #[serde(default = "default_fuel_types")]
    pub fuel_types: BTreeMap<String, String>,
}

impl Dictionaries {
    /// Two-digit code for a month name, case-insensitive.
    pub fn month_code(&self, month_name: &str) -> Option<&str> {
        self.months
            .get(&month_name.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Label for a vehicle type code.
    pub fn vehicle_type_label(&self, code: &str) -> Option<&str> {
        self.vehicle_types.get(code.trim()).map(String::as_str)
    }

    /// Label for a fuel code.
    pub fn fuel_label(&self, code: &str) -> Option<&str> {
        self.fuel_types.get(code.trim()).map(String::as_str)
    }

    /// `tipoVeiculo` label sent with a price request.
    pub fn request_label(&self, vehicle_type: VehicleType) -> String {
        self.vehicle_type_label(&vehicle_type.code().to_string())
            .unwrap_or(vehicle_type.api_label())
            .to_string()
    }
}

impl Default for Dictionaries {
    fn default() -> Self {
        Self {
            months: default_months(),
            vehicle_types: default_vehicle_type_labels(),
            fuel_types: default_fuel_types(),
        }
    }
}

const DEFAULT_BASE_URL: &str = "https://veiculos.fipe.org.br/api/veiculos";

fn default_user_agent() -> String {
    concat!("fipe-crawler/", env!("CARGO_PKG_VERSION")).into()
}
fn default_timeout() -> u64 {
    defaults::REQUEST_TIMEOUT_SECS
}
fn default_connect_timeout() -> u64 {
    defaults::CONNECT_TIMEOUT_SECS
}
fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Referer".to_string(), "https://veiculos.fipe.org.br/".to_string()),
        ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
    ])
}
fn default_tables_url() -> String {
    EndpointConfig::default().tabelas
}
fn default_brands_url() -> String {
    EndpointConfig::default().marcas
}
fn default_models_url() -> String {
    EndpointConfig::default().modelos
}
fn default_model_years_url() -> String {
    EndpointConfig::default().ano_modelos
}
fn default_price_url() -> String {
    EndpointConfig::default().veiculo
}
fn default_capacity() -> u32 {
    defaults::RATE_LIMIT_CAPACITY
}
fn default_refill() -> f64 {
    defaults::RATE_LIMIT_REFILL_PER_SEC
}
fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}
fn default_backoff_ms() -> u64 {
    defaults::RETRY_BACKOFF_MS
}
fn default_retry_after() -> u64 {
    defaults::DEFAULT_RETRY_AFTER_SECS
}
fn default_max_retry_after() -> u64 {
    defaults::MAX_RETRY_AFTER_SECS
}
fn default_concurrency() -> usize {
    1
}
fn default_flush_every() -> usize {
    defaults::CHECKPOINT_FLUSH_EVERY
}
fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(defaults::CHECKPOINT_FILE)
}
fn default_vehicle_types() -> Vec<VehicleType> {
    vec![VehicleType::Car, VehicleType::Truck]
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn default_months() -> BTreeMap<String, String> {
    string_map(&[
        ("janeiro", "01"),
        ("fevereiro", "02"),
        ("março", "03"),
        ("marco", "03"),
        ("abril", "04"),
        ("maio", "05"),
        ("junho", "06"),
        ("julho", "07"),
        ("agosto", "08"),
        ("setembro", "09"),
        ("outubro", "10"),
        ("novembro", "11"),
        ("dezembro", "12"),
    ])
}

fn default_vehicle_type_labels() -> BTreeMap<String, String> {
    string_map(&[("1", "carro"), ("2", "moto"), ("3", "caminhao")])
}

fn default_fuel_types() -> BTreeMap<String, String> {
    string_map(&[
        ("1", "Gasolina"),
        ("2", "Álcool"),
        ("3", "Diesel"),
        ("4", "Elétrico"),
        ("5", "Flex"),
        ("6", "Híbrido"),
        ("7", "Gás Natural"),
    ])
}
