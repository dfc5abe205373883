//! # FIPE Crawler Library
//!
//! A resumable crawler for the FIPE reference price tables. It walks the
//! five-level taxonomy exposed by the public API (reference table, vehicle
//! type, brand, model, model-year) and fetches one price for every leaf.
//!
//! ## Features
//!
//! - **Rate Limiting**: Token-bucket throttle shared by every outbound request
//! - **Retry Handling**: Bounded retries for transient failures, explicit waits on HTTP 429
//! - **Resume Capability**: Crash-safe checkpoint of processed leaves and the table in progress
//! - **Bounded Concurrency**: Optional fan-out over a model's year list, capped crawl-wide
//! - **Tolerant Parsing**: Malformed prices, dates and composite keys degrade instead of failing
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use fipe_crawler::config::CrawlerConfig;
//! use fipe_crawler::crawler::{CrawlEngine, CrawlPlan, RateLimiter, TracingSink};
//! use fipe_crawler::fetcher::fipe_http::FipeHttpClient;
//! use fipe_crawler::resume::CheckpointStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CrawlerConfig::default();
//! let limiter = Arc::new(RateLimiter::new(
//!     config.rate_limit.capacity,
//!     config.rate_limit.refill_per_sec,
//! )?);
//! let api = Arc::new(FipeHttpClient::from_config(&config, limiter)?);
//! let store = Arc::new(CheckpointStore::load(
//!     &config.crawl.checkpoint_path,
//!     config.crawl.flush_policy(),
//! ));
//!
//! let engine = CrawlEngine::new(
//!     api,
//!     Arc::new(config.dictionaries.clone()),
//!     store,
//!     Arc::new(TracingSink),
//! );
//! let summary = engine.run(&CrawlPlan::all_tables(config.crawl.vehicle_types.clone())).await?;
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`crawler`] - Traversal engine, leaf scheduler, rate limiter and event sink
//! - [`fetcher`] - HTTP client with retry/backoff, typed API operations and normalizer
//! - [`resume`] - Persisted checkpoint state and the in-process checkpoint store
//! - [`output`] - CSV record writer used by the command line front-end
//! - [`config`] - TOML configuration loaded once and passed explicitly

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Command line front-end
pub mod cli;

/// Configuration loading and validation
pub mod config;

/// Crawl orchestration, scheduling and rate limiting
pub mod crawler;

/// API access and payload normalization
pub mod fetcher;

/// Leaf identity and model-year composite values
pub mod leaf;

/// Prometheus metrics helpers
pub mod metrics;

/// Record writers
pub mod output;

/// Crash-safe crawl progress
pub mod resume;

/// Graceful stop coordination
pub mod shutdown;

pub use config::CrawlerConfig;
pub use leaf::{LeafKey, ModelYear};

/// Model year the API uses for brand-new vehicles.
pub const ZERO_KM_MODEL_YEAR: i64 = 3200;

/// A dated snapshot of the price list, covering one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTable {
    /// Table identifier (`Codigo` on the wire)
    pub id: i64,
    /// Four-digit year, e.g. "2024"
    pub year: String,
    /// Two-digit month code, "00" when the month name is unknown
    pub month_code: String,
    /// Capitalized month name, e.g. "Janeiro"
    pub month_name: String,
}

impl ReferenceTable {
    /// Human-readable label such as "Janeiro/2024"
    pub fn label(&self) -> String {
        format!("{}/{}", self.month_name, self.year)
    }
}

/// Vehicle categories priced by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    /// Passenger cars (code 1)
    Car,
    /// Motorcycles (code 2)
    Motorcycle,
    /// Trucks (code 3)
    Truck,
}

impl VehicleType {
    /// Every vehicle type, in API code order.
    pub const ALL: [VehicleType; 3] = [VehicleType::Car, VehicleType::Motorcycle, VehicleType::Truck];

    /// Numeric code sent as `codigoTipoVeiculo`
    pub fn code(&self) -> u8 {
        match self {
            Self::Car => 1,
            Self::Motorcycle => 2,
            Self::Truck => 3,
        }
    }

    /// Resolve a numeric API code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Car),
            2 => Some(Self::Motorcycle),
            3 => Some(Self::Truck),
            _ => None,
        }
    }

    /// Label the API expects in `tipoVeiculo` when no dictionary entry exists.
    pub fn api_label(&self) -> &'static str {
        match self {
            Self::Car => "carro",
            Self::Motorcycle => "moto",
            Self::Truck => "caminhao",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Car => "car",
            Self::Motorcycle => "motorcycle",
            Self::Truck => "truck",
        };
        f.write_str(name)
    }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "car" | "carro" | "carros" => Ok(Self::Car),
            "2" | "motorcycle" | "moto" | "motos" => Ok(Self::Motorcycle),
            "3" | "truck" | "caminhao" | "caminhoes" => Ok(Self::Truck),
            _ => Err(format!(
                "Invalid vehicle type: {s}. Valid options: car, motorcycle, truck"
            )),
        }
    }
}

/// Brand or model entry as listed by the API (`{"Label": ..., "Value": ...}`).
///
/// The identifier is opaque: brands arrive as strings, models as integers.
/// Both are kept as strings so they round-trip into request parameters unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Opaque identifier (`Value` on the wire)
    #[serde(rename = "Value", deserialize_with = "fetcher::normalizer::deserialize_code")]
    pub id: String,
    /// Display label (`Label` on the wire)
    #[serde(rename = "Label")]
    pub label: String,
}

/// A vehicle brand within one (table, vehicle type).
pub type Brand = CatalogEntry;

/// A vehicle model within one (table, vehicle type, brand).
pub type Model = CatalogEntry;

/// One entry of a model's year list.
///
/// `value` encodes `"<modelYear>-<fuelCode>"`; see [`ModelYear::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelYearOption {
    /// Composite value, e.g. "2015-1"
    #[serde(rename = "Value", deserialize_with = "fetcher::normalizer::deserialize_code")]
    pub value: String,
    /// Display label, e.g. "2015 Gasolina"
    #[serde(rename = "Label")]
    pub label: String,
}

impl ModelYearOption {
    /// Split the composite value into year and fuel code.
    pub fn model_year(&self) -> Result<ModelYear, fetcher::normalizer::NormalizeError> {
        ModelYear::parse(&self.value)
    }
}

/// Normalized price for one leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePriceRecord {
    /// Reference table the price belongs to
    pub table_id: i64,
    /// Reference year reported by the API ("" when absent)
    pub reference_year: String,
    /// Reference month code reported by the API ("" when absent)
    pub reference_month_code: String,
    /// Vehicle type label, "unknown" when unresolved
    pub vehicle_type_label: String,
    /// FIPE code of the vehicle
    pub fipe_code: String,
    /// Brand name
    pub brand: String,
    /// Model name
    pub model: String,
    /// Model year (3200 means zero km)
    pub model_year: i64,
    /// Fuel code
    pub fuel_code: String,
    /// Fuel abbreviation
    pub fuel_abbreviation: String,
    /// Fuel label, "unknown" when unresolved
    pub fuel_label: String,
    /// Price in BRL; zero when no price could be parsed
    pub price: Decimal,
    /// Whether `price` came from a parsable value
    pub price_available: bool,
    /// When the price was fetched
    pub queried_at: DateTime<Utc>,
}

impl VehiclePriceRecord {
    /// Whether the record describes a brand-new vehicle.
    pub fn is_zero_km(&self) -> bool {
        self.model_year == ZERO_KM_MODEL_YEAR
    }

    /// Model year for display ("0 KM" for brand-new vehicles).
    pub fn model_year_display(&self) -> String {
        if self.is_zero_km() {
            "0 KM".to_string()
        } else {
            self.model_year.to_string()
        }
    }

    /// One-line description used in logs: "Brand | Model | Year".
    pub fn describe(&self) -> String {
        format!("{} | {} | {}", self.brand, self.model, self.model_year_display())
    }
}
