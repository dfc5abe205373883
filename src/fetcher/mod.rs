//! API access
//!
//! [`FipeApi`] is the transport seam: one form-encoded request to a named
//! endpoint, returning the decoded JSON payload. [`FipeClient`] layers the
//! typed catalog operations on top of it.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub mod client;
pub mod fipe_http;
pub mod normalizer;
pub mod retry_formatter;

pub use client::FipeClient;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Non-success HTTP status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// Transport failure (timeout, connection refused, DNS)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    ParseError(String),

    /// The API answered with an error payload
    #[error("API error: {0}")]
    ApiError(String),

    /// Retries exhausted for one request
    #[error("{endpoint} request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Endpoint that failed
        endpoint: Endpoint,
        /// Attempts made, 429 waits excluded
        attempts: u32,
        /// Error of the final attempt
        last_error: Box<FetcherError>,
    },

    /// A wait was interrupted by a stop request
    #[error("request cancelled by shutdown")]
    Cancelled,

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Form parameters of one request, in wire order
pub type FormParams = Vec<(&'static str, String)>;

/// API operations, each mapped to one configured URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// List reference tables
    ReferenceTables,
    /// List brands of a (table, vehicle type)
    Brands,
    /// List models of a brand
    Models,
    /// List model-year options of a model
    ModelYears,
    /// Fetch one leaf's price
    Price,
}

impl Endpoint {
    /// Every endpoint
    pub const ALL: [Endpoint; 5] = [
        Endpoint::ReferenceTables,
        Endpoint::Brands,
        Endpoint::Models,
        Endpoint::ModelYears,
        Endpoint::Price,
    ];

    /// Configuration key of the endpoint
    pub fn key(&self) -> &'static str {
        match self {
            Self::ReferenceTables => "tabelas",
            Self::Brands => "marcas",
            Self::Models => "modelos",
            Self::ModelYears => "ano_modelos",
            Self::Price => "veiculo",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Transport for the FIPE API.
///
/// Implementations apply rate limiting and retries; callers see either the
/// decoded payload or a final error value.
#[async_trait]
pub trait FipeApi: Send + Sync {
    /// Issue one form-encoded request.
    ///
    /// # Arguments
    /// * `endpoint` - Operation to call
    /// * `params` - Form parameters, sent as given
    ///
    /// # Returns
    /// Decoded JSON payload
    async fn fetch(&self, endpoint: Endpoint, params: &[(&'static str, String)]) -> FetcherResult<Value>;
}
