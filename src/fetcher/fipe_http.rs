//! FIPE HTTP client
//!
//! Form-encoded POSTs against the configured endpoint URLs with:
//! - One rate limiter token per attempt
//! - Explicit `Retry-After` waits on HTTP 429 that do not consume the retry budget
//! - Fixed backoff and a bounded retry count for every other failure
//! - Listing waits that end early with [`FetcherError::Cancelled`] on shutdown;
//!   price fetches always run to completion so a launched batch can drain

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{CrawlerConfig, EndpointConfig, HttpConfig, RetryConfig};
use crate::crawler::defaults::rate_limit_wait;
use crate::crawler::RateLimiter;
use crate::fetcher::retry_formatter::{describe_params, extract_error_type, RetryContext, RetryErrorType};
use crate::fetcher::{Endpoint, FetcherError, FetcherResult, FipeApi};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};
use crate::shutdown::SharedShutdown;

/// Retry behaviour of [`FipeHttpClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (429 waits excluded)
    pub max_retries: u32,
    /// Fixed delay between failed attempts
    pub backoff: Duration,
    /// 429 wait when no `Retry-After` header is present
    pub default_retry_after: Duration,
    /// Ceiling for a single 429 wait
    pub max_retry_after: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff(),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Build the shared reqwest client from HTTP settings.
pub fn build_http_client(http: &HttpConfig) -> FetcherResult<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &http.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetcherError::ClientBuild(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetcherError::ClientBuild(format!("invalid header value {value:?}: {e}")))?;
        headers.insert(name, value);
    }

    Client::builder()
        .user_agent(http.user_agent.clone())
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .timeout(Duration::from_secs(http.timeout_secs))
        .build()
        .map_err(|e| FetcherError::ClientBuild(e.to_string()))
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date values and garbage are ignored (`None`).
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            debug!(value = raw, "Ignoring non-numeric Retry-After header");
            None
        }
    }
}

/// HTTP transport for the FIPE API
pub struct FipeHttpClient {
    client: Client,
    endpoints: EndpointConfig,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    shutdown: Option<SharedShutdown>,
}

impl FipeHttpClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `client` - reqwest client (carries headers and timeouts)
    /// * `endpoints` - URL per API operation
    /// * `rate_limiter` - Limiter shared by every request of the crawl
    /// * `retry` - Retry policy
    pub fn new(client: Client, endpoints: EndpointConfig, rate_limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            client,
            endpoints,
            rate_limiter,
            retry,
            shutdown: None,
        }
    }

    /// Build a client from the full configuration.
    pub fn from_config(config: &CrawlerConfig, rate_limiter: Arc<RateLimiter>) -> FetcherResult<Self> {
        Ok(Self::new(
            build_http_client(&config.http)?,
            config.endpoints.clone(),
            rate_limiter,
            RetryPolicy::from(&config.retry),
        ))
    }

    /// Interrupt backoff and 429 waits of listing requests when shutdown is
    /// requested. [`Endpoint::Price`] waits are never interrupted.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Retry policy in use
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn pause(&self, endpoint: Endpoint, duration: Duration) -> FetcherResult<()> {
        match self.shutdown.as_ref().filter(|_| endpoint != Endpoint::Price) {
            Some(shutdown) => {
                if shutdown.is_shutdown_requested() {
                    return Err(FetcherError::Cancelled);
                }
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(()),
                    _ = shutdown.wait_for_shutdown() => Err(FetcherError::Cancelled),
                }
            }
            None => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }

    /// POST one request, retrying per the policy.
    ///
    /// Every attempt, including the one after a 429 wait, first takes a token
    /// from the rate limiter.
    ///
    /// # Errors
    /// [`FetcherError::RetriesExhausted`] once `max_retries` retries have
    /// failed, or [`FetcherError::Cancelled`] when a listing wait is
    /// interrupted.
    pub async fn post(&self, endpoint: Endpoint, params: &[(&'static str, String)]) -> FetcherResult<Value> {
        let url = self.endpoints.url(endpoint);
        let max_attempts = self.retry.max_retries + 1;
        let mut failures: u32 = 0;
        let mut last_context: Option<RetryContext> = None;

        loop {
            self.rate_limiter.acquire().await;

            let request_metrics = HttpRequestMetrics::start(endpoint.key(), failures + 1);
            let (err, error_type) = match self.client.post(url).form(params).send().await {
                Ok(response) => {
                    let status = response.status();
                    request_metrics.record_complete(status.as_u16());

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = rate_limit_wait(
                            parse_retry_after(response.headers()),
                            self.retry.default_retry_after,
                            self.retry.max_retry_after,
                        );
                        warn!(
                            endpoint = %endpoint,
                            wait_secs = wait.as_secs_f64(),
                            "Rate limited (429), waiting before retrying"
                        );
                        self.pause(endpoint, wait).await?;
                        continue;
                    }

                    if status.is_success() {
                        match response.json::<Value>().await {
                            Ok(payload) => {
                                if let Some(ctx) = last_context.as_mut() {
                                    ctx.attempt = failures + 1;
                                    info!("{}", ctx.format_success());
                                }
                                return Ok(payload);
                            }
                            Err(e) => (
                                FetcherError::ParseError(format!("failed to decode response: {e}")),
                                RetryErrorType::InvalidPayload,
                            ),
                        }
                    } else {
                        (FetcherError::HttpStatus(status.as_u16()), extract_error_type(Some(status), None))
                    }
                }
                Err(e) => {
                    request_metrics.record_network_error();
                    let error_type = extract_error_type(None, Some(&e));
                    (FetcherError::NetworkError(e.to_string()), error_type)
                }
            };

            failures += 1;
            let ctx = RetryContext::new(
                failures,
                max_attempts,
                error_type,
                self.retry.backoff,
                describe_params(params),
                err.to_string(),
                endpoint.key(),
            );

            if failures >= max_attempts {
                error!("{}", ctx.format_failure());
                return Err(FetcherError::RetriesExhausted {
                    endpoint,
                    attempts: failures,
                    last_error: Box::new(err),
                });
            }

            warn!("{}", ctx.format_retry());
            record_retry_backoff(self.retry.backoff, failures);
            last_context = Some(ctx);
            self.pause(endpoint, self.retry.backoff).await?;
        }
    }
}

#[async_trait]
impl FipeApi for FipeHttpClient {
    async fn fetch(&self, endpoint: Endpoint, params: &[(&'static str, String)]) -> FetcherResult<Value> {
        self.post(endpoint, params).await
    }
}
