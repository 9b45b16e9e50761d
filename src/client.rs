//! HTTP client module for delivering readings to the core API.
//!
//! This module provides the reqwest-backed [`IngestClient`] that posts one reading per
//! request to `{api_url}/data`, with bounded timeouts and optional retry with exponential
//! backoff, and the [`ReadingSink`] seam the delivery task is written against.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::reading::Reading;

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between retries (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Errors that can occur while delivering a reading.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Server answered with anything other than 200
    #[error("Server error ({code}): {message}")]
    Status { code: StatusCode, message: String },

    /// All retry attempts exhausted
    #[error("All {attempts} attempts exhausted. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Request timeout
    #[error("Request timed out")]
    Timeout,

    /// Client configuration error
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Request(err)
        }
    }
}

impl DeliveryError {
    /// Whether another attempt could succeed.
    ///
    /// Connection errors, timeouts, 5xx and 429 are retryable; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            DeliveryError::Timeout => true,
            DeliveryError::Status { code, .. } => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            DeliveryError::RetriesExhausted { .. } => false,
            DeliveryError::Config(_) => false,
        }
    }
}

/// Destination of delivered readings.
///
/// The delivery task only needs this; tests substitute in-memory sinks.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Deliver one reading. `Ok` means the reading was accepted.
    async fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError>;
}

/// HTTP client for the core ingestion API.
///
/// The client reuses one reqwest connection pool and applies the configured timeout to
/// every request. With `max_retries == 0` each reading gets exactly one attempt.
#[derive(Debug, Clone)]
pub struct IngestClient {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,

    /// URL for the reading ingestion endpoint
    data_url: String,

    /// URL for the upstream liveness probe
    ping_url: String,

    /// Maximum number of retry attempts
    max_retries: u32,

    /// Request timeout duration
    timeout: Duration,
}

impl IngestClient {
    /// Create a new client from the collector configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Config` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, DeliveryError> {
        Self::with_settings(
            config.data_url.clone(),
            config.ping_url.clone(),
            config.request_timeout,
            config.max_retries,
        )
    }

    /// Create a new client with explicit endpoints and settings.
    pub fn with_settings(
        data_url: impl Into<String>,
        ping_url: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DeliveryError::Config(e.to_string()))?;

        Ok(Self {
            client,
            data_url: data_url.into(),
            ping_url: ping_url.into(),
            max_retries,
            timeout,
        })
    }

    /// Send one reading, retrying transient failures up to `max_retries` times.
    ///
    /// A reading that fails permanently is reported to the caller; the client never keeps
    /// it.
    pub async fn send_reading(&self, reading: &Reading) -> Result<(), DeliveryError> {
        let mut last_error: Option<DeliveryError> = None;
        let mut attempt = 0;

        while attempt <= self.max_retries {
            if attempt > 0 {
                let delay = self.calculate_backoff_delay(attempt);
                warn!(
                    attempt = attempt,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying reading after failure"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_request(reading).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if !e.is_retryable() || self.max_retries == 0 {
                        return Err(e);
                    }
                    debug!(error = %e, attempt = attempt + 1, "Delivery attempt failed");
                    last_error = Some(e);
                    attempt += 1;
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());

        Err(DeliveryError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Single POST without retry logic. Only HTTP 200 counts as success.
    async fn send_request(&self, reading: &Reading) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.data_url)
            .timeout(self.timeout)
            .json(reading)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(DeliveryError::Status {
            code: status,
            message,
        })
    }

    /// Probe the core API's liveness endpoint and return the round-trip time.
    pub async fn ping(&self) -> Result<Duration, DeliveryError> {
        let start = Instant::now();
        let response = self
            .client
            .get(&self.ping_url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DeliveryError::Status {
                code: status,
                message: "ping failed".to_string(),
            });
        }

        Ok(start.elapsed())
    }

    /// Calculate the backoff delay for a given retry attempt.
    ///
    /// Uses exponential backoff with jitter:
    /// delay = min(base_delay * 2^attempt + jitter, max_delay)
    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = DEFAULT_BASE_DELAY_MS.saturating_mul(1 << attempt.min(10));

        // Jitter up to 25% of the delay
        let jitter = rand::random::<u64>() % (exponential_delay / 4 + 1);

        let total_delay = exponential_delay
            .saturating_add(jitter)
            .min(MAX_RETRY_DELAY_MS);

        Duration::from_millis(total_delay)
    }

    /// Get the configured ingestion URL.
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Get the configured liveness probe URL.
    pub fn ping_url(&self) -> &str {
        &self.ping_url
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the request timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ReadingSink for IngestClient {
    async fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError> {
        self.send_reading(reading).await
    }
}
