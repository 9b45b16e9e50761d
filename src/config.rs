//! Configuration module for the collector daemon.
//!
//! This module provides environment-based configuration: the core API location, task
//! pacing, timeouts, queue sizing and the control surface address.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::queue::{OverflowPolicy, DEFAULT_QUEUE_CAPACITY};

/// Default base URL of the core API
const DEFAULT_API_URL: &str = "http://core:8000";

/// Default period between heartbeat cycles in seconds
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Default pause after each enqueued reading in milliseconds
const DEFAULT_COLLECT_DELAY_MS: u64 = 1_000;

/// Default HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default timeout for a single device exchange in milliseconds
const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 2_000;

/// Default port of the control surface (bound on all interfaces)
const DEFAULT_CONTROL_PORT: u16 = 8001;

/// Maximum queue depth to keep memory bounded
const MAX_QUEUE_CAPACITY: usize = 100_000;

/// Upper bound on delivery retries
const MAX_RETRIES_LIMIT: u32 = 10;

/// Configuration for the collector daemon.
///
/// All settings can be configured via environment variables:
/// - `COLLECTOR_API_URL`: core API base URL (default: http://core:8000)
/// - `COLLECTOR_HEARTBEAT_INTERVAL_SECS`: seconds between heartbeat cycles (default: 5)
/// - `COLLECTOR_COLLECT_DELAY_MS`: pause after each enqueued reading (default: 1000)
/// - `COLLECTOR_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 10)
/// - `COLLECTOR_DEVICE_TIMEOUT_MS`: device exchange timeout (default: 2000)
/// - `COLLECTOR_QUEUE_CAPACITY`: maximum queued readings (default: 1000)
/// - `COLLECTOR_OVERFLOW_POLICY`: `block` or `drop_oldest` (default: block)
/// - `COLLECTOR_MAX_RETRIES`: delivery retries per reading (default: 0)
/// - `COLLECTOR_CONTROL_ADDR`: control surface bind address (default: 0.0.0.0:8001)
/// - `COLLECTOR_FINGERPRINT`: override the computed host fingerprint
/// - `COLLECTOR_DEMO_DEVICE`: attach the built-in simulated device (default: true)
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL for the core API
    pub api_url: String,

    /// Full URL of the reading ingestion endpoint
    pub data_url: String,

    /// Full URL of the upstream liveness probe
    pub ping_url: String,

    /// Period between heartbeat cycles
    pub heartbeat_interval: Duration,

    /// Pause after each enqueued reading
    pub collect_delay: Duration,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// Timeout for one device exchange
    pub device_timeout: Duration,

    /// Maximum number of queued readings
    pub queue_capacity: usize,

    /// Behavior of a full queue
    pub overflow_policy: OverflowPolicy,

    /// Retry attempts per reading; 0 means at-most-once delivery
    pub max_retries: u32,

    /// Bind address of the control surface
    pub control_addr: SocketAddr,

    /// Fingerprint override; computed from the host when `None`
    pub fingerprint: Option<String>,

    /// Whether to attach the built-in simulated device at startup
    pub demo_device: bool,
}

/// Error type for configuration loading failures
#[derive(Debug, Error)]
#[error("Configuration error{}: {message}", var_suffix(.env_var))]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

fn var_suffix(env_var: &Option<String>) -> String {
    env_var
        .as_ref()
        .map(|var| format!(" for {}", var))
        .unwrap_or_default()
}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Returns a new `Config` instance with values from environment variables,
    /// falling back to defaults where a variable is unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but is not a valid value or falls
    /// outside its allowed range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensor_collector::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("API URL: {}", config.api_url);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("COLLECTOR_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_url = api_url.trim_end_matches('/').to_string();
        if api_url.is_empty() {
            return Err(ConfigError::for_var("COLLECTOR_API_URL", "URL must not be empty"));
        }

        let heartbeat_secs = parse_ranged(
            "COLLECTOR_HEARTBEAT_INTERVAL_SECS",
            DEFAULT_HEARTBEAT_INTERVAL_SECS,
            1,
            300,
        )?;
        let collect_delay_ms =
            parse_ranged("COLLECTOR_COLLECT_DELAY_MS", DEFAULT_COLLECT_DELAY_MS, 1, 60_000)?;
        let request_timeout_secs = parse_ranged(
            "COLLECTOR_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
            1,
            120,
        )?;
        let device_timeout_ms =
            parse_ranged("COLLECTOR_DEVICE_TIMEOUT_MS", DEFAULT_DEVICE_TIMEOUT_MS, 10, 60_000)?;
        let queue_capacity = parse_ranged(
            "COLLECTOR_QUEUE_CAPACITY",
            DEFAULT_QUEUE_CAPACITY,
            1,
            MAX_QUEUE_CAPACITY,
        )?;
        let max_retries = parse_ranged("COLLECTOR_MAX_RETRIES", 0, 0, MAX_RETRIES_LIMIT)?;

        let overflow_policy = match env::var("COLLECTOR_OVERFLOW_POLICY") {
            Ok(value) => value
                .parse::<OverflowPolicy>()
                .map_err(|e| ConfigError::for_var("COLLECTOR_OVERFLOW_POLICY", e))?,
            Err(_) => OverflowPolicy::default(),
        };

        let control_addr = parse_value(
            "COLLECTOR_CONTROL_ADDR",
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT)),
            "is not a valid socket address",
        )?;

        let fingerprint = match env::var("COLLECTOR_FINGERPRINT") {
            Ok(value) if value.trim().is_empty() => {
                return Err(ConfigError::for_var(
                    "COLLECTOR_FINGERPRINT",
                    "fingerprint must not be empty",
                ))
            }
            Ok(value) => Some(value.trim().to_string()),
            Err(_) => None,
        };

        let demo_device = parse_value("COLLECTOR_DEMO_DEVICE", true, "is not a valid boolean")?;

        Ok(Self {
            data_url: format!("{}/data", api_url),
            ping_url: format!("{}/ping", api_url),
            api_url,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            collect_delay: Duration::from_millis(collect_delay_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            device_timeout: Duration::from_millis(device_timeout_ms),
            queue_capacity,
            overflow_policy,
            max_retries,
            control_addr,
            fingerprint,
            demo_device,
        })
    }

    /// Configuration pointing at a different core API, keeping every other setting.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        let api_url = api_url.trim_end_matches('/');
        self.api_url = api_url.to_string();
        self.data_url = format!("{}/data", api_url);
        self.ping_url = format!("{}/ping", api_url);
        self
    }
}

/// Parse an optional variable with `FromStr`, falling back to `default` when unset.
fn parse_value<T: FromStr>(env_var: &str, default: T, invalid: &str) -> Result<T, ConfigError> {
    match env::var(env_var) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::for_var(env_var, format!("'{}' {}", value, invalid))),
        Err(_) => Ok(default),
    }
}

/// Parse an optional numeric variable and check it against `[min, max]`.
fn parse_ranged<T>(env_var: &str, default: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let value = parse_value(env_var, default, "is not a valid number")?;

    if value < min {
        return Err(ConfigError::for_var(
            env_var,
            format!("{} is below minimum ({})", value, min),
        ));
    }

    if value > max {
        return Err(ConfigError::for_var(
            env_var,
            format!("{} exceeds maximum ({})", value, max),
        ));
    }

    Ok(value)
}

impl Default for Config {
    /// Create a configuration from default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_url: format!("{}/data", DEFAULT_API_URL),
            ping_url: format!("{}/ping", DEFAULT_API_URL),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            collect_delay: Duration::from_millis(DEFAULT_COLLECT_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            device_timeout: Duration::from_millis(DEFAULT_DEVICE_TIMEOUT_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            max_retries: 0,
            control_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT)),
            fingerprint: None,
            demo_device: true,
        }
    }
}
