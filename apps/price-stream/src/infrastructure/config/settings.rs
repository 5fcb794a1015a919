//! Service Configuration Settings
//!
//! Configuration types for the price stream service, loaded from
//! environment variables.

use std::time::Duration;

use crate::application::services::price_stream::PriceStreamConfig;

/// Streaming transport settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Base WebSocket URL; the symbol is appended as a path segment.
    pub ws_base_url: String,
    /// Delay between stream reconnection attempts.
    pub retry_delay: Duration,
    /// Stream reconnection attempts before a symbol stays on polling
    /// (0 = unlimited).
    pub max_stream_retries: u32,
    /// Interval between application-level keep-alive pings.
    pub ping_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ws_base_url: String::new(),
            retry_delay: Duration::from_secs(5),
            max_stream_retries: 0,
            ping_interval: Duration::from_secs(20),
        }
    }
}

/// REST fallback settings.
#[derive(Debug, Clone)]
pub struct RestSettings {
    /// Base URL of the market data REST API.
    pub rest_base_url: String,
    /// Interval of the polling fallback.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            rest_base_url: String::new(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Streaming transport settings.
    pub stream: StreamSettings,
    /// REST fallback settings.
    pub rest: RestSettings,
    /// Symbols subscribed by the standalone binary at startup.
    pub symbols: Vec<String>,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_STREAM_WS_URL` or `PRICE_STREAM_REST_URL`
    /// is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_base_url = require_env("PRICE_STREAM_WS_URL")?;
        let rest_base_url = require_env("PRICE_STREAM_REST_URL")?;

        let stream = StreamSettings {
            ws_base_url: ws_base_url.trim_end_matches('/').to_string(),
            retry_delay: parse_env_duration_secs(
                "PRICE_STREAM_RETRY_DELAY_SECS",
                StreamSettings::default().retry_delay,
            ),
            max_stream_retries: parse_env_u32(
                "PRICE_STREAM_MAX_RETRIES",
                StreamSettings::default().max_stream_retries,
            ),
            ping_interval: parse_env_duration_secs(
                "PRICE_STREAM_PING_INTERVAL_SECS",
                StreamSettings::default().ping_interval,
            ),
        };

        let rest = RestSettings {
            rest_base_url: rest_base_url.trim_end_matches('/').to_string(),
            poll_interval: parse_env_duration_secs(
                "PRICE_STREAM_POLL_INTERVAL_SECS",
                RestSettings::default().poll_interval,
            ),
            request_timeout: parse_env_duration_secs(
                "PRICE_STREAM_REQUEST_TIMEOUT_SECS",
                RestSettings::default().request_timeout,
            ),
        };

        let symbols = std::env::var("PRICE_STREAM_SYMBOLS")
            .unwrap_or_else(|_| "BTC-USD".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            stream,
            rest,
            symbols,
        })
    }

    /// Timing knobs for the service built from these settings.
    #[must_use]
    pub const fn price_stream_config(&self) -> PriceStreamConfig {
        PriceStreamConfig {
            retry_delay: self.stream.retry_delay,
            poll_interval: self.rest.poll_interval,
            max_stream_retries: self.stream.max_stream_retries,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    let value =
        std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_secs)
}
