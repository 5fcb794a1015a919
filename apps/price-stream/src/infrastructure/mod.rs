//! Infrastructure layer.
//!
//! Adapters over the outside world: WebSocket streaming transport, REST
//! fallback source, configuration, and telemetry.

/// Configuration loading.
pub mod config;

/// REST fallback market data source.
pub mod rest;

/// WebSocket streaming transport.
pub mod stream;

/// Logging setup.
pub mod telemetry;
