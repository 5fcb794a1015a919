//! Port Definitions
//!
//! Interfaces to the two external price sources: the live streaming
//! transport and the REST market-data endpoint used for polling. The
//! service depends only on these traits, so tests drive it with
//! in-memory fakes.

use async_trait::async_trait;

use crate::domain::price::PriceUpdate;

// =============================================================================
// Errors
// =============================================================================

/// Streaming transport failure (socket error or close).
///
/// Never surfaced to listeners; the service recovers by polling and
/// retrying the stream on a fixed delay.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("transport connect failed: {0}")]
    Connect(String),

    /// Error while receiving from an established connection.
    #[error("transport receive failed: {0}")]
    Receive(String),

    /// The connection was closed (cleanly or not).
    #[error("transport closed")]
    Closed,
}

/// REST fetch failure during polling.
///
/// Never surfaced to listeners; a failed fetch skips that polling cycle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Request-level failure (connectivity, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status from the endpoint.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),
}

// =============================================================================
// Market data source (poll fallback)
// =============================================================================

/// Point-in-time market statistics source, used as the initial price
/// source and as the fallback while the stream transport is down.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the current price for a single symbol.
    ///
    /// Returns `Ok(None)` when the endpoint reports no data for the
    /// symbol.
    async fn latest_price(&self, symbol: &str) -> Result<Option<PriceUpdate>, FetchError>;

    /// Fetch market statistics for all symbols.
    async fn market_stats(&self) -> Result<Vec<PriceUpdate>, FetchError>;
}

// =============================================================================
// Streaming transport
// =============================================================================

/// An established per-symbol streaming connection yielding normalized
/// price updates.
///
/// Implementations own the wire codec: control messages and malformed
/// frames are consumed (and dropped) inside the adapter, so only usable
/// ticks and transport failures reach the caller.
#[async_trait]
pub trait TickStream: Send {
    /// Receive the next price update.
    ///
    /// `None` means the stream ended cleanly; `Some(Err(_))` means it
    /// failed. Either way the caller tears the connection down and goes
    /// through the reconnect path.
    async fn next_update(&mut self) -> Option<Result<PriceUpdate, TransportError>>;
}

/// Factory for per-symbol streaming connections.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a streaming connection for one symbol.
    async fn connect(&self, symbol: &str) -> Result<Box<dyn TickStream>, TransportError>;
}
