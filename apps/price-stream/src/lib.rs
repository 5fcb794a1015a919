#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Price Stream - Live Market Price Service
//!
//! Maintains per-symbol live price subscriptions over a WebSocket stream
//! with a fixed-interval REST polling fallback. Each accepted price
//! observation is merged with the previously cached record and fanned
//! out to the symbol's listeners in registration order.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and logic
//!   - `price`: Price updates, records, and the merge rules
//!   - `subscription`: Symbol → listener registry
//!
//! - **Application**: Service and port definitions
//!   - `ports`: Interfaces for the streaming and REST price sources
//!   - `services`: The per-symbol price stream service and retry policy
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: WebSocket transport and tick codec
//!   - `rest`: REST statistics API fallback
//!   - `config`: Environment configuration
//!   - `telemetry`: Logging setup
//!
//! # Data Flow
//!
//! ```text
//! WebSocket (one per symbol) ──┐
//!                              ├──► merge into PriceRecord ──► listeners
//! REST poll (while WS down) ───┘          (cache)          (registration order)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure price and subscription types.
pub mod domain;

/// Application layer - Service and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::price::{PriceRecord, PriceUpdate, Symbol};
pub use domain::subscription::{ListenerId, PriceListener};

// Application surface
pub use application::ports::{FetchError, MarketDataSource, StreamConnector, TickStream, TransportError};
pub use application::services::price_stream::{
    PriceStreamConfig, PriceStreamService, PriceSubscription, SubscribeError,
};
pub use application::services::retry::{RetryConfig, RetryPolicy};

// Infrastructure adapters
pub use infrastructure::config::{ConfigError, ServiceConfig};
pub use infrastructure::rest::RestMarketData;
pub use infrastructure::stream::{TickCodec, WsConnector};
