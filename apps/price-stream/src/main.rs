//! Price Stream Binary
//!
//! Starts the live price service and subscribes to the configured
//! symbols, logging every delivered record until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRICE_STREAM_WS_URL`: Base WebSocket URL (symbol appended as path)
//! - `PRICE_STREAM_REST_URL`: Base URL of the market data REST API
//!
//! ## Optional
//! - `PRICE_STREAM_SYMBOLS`: Comma-separated symbols (default: BTC-USD)
//! - `PRICE_STREAM_RETRY_DELAY_SECS`: Stream retry delay (default: 5)
//! - `PRICE_STREAM_POLL_INTERVAL_SECS`: Polling interval (default: 5)
//! - `PRICE_STREAM_MAX_RETRIES`: Stream retry cap, 0 = unlimited (default: 0)
//! - `PRICE_STREAM_PING_INTERVAL_SECS`: Keep-alive interval (default: 20)
//! - `PRICE_STREAM_REQUEST_TIMEOUT_SECS`: REST timeout (default: 10)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use price_stream::infrastructure::telemetry;
use price_stream::{
    PriceStreamService, PriceSubscription, RestMarketData, ServiceConfig, WsConnector,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    // Optional .env for local development.
    let _ = dotenvy::dotenv();

    telemetry::init();

    let config = ServiceConfig::from_env()?;
    tracing::info!(
        ws_url = %config.stream.ws_base_url,
        rest_url = %config.rest.rest_base_url,
        symbols = ?config.symbols,
        "starting price stream service"
    );

    let connector = Arc::new(WsConnector::new(config.stream.clone()));
    let source = Arc::new(RestMarketData::new(&config.rest)?);
    let service = PriceStreamService::new(connector, source, config.price_stream_config());

    let mut subscriptions: Vec<PriceSubscription> = Vec::with_capacity(config.symbols.len());
    for symbol in &config.symbols {
        let sub = service.subscribe(
            symbol,
            Arc::new(|record| {
                tracing::info!(
                    symbol = %record.symbol,
                    price = %record.price,
                    change_24h = %record.change_24h,
                    change_percent_24h = %record.change_percent_24h,
                    "price"
                );
            }),
        )?;
        subscriptions.push(sub);
    }

    signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    for sub in subscriptions {
        sub.unsubscribe();
    }
    service.cleanup();

    Ok(())
}
