//! Streaming Transport Module
//!
//! WebSocket client for live price ticks. One connection per symbol; the
//! symbol is part of the URL path, so no subscribe frame is required
//! after connecting.
//!
//! Keep-alive runs at both levels: protocol pings from the server are
//! answered with pongs, and the client sends application-level
//! `{"type":"ping"}` frames on a fixed interval.

mod codec;

pub use codec::{CodecError, TickCodec};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{StreamConnector, TickStream, TransportError};
use crate::domain::price::PriceUpdate;
use crate::infrastructure::config::StreamSettings;

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connector
// =============================================================================

/// WebSocket connector for per-symbol price streams.
pub struct WsConnector {
    settings: StreamSettings,
}

impl WsConnector {
    /// Create a connector over the configured base URL.
    #[must_use]
    pub const fn new(settings: StreamSettings) -> Self {
        Self { settings }
    }

    fn symbol_url(&self, symbol: &str) -> String {
        format!("{}/{symbol}", self.settings.ws_base_url)
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, symbol: &str) -> Result<Box<dyn TickStream>, TransportError> {
        let url = self.symbol_url(symbol);
        tracing::debug!(symbol, url = %url, "opening price stream");

        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Box::new(WsTickStream::new(
            ws,
            self.settings.ping_interval,
        )))
    }
}

// =============================================================================
// Tick stream
// =============================================================================

/// One live WebSocket connection, decoded to price updates.
pub struct WsTickStream {
    ws: WsConnection,
    codec: TickCodec,
    ping_interval: tokio::time::Interval,
}

impl WsTickStream {
    fn new(ws: WsConnection, ping_every: std::time::Duration) -> Self {
        let mut ping_interval = tokio::time::interval(ping_every);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the immediate first tick; the connection is fresh.
        ping_interval.reset();

        Self {
            ws,
            codec: TickCodec::new(),
            ping_interval,
        }
    }
}

#[async_trait]
impl TickStream for WsTickStream {
    async fn next_update(&mut self) -> Option<Result<PriceUpdate, TransportError>> {
        loop {
            tokio::select! {
                _ = self.ping_interval.tick() => {
                    let ping = self.codec.encode_ping();
                    if let Err(e) = self.ws.send(Message::Text(ping.into())).await {
                        return Some(Err(TransportError::Receive(e.to_string())));
                    }
                }
                frame = self.ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => match self.codec.decode(&text) {
                        Ok(Some(update)) => return Some(Ok(update)),
                        Ok(None) => {}
                        Err(e) => {
                            // A malformed frame is dropped, not fatal.
                            tracing::debug!(error = %e, "undecodable stream frame");
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = self.ws.send(Message::Pong(payload)).await {
                            return Some(Err(TransportError::Receive(e.to_string())));
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Err(e)) => return Some(Err(TransportError::Receive(e.to_string()))),
                }
            }
        }
    }
}
