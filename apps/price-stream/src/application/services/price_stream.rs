//! Price Stream Service
//!
//! Maintains zero or more independent per-symbol live-price
//! subscriptions. For each symbol the service owns exactly one transport:
//! a streaming connection when one can be held open, or a fixed-interval
//! REST poll while it cannot. Every accepted observation is merged with
//! the previously cached record and fanned out to the symbol's listeners
//! in registration order.
//!
//! # Transport lifecycle
//!
//! A symbol's driver task starts when its first listener registers and
//! stops when its last listener leaves. The driver attempts the stream
//! first; on connect failure, transport error, or close it starts the
//! poller for continuity and retries the stream after a fixed delay.
//! A successful reconnect cancels the poller, so the two transports never
//! deliver concurrently.
//!
//! Stream ticks and poll results race on the cache last-write-wins; no
//! timestamp gate rejects out-of-order data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MarketDataSource, StreamConnector, TickStream};
use crate::application::services::retry::{RetryConfig, RetryPolicy};
use crate::domain::price::{PriceRecord, PriceUpdate, Symbol};
use crate::domain::subscription::{ListenerId, PriceListener, SubscriberRegistry};

// =============================================================================
// Configuration
// =============================================================================

/// Timing knobs for the per-symbol transport state machine.
#[derive(Debug, Clone)]
pub struct PriceStreamConfig {
    /// Fixed delay before retrying the streaming transport after a
    /// failure.
    pub retry_delay: Duration,
    /// Interval of the REST polling fallback.
    pub poll_interval: Duration,
    /// Stream reconnection attempts before the symbol runs on polling
    /// alone (0 = retry forever).
    pub max_stream_retries: u32,
}

impl Default for PriceStreamConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
            max_stream_retries: 0,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Error returned by [`PriceStreamService::subscribe`].
///
/// The only caller-facing error in this component; everything downstream
/// of a successful subscribe recovers internally.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscribeError {
    /// The subscribe input was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// =============================================================================
// Subscription handle
// =============================================================================

/// Handle removing one registered listener.
///
/// Calling [`unsubscribe`](Self::unsubscribe) (or dropping the handle)
/// removes exactly this listener before returning; if it was the last
/// listener for the symbol, the transport is cancelled and the cached
/// record discarded. Idempotent.
pub struct PriceSubscription {
    inner: Arc<ServiceInner>,
    symbol: Symbol,
    id: ListenerId,
    released: bool,
}

impl PriceSubscription {
    /// The symbol this subscription is for.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Remove the listener.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.inner.remove_listener(&self.symbol, self.id);
    }
}

impl Drop for PriceSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Service
// =============================================================================

/// Per-symbol live price subscriptions with streaming transport and
/// polling fallback.
///
/// Construct one instance per application lifetime and pass it where
/// needed; all state is instance-owned. Methods must be called from
/// within a Tokio runtime (the service spawns per-symbol tasks).
///
/// Listeners are invoked synchronously on the delivery path and must not
/// call [`subscribe`](Self::subscribe) or unsubscribe from inside the
/// callback.
#[derive(Clone)]
pub struct PriceStreamService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: PriceStreamConfig,
    connector: Arc<dyn StreamConnector>,
    source: Arc<dyn MarketDataSource>,
    registry: SubscriberRegistry,
    cache: RwLock<HashMap<Symbol, PriceRecord>>,
    drivers: Mutex<HashMap<Symbol, CancellationToken>>,
    // Serializes the cache-and-notify path so stream ticks and poll
    // results are delivered in production order, and teardown cannot
    // interleave with an in-flight delivery.
    apply_lock: Mutex<()>,
}

impl PriceStreamService {
    /// Create a new service over the given transports.
    #[must_use]
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        source: Arc<dyn MarketDataSource>,
        config: PriceStreamConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                connector,
                source,
                registry: SubscriberRegistry::new(),
                cache: RwLock::new(HashMap::new()),
                drivers: Mutex::new(HashMap::new()),
                apply_lock: Mutex::new(()),
            }),
        }
    }

    /// Register a listener for a symbol.
    ///
    /// The first listener for a symbol starts its transport. Multiple
    /// independent listeners per symbol are supported.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::InvalidArgument`] when the symbol is
    /// empty or blank.
    pub fn subscribe(
        &self,
        symbol: &str,
        listener: PriceListener,
    ) -> Result<PriceSubscription, SubscribeError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(SubscribeError::InvalidArgument(
                "symbol must be a non-empty string".to_string(),
            ));
        }

        // Registry transition and driver start are one atomic step under
        // the drivers lock; a concurrent last-listener removal cannot
        // interleave and cancel the driver spawned here.
        let outcome = {
            let mut drivers = self.inner.drivers.lock();
            let outcome = self.inner.registry.add(symbol, listener);
            if outcome.first_for_symbol {
                let token = CancellationToken::new();
                drivers.insert(symbol.to_string(), token.clone());
                tokio::spawn(drive_symbol(
                    Arc::clone(&self.inner),
                    symbol.to_string(),
                    token,
                ));
            }
            outcome
        };

        tracing::debug!(
            symbol,
            listener_id = outcome.id,
            listeners = self.inner.registry.listener_count(symbol),
            "listener subscribed"
        );

        Ok(PriceSubscription {
            inner: Arc::clone(&self.inner),
            symbol: symbol.to_string(),
            id: outcome.id,
            released: false,
        })
    }

    /// Most recent record observed for the symbol, or `None` if no data
    /// has arrived yet. Never triggers a fetch.
    #[must_use]
    pub fn last_price(&self, symbol: &str) -> Option<PriceRecord> {
        self.inner.cache.read().get(symbol).cloned()
    }

    /// Tear down every transport and clear all subscriber and cache
    /// state. Idempotent; intended for process teardown.
    pub fn cleanup(&self) {
        // Drain and clear under the drivers lock so a concurrent
        // subscribe cannot slot a fresh driver in between.
        let tokens: Vec<CancellationToken> = {
            let mut drivers = self.inner.drivers.lock();
            let tokens = drivers.drain().map(|(_, token)| token).collect();
            self.inner.registry.clear();
            tokens
        };
        for token in tokens {
            token.cancel();
        }

        let _serialize = self.inner.apply_lock.lock();
        self.inner.cache.write().clear();
        tracing::info!("price stream service cleaned up");
    }

    /// Number of listeners currently registered for a symbol.
    #[must_use]
    pub fn listener_count(&self, symbol: &str) -> usize {
        self.inner.registry.listener_count(symbol)
    }

    /// Symbols with an active transport.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.inner.drivers.lock().keys().cloned().collect()
    }
}

impl ServiceInner {
    fn remove_listener(&self, symbol: &str, id: ListenerId) {
        // Same atomic step as subscribe: the last-listener transition and
        // the driver teardown happen under the drivers lock, so only the
        // driver this removal observed can be cancelled.
        let last_for_symbol = {
            let mut drivers = self.drivers.lock();
            let outcome = self.registry.remove(symbol, id);
            if outcome.last_for_symbol
                && let Some(token) = drivers.remove(symbol)
            {
                token.cancel();
            }
            outcome.last_for_symbol
        };

        if last_for_symbol {
            let _serialize = self.apply_lock.lock();
            self.cache.write().remove(symbol);
            tracing::info!(symbol, "symbol transport stopped");
        }
        tracing::debug!(symbol, listener_id = id, "listener unsubscribed");
    }

    /// Cache-and-notify path shared by stream ticks and poll results.
    fn apply(&self, symbol: &str, update: &PriceUpdate) {
        if update.symbol != symbol {
            tracing::trace!(
                symbol,
                tick_symbol = %update.symbol,
                "discarding update for other symbol"
            );
            return;
        }
        if !update.has_positive_price() {
            tracing::debug!(symbol, price = %update.price, "discarding non-positive price");
            return;
        }

        let _serialize = self.apply_lock.lock();
        if !self.registry.has_listeners(symbol) {
            // Unsubscribed while this observation was in flight.
            return;
        }

        let record = {
            let cache = self.cache.read();
            PriceRecord::next(cache.get(symbol), update, Utc::now())
        };
        self.cache
            .write()
            .insert(symbol.to_string(), record.clone());

        let delivered = self.registry.notify(symbol, &record);
        tracing::trace!(symbol, delivered, price = %record.price, "price record delivered");
    }

    /// One polling cycle: prefer the current-price endpoint, fall back to
    /// the market-statistics list, skip the cycle when neither yields a
    /// usable row.
    async fn poll_once(&self, symbol: &str) -> Option<PriceUpdate> {
        match self.source.latest_price(symbol).await {
            Ok(Some(update)) if update.has_positive_price() => return Some(update),
            Ok(Some(update)) => {
                tracing::debug!(symbol, price = %update.price, "current price non-positive");
            }
            Ok(None) => {
                tracing::debug!(symbol, "current price endpoint returned no data");
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "current price fetch failed");
            }
        }

        match self.source.market_stats().await {
            Ok(stats) => {
                let row = stats
                    .into_iter()
                    .find(|u| u.symbol == symbol && u.has_positive_price());
                if row.is_none() {
                    tracing::debug!(symbol, "no market stats row, skipping poll cycle");
                }
                row
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "market stats fetch failed, skipping poll cycle");
                None
            }
        }
    }
}

// =============================================================================
// Per-symbol driver
// =============================================================================

/// Transport state machine for one symbol. Runs until cancelled.
async fn drive_symbol(inner: Arc<ServiceInner>, symbol: Symbol, cancel: CancellationToken) {
    let mut poller: Option<CancellationToken> = None;
    let mut retry = RetryPolicy::new(RetryConfig {
        delay: inner.config.retry_delay,
        max_attempts: inner.config.max_stream_retries,
    });

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match inner.connector.connect(&symbol).await {
            Ok(mut stream) => {
                // Streaming is live; the fallback poller must not
                // double-deliver.
                if let Some(token) = poller.take() {
                    token.cancel();
                }
                retry.reset();
                tracing::info!(symbol = %symbol, "price stream connected");
                stream_until_failure(&inner, &symbol, stream.as_mut(), &cancel).await;
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "price stream connect failed");
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        // Transport is down: poll for continuity while the retry delay
        // runs, then attempt the stream again.
        if poller.is_none() {
            let token = cancel.child_token();
            tokio::spawn(poll_symbol(
                Arc::clone(&inner),
                symbol.clone(),
                token.clone(),
            ));
            poller = Some(token);
        }

        let Some(delay) = retry.next_delay() else {
            tracing::warn!(
                symbol = %symbol,
                attempts = retry.attempt_count(),
                "stream retries exhausted, staying on polling"
            );
            cancel.cancelled().await;
            break;
        };
        tracing::debug!(
            symbol = %symbol,
            attempt = retry.attempt_count(),
            "retrying price stream"
        );

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    if let Some(token) = poller {
        token.cancel();
    }
    tracing::debug!(symbol = %symbol, "price stream driver stopped");
}

/// Consume the stream until it errors, closes, or the symbol is
/// cancelled.
async fn stream_until_failure(
    inner: &ServiceInner,
    symbol: &str,
    stream: &mut dyn TickStream,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            update = stream.next_update() => match update {
                Some(Ok(update)) => inner.apply(symbol, &update),
                Some(Err(e)) => {
                    tracing::warn!(symbol, error = %e, "price stream transport error");
                    return;
                }
                None => {
                    tracing::info!(symbol, "price stream closed");
                    return;
                }
            }
        }
    }
}

/// Fixed-interval polling fallback for one symbol. The first cycle fires
/// immediately for continuity after a transport failure.
async fn poll_symbol(inner: Arc<ServiceInner>, symbol: Symbol, cancel: CancellationToken) {
    tracing::info!(symbol = %symbol, "falling back to polling");

    let mut interval = tokio::time::interval(inner.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !inner.registry.has_listeners(&symbol) {
                    break;
                }
                if let Some(update) = inner.poll_once(&symbol).await {
                    inner.apply(&symbol, &update);
                }
            }
        }
    }
    tracing::debug!(symbol = %symbol, "polling stopped");
}

// =============================================================================
// Tests
// =============================================================================
