//! Price Stream Service Integration Tests
//!
//! Drives the full service against scripted transports: a connector
//! whose connections are fed from test-owned channels, and a REST
//! source returning scripted rows.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;

use price_stream::{
    FetchError, MarketDataSource, PriceListener, PriceRecord, PriceStreamConfig,
    PriceStreamService, PriceUpdate, StreamConnector, TickStream, TransportError,
};

// =============================================================================
// Scripted transports
// =============================================================================

type TickSender = mpsc::UnboundedSender<Result<PriceUpdate, TransportError>>;
type TickReceiver = mpsc::UnboundedReceiver<Result<PriceUpdate, TransportError>>;

enum ConnectOutcome {
    /// Connection attempt fails.
    Fail(&'static str),
    /// Connection succeeds; ticks are whatever the test feeds in.
    Stream(TickReceiver),
}

/// Connector that pops one scripted outcome per connect attempt.
/// Once the script runs out, every further attempt fails.
struct ScriptedConnector {
    outcomes: parking_lot::Mutex<VecDeque<ConnectOutcome>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    fn new(outcomes: Vec<ConnectOutcome>) -> Self {
        Self {
            outcomes: parking_lot::Mutex::new(outcomes.into()),
            connects: AtomicUsize::new(0),
        }
    }

    fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct ScriptedStream {
    rx: TickReceiver,
}

#[async_trait]
impl TickStream for ScriptedStream {
    async fn next_update(&mut self) -> Option<Result<PriceUpdate, TransportError>> {
        self.rx.recv().await
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, _symbol: &str) -> Result<Box<dyn TickStream>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().pop_front() {
            Some(ConnectOutcome::Stream(rx)) => Ok(Box::new(ScriptedStream { rx })),
            Some(ConnectOutcome::Fail(msg)) => Err(TransportError::Connect(msg.to_string())),
            None => Err(TransportError::Connect("script exhausted".to_string())),
        }
    }
}

/// REST source serving one scripted price (or nothing).
struct ScriptedSource {
    price: parking_lot::Mutex<Option<Decimal>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(price: Option<Decimal>) -> Self {
        Self {
            price: parking_lot::Mutex::new(price),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    async fn latest_price(&self, symbol: &str) -> Result<Option<PriceUpdate>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .price
            .lock()
            .map(|p| PriceUpdate::bare(symbol.to_string(), p)))
    }

    async fn market_stats(&self) -> Result<Vec<PriceUpdate>, FetchError> {
        Ok(vec![])
    }
}

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct Recorder {
    records: parking_lot::Mutex<Vec<PriceRecord>>,
}

impl Recorder {
    fn listener(self: &Arc<Self>) -> PriceListener {
        let this = Arc::clone(self);
        Arc::new(move |record| this.records.lock().push(record.clone()))
    }

    fn count(&self) -> usize {
        self.records.lock().len()
    }

    fn last(&self) -> Option<PriceRecord> {
        self.records.lock().last().cloned()
    }
}

fn tick(symbol: &str, price: i64) -> Result<PriceUpdate, TransportError> {
    Ok(PriceUpdate::bare(symbol.to_string(), Decimal::from(price)))
}

fn fast_config() -> PriceStreamConfig {
    PriceStreamConfig {
        retry_delay: Duration::from_millis(25),
        poll_interval: Duration::from_millis(20),
        max_stream_retries: 0,
    }
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for: {what}"));
}

fn service(
    connector: Arc<ScriptedConnector>,
    source: Arc<ScriptedSource>,
) -> PriceStreamService {
    PriceStreamService::new(connector, source, fast_config())
}

// =============================================================================
// Streaming path
// =============================================================================

#[tokio::test]
async fn stream_ticks_are_merged_and_delivered() {
    let (tx, rx): (TickSender, TickReceiver) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![ConnectOutcome::Stream(rx)]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(Arc::clone(&connector), source);

    let recorder = Arc::new(Recorder::default());
    let _sub = service.subscribe("BTC-USD", recorder.listener()).unwrap();

    tx.send(tick("BTC-USD", 50_000)).unwrap();
    wait_until("first record", || recorder.count() == 1).await;

    tx.send(tick("BTC-USD", 51_000)).unwrap();
    wait_until("second record", || recorder.count() == 2).await;

    let record = recorder.last().unwrap();
    assert_eq!(record.symbol, "BTC-USD");
    assert_eq!(record.price, Decimal::from(51_000));
    assert_eq!(record.change_24h, Decimal::from(1_000));
    assert_eq!(record.change_percent_24h, Decimal::from(2));
    assert_eq!(record.high_24h, Decimal::from(51_000));
    assert_eq!(record.low_24h, Decimal::from(50_000));

    assert_eq!(
        service.last_price("BTC-USD").unwrap().price,
        Decimal::from(51_000)
    );
}

#[tokio::test]
async fn listeners_run_in_registration_order() {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![ConnectOutcome::Stream(rx)]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(connector, source);

    let order: Arc<parking_lot::Mutex<Vec<&'static str>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));

    let first = {
        let order = Arc::clone(&order);
        Arc::new(move |_: &PriceRecord| order.lock().push("first"))
    };
    let second = {
        let order = Arc::clone(&order);
        Arc::new(move |_: &PriceRecord| order.lock().push("second"))
    };

    let _a = service.subscribe("BTC-USD", first).unwrap();
    let _b = service.subscribe("BTC-USD", second).unwrap();

    tx.send(tick("BTC-USD", 100)).unwrap();
    wait_until("both listeners", || order.lock().len() == 2).await;

    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[tokio::test]
async fn panicking_listener_does_not_starve_the_next() {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![ConnectOutcome::Stream(rx)]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(connector, source);

    let recorder = Arc::new(Recorder::default());
    let _bad = service
        .subscribe("BTC-USD", Arc::new(|_| panic!("listener blew up")))
        .unwrap();
    let _good = service.subscribe("BTC-USD", recorder.listener()).unwrap();

    tx.send(tick("BTC-USD", 100)).unwrap();
    wait_until("surviving listener", || recorder.count() == 1).await;

    tx.send(tick("BTC-USD", 101)).unwrap();
    wait_until("delivery continues", || recorder.count() == 2).await;
}

// =============================================================================
// Unsubscribe semantics
// =============================================================================

#[tokio::test]
async fn unsubscribe_is_an_immediate_cut_off() {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![ConnectOutcome::Stream(rx)]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(connector, source);

    let recorder = Arc::new(Recorder::default());
    let sub = service.subscribe("BTC-USD", recorder.listener()).unwrap();

    tx.send(tick("BTC-USD", 50_000)).unwrap();
    wait_until("first record", || recorder.count() == 1).await;

    sub.unsubscribe();

    // Ticks still sitting in the transport must not reach the listener.
    let _ = tx.send(tick("BTC-USD", 99_999));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.count(), 1);
    assert!(service.last_price("BTC-USD").is_none());
    assert!(service.active_symbols().is_empty());
}

#[tokio::test]
async fn remaining_listener_keeps_the_transport() {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![ConnectOutcome::Stream(rx)]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(connector, source);

    let kept = Arc::new(Recorder::default());
    let dropped = Arc::new(Recorder::default());

    let _keep = service.subscribe("BTC-USD", kept.listener()).unwrap();
    let sub = service.subscribe("BTC-USD", dropped.listener()).unwrap();
    sub.unsubscribe();

    tx.send(tick("BTC-USD", 42)).unwrap();
    wait_until("kept listener", || kept.count() == 1).await;

    assert_eq!(dropped.count(), 0);
    assert_eq!(service.active_symbols(), vec!["BTC-USD".to_string()]);
}

// =============================================================================
// Fallback and reconnect
// =============================================================================

#[tokio::test]
async fn transport_error_falls_back_to_polling() {
    let (tx, rx) = mpsc::unbounded_channel();
    // One good connection, then every reconnect attempt fails.
    let connector = Arc::new(ScriptedConnector::new(vec![ConnectOutcome::Stream(rx)]));
    let source = Arc::new(ScriptedSource::new(Some(Decimal::from(48_500))));
    let service = service(Arc::clone(&connector), Arc::clone(&source));

    let recorder = Arc::new(Recorder::default());
    let _sub = service.subscribe("BTC-USD", recorder.listener()).unwrap();

    tx.send(Err(TransportError::Receive("socket reset".to_string())))
        .unwrap();

    wait_until("polled record", || {
        recorder
            .last()
            .is_some_and(|r| r.price == Decimal::from(48_500))
    })
    .await;
    assert!(source.call_count() >= 1);
}

#[tokio::test]
async fn stream_reconnects_after_connect_failure() {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![
        ConnectOutcome::Fail("refused"),
        ConnectOutcome::Stream(rx),
    ]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(Arc::clone(&connector), source);

    let recorder = Arc::new(Recorder::default());
    let _sub = service.subscribe("BTC-USD", recorder.listener()).unwrap();

    wait_until("second connect attempt", || connector.connect_count() >= 2).await;

    tx.send(tick("BTC-USD", 7_777)).unwrap();
    wait_until("tick after reconnect", || recorder.count() == 1).await;
    assert_eq!(recorder.last().unwrap().price, Decimal::from(7_777));
}

#[tokio::test]
async fn reconnect_stops_the_polling_fallback() {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![
        ConnectOutcome::Fail("refused"),
        ConnectOutcome::Stream(rx),
    ]));
    let source = Arc::new(ScriptedSource::new(Some(Decimal::from(100))));
    let service = service(Arc::clone(&connector), Arc::clone(&source));

    let recorder = Arc::new(Recorder::default());
    let _sub = service.subscribe("BTC-USD", recorder.listener()).unwrap();

    // Poller runs while the first connect attempt has failed.
    wait_until("fallback poll", || source.call_count() >= 1).await;
    wait_until("reconnect", || connector.connect_count() >= 2).await;

    // Confirm the stream is live, then check polling has stopped.
    tx.send(tick("BTC-USD", 200)).unwrap();
    wait_until("stream tick", || {
        recorder.last().is_some_and(|r| r.price == Decimal::from(200))
    })
    .await;

    let calls_after_reconnect = source.call_count();
    tokio::time::sleep(Duration::from_millis(200)).await;
    // At most one in-flight poll may straddle the cancellation.
    assert!(source.call_count() <= calls_after_reconnect + 1);
}

#[tokio::test]
async fn polling_skips_cycles_with_no_data() {
    let connector = Arc::new(ScriptedConnector::new(vec![]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(connector, Arc::clone(&source));

    let recorder = Arc::new(Recorder::default());
    let _sub = service.subscribe("BTC-USD", recorder.listener()).unwrap();

    wait_until("polls attempted", || source.call_count() >= 3).await;
    assert_eq!(recorder.count(), 0);
    assert!(service.last_price("BTC-USD").is_none());

    // Data appearing later is picked up on the next cycle.
    *source.price.lock() = Some(Decimal::from(61_000));
    wait_until("late data", || recorder.count() >= 1).await;
    assert_eq!(recorder.last().unwrap().price, Decimal::from(61_000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_churn_leaves_transport_consistent_with_listeners() {
    // Every connect fails, so a live driver shows up as polling activity.
    let connector = Arc::new(ScriptedConnector::new(vec![]));
    let source = Arc::new(ScriptedSource::new(Some(Decimal::from(500))));
    let service = service(connector, Arc::clone(&source));

    // Race first-listener and last-listener transitions across threads.
    for _ in 0..50 {
        let a = {
            let service = service.clone();
            tokio::spawn(async move {
                let sub = service.subscribe("BTC-USD", Arc::new(|_| {})).unwrap();
                sub.unsubscribe();
            })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move {
                let sub = service.subscribe("BTC-USD", Arc::new(|_| {})).unwrap();
                sub.unsubscribe();
            })
        };
        a.await.unwrap();
        b.await.unwrap();
    }

    // No listeners left: no transport either.
    assert_eq!(service.listener_count("BTC-USD"), 0);
    assert!(service.active_symbols().is_empty());

    // A fresh subscription after the churn must get a live transport.
    let recorder = Arc::new(Recorder::default());
    let _sub = service.subscribe("BTC-USD", recorder.listener()).unwrap();
    assert_eq!(service.active_symbols(), vec!["BTC-USD".to_string()]);
    wait_until("delivery after churn", || recorder.count() >= 1).await;
}

// =============================================================================
// Surface errors and teardown
// =============================================================================

#[tokio::test]
async fn blank_symbol_is_rejected() {
    let connector = Arc::new(ScriptedConnector::new(vec![]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(connector, source);

    assert!(service.subscribe("  ", Arc::new(|_| {})).is_err());
    assert!(service.active_symbols().is_empty());
}

#[tokio::test]
async fn cleanup_stops_all_symbols() {
    let (tx_btc, rx_btc) = mpsc::unbounded_channel();
    let (_tx_eth, rx_eth) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![
        ConnectOutcome::Stream(rx_btc),
        ConnectOutcome::Stream(rx_eth),
    ]));
    let source = Arc::new(ScriptedSource::new(None));
    let service = service(connector, source);

    let recorder = Arc::new(Recorder::default());
    let _a = service.subscribe("BTC-USD", recorder.listener()).unwrap();
    let _b = service.subscribe("ETH-USD", recorder.listener()).unwrap();

    tx_btc.send(tick("BTC-USD", 1_000)).unwrap();
    wait_until("pre-cleanup record", || recorder.count() == 1).await;

    service.cleanup();

    let _ = tx_btc.send(tick("BTC-USD", 2_000));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.count(), 1);
    assert!(service.last_price("BTC-USD").is_none());
    assert!(service.last_price("ETH-USD").is_none());
    assert!(service.active_symbols().is_empty());
    assert_eq!(service.listener_count("BTC-USD"), 0);
    assert_eq!(service.listener_count("ETH-USD"), 0);
}
