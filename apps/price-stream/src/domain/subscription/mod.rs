//! Subscriber Registry
//!
//! Tracks which listeners are registered for which symbols and fans new
//! price records out to them.
//!
//! # Design
//!
//! The registry owns the listener callbacks themselves. Per symbol it
//! keeps an ordered list (registration order is the delivery order), and
//! add/remove report the first/last transitions so the caller can drive
//! the transport lifecycle: a symbol's transport exists if and only if its
//! listener set is non-empty.
//!
//! Notification runs under the registry lock, which is what makes
//! unsubscribing an immediate cut-off: once `remove` returns, the listener
//! can no longer be invoked. Listeners therefore must not call back into
//! the registry (or the service that owns it) from inside the callback.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::price::{PriceRecord, Symbol};

/// Unique identifier for a registered listener.
pub type ListenerId = u64;

/// A caller-supplied callback invoked with each new record for a symbol.
pub type PriceListener = Arc<dyn Fn(&PriceRecord) + Send + Sync>;

/// Outcome of adding a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// The identifier assigned to the listener.
    pub id: ListenerId,
    /// Whether this was the first listener for the symbol.
    pub first_for_symbol: bool,
}

/// Outcome of removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Whether the listener was actually registered.
    pub removed: bool,
    /// Whether the symbol's listener set is now empty.
    pub last_for_symbol: bool,
}

#[derive(Default)]
struct SymbolListeners {
    // Registration order is delivery order.
    entries: Vec<(ListenerId, PriceListener)>,
}

/// Symbol → ordered listener set, with first/last transition reporting.
pub struct SubscriberRegistry {
    listeners: Mutex<HashMap<Symbol, SymbolListeners>>,
    next_id: AtomicU64,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for a symbol.
    pub fn add(&self, symbol: &str, listener: PriceListener) -> AddOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.listeners.lock();
        let entry = map.entry(symbol.to_string()).or_default();
        let first_for_symbol = entry.entries.is_empty();
        entry.entries.push((id, listener));

        AddOutcome {
            id,
            first_for_symbol,
        }
    }

    /// Remove a previously registered listener.
    ///
    /// Removing an unknown id is a no-op (`removed == false`).
    pub fn remove(&self, symbol: &str, id: ListenerId) -> RemoveOutcome {
        let mut map = self.listeners.lock();
        let Some(entry) = map.get_mut(symbol) else {
            return RemoveOutcome {
                removed: false,
                last_for_symbol: false,
            };
        };

        let before = entry.entries.len();
        entry.entries.retain(|(lid, _)| *lid != id);
        let removed = entry.entries.len() != before;

        let last_for_symbol = removed && entry.entries.is_empty();
        if entry.entries.is_empty() {
            map.remove(symbol);
        }

        RemoveOutcome {
            removed,
            last_for_symbol,
        }
    }

    /// Whether the symbol currently has at least one listener.
    #[must_use]
    pub fn has_listeners(&self, symbol: &str) -> bool {
        self.listeners
            .lock()
            .get(symbol)
            .is_some_and(|e| !e.entries.is_empty())
    }

    /// Number of listeners registered for a symbol.
    #[must_use]
    pub fn listener_count(&self, symbol: &str) -> usize {
        self.listeners
            .lock()
            .get(symbol)
            .map_or(0, |e| e.entries.len())
    }

    /// Symbols that currently have listeners.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.listeners.lock().keys().cloned().collect()
    }

    /// Deliver a record to every listener for its symbol, in registration
    /// order.
    ///
    /// A panicking listener is isolated and logged; delivery continues to
    /// the remaining listeners. Returns the number of successful
    /// deliveries.
    pub fn notify(&self, symbol: &str, record: &PriceRecord) -> usize {
        let map = self.listeners.lock();
        let Some(entry) = map.get(symbol) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, listener) in &entry.entries {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(record)));
            if result.is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(symbol, listener_id = id, "listener panicked during delivery");
            }
        }
        delivered
    }

    /// Drop every listener for every symbol.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
