//! `TradesStore`: fans incoming trades out to per-symbol registered callbacks.

use crate::model::PublicTrade;
use crate::transport::TradeTransport;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use venue_instrument::Symbol;

type TradeCallback = Arc<dyn Fn(PublicTrade) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    by_symbol: Mutex<HashMap<Symbol, HashSet<u64>>>,
    callbacks: Mutex<HashMap<u64, TradeCallback>>,
}

impl Registry {
    fn register(&self, symbol: Symbol, callback: impl Fn(PublicTrade) + Send + Sync + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().insert(id, Arc::new(callback));
        self.by_symbol.lock().entry(symbol).or_default().insert(id);
        id
    }

    fn remove(&self, symbol: Symbol, id: u64) {
        self.callbacks.lock().remove(&id);
        if let Some(ids) = self.by_symbol.lock().get_mut(&symbol) {
            ids.remove(&id);
        }
    }

    /// Dispatch one trade to every callback registered for its symbol. Iteration
    /// snapshots the current set under the lock, then invokes callbacks lock-free
    /// so a slow or panicking subscriber can't block registration or its peers.
    fn dispatch(&self, trade: PublicTrade) {
        let ids: Vec<u64> = match self.by_symbol.lock().get(&trade.symbol) {
            Some(ids) => ids.iter().copied().collect(),
            None => return,
        };
        if ids.is_empty() {
            return;
        }

        let callbacks = self.callbacks.lock();
        let snapshot: Vec<_> = ids.iter().filter_map(|id| callbacks.get(id).cloned()).collect();
        drop(callbacks);

        for callback in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(trade)));
            if result.is_err() {
                warn!(symbol = %trade.symbol, "trade subscriber callback panicked, ignoring");
            }
        }
    }
}

/// A scoped trade subscription. Dropping or explicitly releasing removes the callback.
pub struct TradeCallbackHandle {
    registry: Arc<Registry>,
    symbol: Symbol,
    id: u64,
}

impl TradeCallbackHandle {
    pub fn release(self) {
        self.registry.remove(self.symbol, self.id);
    }
}

impl Drop for TradeCallbackHandle {
    fn drop(&mut self) {
        self.registry.remove(self.symbol, self.id);
    }
}

/// Subscribes once to the trades transport and dispatches each trade to every callback
/// registered for its symbol, grounded on the same id-keyed registry idiom as
/// [`OrderBookL2`](crate::book::OrderBookL2)'s notification tables.
pub struct TradesStore {
    transport: TradeTransport,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TradesStore {
    pub fn new(transport: TradeTransport) -> Self {
        Self {
            transport,
            registry: Arc::new(Registry::default()),
            cancel: CancellationToken::new(),
            pump_handle: Mutex::new(None),
        }
    }

    /// Open the trades subscription and spawn the dispatch task.
    pub fn start(&self) {
        let mut subscription = self.transport.subscribe();
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let trade = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    trade = subscription.recv() => trade,
                };
                match trade {
                    Some(trade) => registry.dispatch(trade),
                    None => break,
                }
            }
        });
        *self.pump_handle.lock() = Some(handle);
    }

    /// Register a callback invoked for every trade on `symbol`. Returns a scoped handle;
    /// release (or drop) removes the callback.
    pub fn subscribe(
        &self,
        symbol: Symbol,
        callback: impl Fn(PublicTrade) + Send + Sync + 'static,
    ) -> TradeCallbackHandle {
        TradeCallbackHandle {
            id: self.registry.register(symbol, callback),
            registry: self.registry.clone(),
            symbol,
        }
    }

    pub async fn release(&self) {
        self.cancel.cancel();
        let handle = self.pump_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TradeAttr;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use venue_instrument::Side;

    fn trade(symbol: Symbol) -> PublicTrade {
        PublicTrade::new(symbol, 1, 0, 100.0, 1.0, TradeAttr::new(Side::Buy, false, false))
    }

    #[tokio::test]
    async fn dispatches_only_to_callbacks_registered_for_the_trades_symbol() {
        let transport = TradeTransport::new(8);
        let store = TradesStore::new(transport.clone());
        store.start();

        let btc = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let eth = Symbol::parse("ETH-USDT@BinanceSpot").unwrap();

        let btc_hits = Arc::new(AtomicUsize::new(0));
        let eth_hits = Arc::new(AtomicUsize::new(0));

        let btc_hits_cb = btc_hits.clone();
        let _btc_handle = store.subscribe(btc, move |_| {
            btc_hits_cb.fetch_add(1, Ordering::SeqCst);
        });
        let eth_hits_cb = eth_hits.clone();
        let _eth_handle = store.subscribe(eth, move |_| {
            eth_hits_cb.fetch_add(1, Ordering::SeqCst);
        });

        transport.try_publish(trade(btc));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(btc_hits.load(Ordering::SeqCst), 1);
        assert_eq!(eth_hits.load(Ordering::SeqCst), 0);

        store.release().await;
    }

    #[tokio::test]
    async fn released_handle_stops_receiving_dispatches() {
        let transport = TradeTransport::new(8);
        let store = TradesStore::new(transport.clone());
        store.start();

        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = hits.clone();
        let handle = store.subscribe(symbol, move |_| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        });
        handle.release();

        transport.try_publish(trade(symbol));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        store.release().await;
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_prevent_others_from_being_notified() {
        let transport = TradeTransport::new(8);
        let store = TradesStore::new(transport.clone());
        store.start();

        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = hits.clone();

        let _panicking = store.subscribe(symbol, |_| panic!("boom"));
        let _well_behaved = store.subscribe(symbol, move |_| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        });

        transport.try_publish(trade(symbol));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        store.release().await;
    }
}
