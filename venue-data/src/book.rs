use crate::model::{L2Delta, L2Update};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use venue_instrument::{Side, Symbol};

/// Epsilon used to compare prices/quantities when deciding whether the top-of-book has
/// changed.
const EPSILON: f64 = 5e-9;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// A single resting price level.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Level {
    pub price: f64,
    pub qty: f64,
}

fn top_changed(before: Option<Level>, after: Option<Level>) -> bool {
    match (before, after) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(a), Some(b)) => !approx_eq(a.price, b.price) || !approx_eq(a.qty, b.qty),
    }
}

/// An id-keyed table of callbacks, using the same `SubscriptionId`-keyed map idiom as
/// `venue-integration::subscription`: iteration snapshots the current set before
/// invoking user code so a slow or panicking callback can't hold the registration lock.
#[derive(Default)]
struct CallbackRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, Arc<dyn Fn() + Send + Sync>>>,
}

impl CallbackRegistry {
    fn register(&self, callback: impl Fn() + Send + Sync + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        self.callbacks.lock().insert(id, Arc::new(callback));
        id
    }

    fn remove(&self, id: u64) {
        self.callbacks.lock().remove(&id);
    }

    fn notify(&self) {
        let snapshot: Vec<_> = self.callbacks.lock().values().cloned().collect();
        for callback in snapshot {
            // A panicking subscriber must not be able to break the others.
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback()));
        }
    }
}

/// A scoped subscription to one of [`OrderBookL2`]'s notification registries. Dropping
/// or explicitly [`release`](SubscriptionHandle::release)-ing removes the callback.
pub struct SubscriptionHandle {
    registry: Arc<CallbackRegistry>,
    id: u64,
}

impl SubscriptionHandle {
    pub fn release(self) {
        self.registry.remove(self.id);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// In-memory L2 order book for one symbol: two sorted sides, a monotonic
/// `last_update_id`, per-side cancellation counters, and "book updated"/"top updated"
/// notification registries.
///
/// Bids and asks are kept as flat `Vec<Level>` sorted by price (descending / ascending
/// respectively) with binary-search upserts, grounded directly on
/// an `OrderBookSide::upsert_single` style binary-search upsert — kept almost
/// verbatim, generalised from `Decimal` to the pooled-delta input type and extended with
/// the snapshot/incremental/force-apply/reject semantics this book requires.
pub struct OrderBookL2 {
    symbol: Symbol,
    bids: Vec<Level>,
    asks: Vec<Level>,
    last_update_id: u64,
    bid_cancellations: u64,
    ask_cancellations: u64,
    book_updated: Arc<CallbackRegistry>,
    top_updated: Arc<CallbackRegistry>,
}

impl OrderBookL2 {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: Vec::new(),
            asks: Vec::new(),
            last_update_id: 0,
            bid_cancellations: 0,
            ask_cancellations: 0,
            book_updated: Arc::new(CallbackRegistry::default()),
            top_updated: Arc::new(CallbackRegistry::default()),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }

    pub fn bids(&self) -> &[Level] {
        &self.bids
    }

    pub fn asks(&self) -> &[Level] {
        &self.asks
    }

    pub fn bid_cancellations(&self) -> u64 {
        self.bid_cancellations
    }

    pub fn ask_cancellations(&self) -> u64 {
        self.ask_cancellations
    }

    /// Apply a batch.
    ///
    /// A snapshot batch always succeeds: it clears the book, applies every delta, then
    /// seats `last_update_id` at the batch's last id. An incremental batch is rejected
    /// (returns `false`, no mutation) when both `prev_last_id` and the current
    /// `last_update_id` are non-zero and they disagree — unless `force` is set, which
    /// bypasses the continuity check once to seat the first post-snapshot batch.
    pub fn apply(&mut self, update: L2Update<'_>, force: bool) -> bool {
        let header = update.header;

        if header.is_snapshot {
            self.bids.clear();
            self.asks.clear();
            self.bid_cancellations = 0;
            self.ask_cancellations = 0;
            for delta in update.deltas {
                self.upsert(*delta);
            }
            self.last_update_id = header.last_id;
            self.notify();
            return true;
        }

        if !force
            && header.prev_last_id != 0
            && self.last_update_id != 0
            && header.prev_last_id != self.last_update_id
        {
            return false;
        }

        let before_bid = self.best_bid();
        let before_ask = self.best_ask();

        for delta in update.deltas {
            self.upsert(*delta);
        }
        if header.last_id != 0 {
            self.last_update_id = header.last_id;
        }

        if top_changed(before_bid, self.best_bid()) || top_changed(before_ask, self.best_ask()) {
            self.top_updated.notify();
        }
        self.book_updated.notify();
        true
    }

    fn notify(&self) {
        self.top_updated.notify();
        self.book_updated.notify();
    }

    fn upsert(&mut self, delta: L2Delta) {
        let (levels, cancellations, ascending) = match delta.side {
            Side::Buy => (&mut self.bids, &mut self.bid_cancellations, false),
            Side::Sell => (&mut self.asks, &mut self.ask_cancellations, true),
        };
        upsert_level(levels, delta, ascending, cancellations);
    }

    pub fn subscribe_book_updated(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.book_updated.register(callback),
            registry: self.book_updated.clone(),
        }
    }

    pub fn subscribe_top_updated(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.top_updated.register(callback),
            registry: self.top_updated.clone(),
        }
    }
}

fn price_cmp(a: f64, b: f64) -> Ordering {
    // Prices are produced by the depth parser from validated wire data and are never
    // NaN; a NaN here would indicate an upstream parser defect.
    a.partial_cmp(&b).expect("level price was NaN")
}

fn upsert_level(levels: &mut Vec<Level>, delta: L2Delta, ascending: bool, cancellations: &mut u64) {
    let search = levels.binary_search_by(|existing| {
        let ord = price_cmp(existing.price, delta.price);
        if ascending { ord } else { ord.reverse() }
    });

    match search {
        Ok(index) => {
            if delta.is_removal() {
                levels.remove(index);
                *cancellations += 1;
            } else {
                levels[index].qty = delta.quantity;
            }
        }
        Err(index) => {
            if !delta.is_removal() {
                levels.insert(
                    index,
                    Level {
                        price: delta.price,
                        qty: delta.quantity,
                    },
                );
            }
            // Removing a level that doesn't exist is a no-op.
        }
    }
}
