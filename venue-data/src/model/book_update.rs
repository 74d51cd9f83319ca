use crate::model::delta::L2Delta;
use crate::pool::Pool;
use std::sync::Arc;
use tracing::warn;
use venue_instrument::Symbol;

/// Header fields of an L2 update batch, snapshot or incremental. `first_id`/`last_id`/
/// `prev_last_id` of `0` mean "not supplied" (eg/ a REST snapshot has no `prev_last_id`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BatchHeader {
    pub symbol: Symbol,
    pub event_time_ms: i64,
    pub is_snapshot: bool,
    pub first_id: u64,
    pub last_id: u64,
    pub prev_last_id: u64,
}

/// Immutable, borrowed view over a batch's header and deltas, handed to
/// [`OrderBookL2::apply`](crate::book::OrderBookL2::apply) so the book does not need to
/// take ownership of (or release) the pooled batch itself.
#[derive(Debug, Copy, Clone)]
pub struct L2Update<'a> {
    pub header: BatchHeader,
    pub deltas: &'a [L2Delta],
}

/// The pooled mutable batch: a non-`Copy`, singly-owned handle
/// over a `Vec<L2Delta>` rented from a shared [`Pool`]. `release` consumes `self` by
/// value, so a released batch cannot be reused — the Rust-idiomatic way to express "this
/// value becomes unusable after the call" without a runtime liveness flag.
///
/// Implementers must never clone the backing storage; `venue_data` never derives `Clone`
/// or `Copy` on this type.
#[derive(Debug)]
pub struct L2UpdatePooled {
    header: Option<BatchHeader>,
    deltas: Vec<L2Delta>,
    pool: Arc<Pool<L2Delta>>,
    released: bool,
}

impl L2UpdatePooled {
    pub fn new(pool: Arc<Pool<L2Delta>>, initial_capacity: usize) -> Self {
        let deltas = pool.rent(initial_capacity);
        Self {
            header: None,
            deltas,
            pool,
            released: false,
        }
    }

    pub fn set_header(&mut self, header: BatchHeader) {
        self.header = Some(header);
    }

    /// Panics if called before `set_header` — a missing header is a programmer error,
    /// not a runtime condition a caller can recover from (a "programmer error"
    /// taxonomy kind).
    pub fn header(&self) -> BatchHeader {
        self.header
            .expect("L2UpdatePooled::header() called before set_header")
    }

    /// Append a delta. Growth beyond the rented buffer's capacity is the ordinary
    /// amortised-geometric growth of `Vec::push`.
    pub fn add_delta(&mut self, delta: L2Delta) {
        self.deltas.push(delta);
    }

    pub fn deltas(&self) -> &[L2Delta] {
        &self.deltas
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Reset length to zero; retains the rented capacity for reuse.
    pub fn clear(&mut self) {
        self.deltas.clear();
        self.header = None;
    }

    pub fn as_view(&self) -> L2Update<'_> {
        L2Update {
            header: self.header(),
            deltas: &self.deltas,
        }
    }

    /// Return the rented storage to the pool. The batch is unusable afterwards; Rust's
    /// move semantics enforce this at compile time since `self` is consumed by value.
    pub fn release(mut self) {
        self.released = true;
        let deltas = std::mem::take(&mut self.deltas);
        self.pool.release(deltas);
    }
}

impl Drop for L2UpdatePooled {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                symbol = ?self.header.map(|h| h.symbol),
                "L2UpdatePooled dropped without release, pooled buffer leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venue_instrument::Side;

    fn header(symbol: Symbol) -> BatchHeader {
        BatchHeader {
            symbol,
            event_time_ms: 0,
            is_snapshot: false,
            first_id: 1,
            last_id: 2,
            prev_last_id: 0,
        }
    }

    #[test]
    fn clear_retains_capacity() {
        let pool = Pool::new();
        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let mut batch = L2UpdatePooled::new(pool, 8);
        batch.set_header(header(symbol));
        batch.add_delta(L2Delta::new(Side::Buy, 100.0, 1.0));
        assert_eq!(batch.len(), 1);

        let capacity_before = batch.deltas.capacity();
        batch.clear();
        assert_eq!(batch.len(), 0);
        assert_eq!(batch.deltas.capacity(), capacity_before);
        batch.release();
    }

    #[test]
    fn release_returns_storage_to_pool() {
        let pool = Pool::new();
        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let mut batch = L2UpdatePooled::new(pool.clone(), 4);
        batch.set_header(header(symbol));
        assert_eq!(pool.spare_len(), 0);
        batch.release();
        assert_eq!(pool.spare_len(), 1);
    }
}
