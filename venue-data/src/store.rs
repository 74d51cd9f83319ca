//! `OrderBookStore`: the per-symbol snapshot+delta stitcher, the largest and most
//! state-heavy component in this crate.

use crate::book::OrderBookL2;
use crate::config::Config;
use crate::error::DataError;
use crate::model::L2UpdatePooled;
use crate::transport::{DepthSubscription, DepthTransport};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use venue_instrument::Symbol;

/// REST snapshot collaborator injected into the store, grounded on
/// `BinanceSpotOrderBooksL2SnapshotFetcher`. Returns a pooled batch with
/// `header.is_snapshot == true`.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch_snapshot(&self, symbol: Symbol, limit: u32) -> Result<L2UpdatePooled, DataError>;
}

/// Drives the WS ingestion side to ensure a depth stream exists for `symbol`. Kept as a
/// narrow seam so the store doesn't need to know about connection sharding or envelope
/// framing, only that "the stream exists" is achievable and fallible.
#[async_trait]
pub trait StreamSubscriber: Send + Sync {
    async fn ensure_depth_stream(
        &self,
        symbol: Symbol,
        cancel: &CancellationToken,
    ) -> Result<(), DataError>;
}

/// `(buffered_count, last_event_time_ms, ingest_lag_ms)` reported after every applied batch.
#[derive(Debug, Clone, Copy)]
pub struct LagEvent {
    pub buffer_depth: usize,
    pub event_time_ms: i64,
    pub lag_ms: i64,
}

type LagMonitor = Arc<dyn Fn(LagEvent) + Send + Sync>;

/// A per-symbol completion primitive resolved on first stream update, idempotent on
/// resolve. `Notify` already coalesces repeated `notify_one`
/// calls into a single stored permit; the `fired` flag makes that idempotence explicit
/// and lets `wait` short-circuit without a syscall once the latch has already tripped.
#[derive(Default)]
struct OneShotLatch {
    notify: Notify,
    fired: AtomicBool,
}

impl OneShotLatch {
    fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    async fn wait(&self) {
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        self.notify.notified().await;
    }
}

struct SymbolState {
    symbol: Symbol,
    book: OrderBookL2,
    buffer: VecDeque<L2UpdatePooled>,
    snapshot_ready: bool,
    first_cached_applied: bool,
    max_buffer: usize,
    latch: Arc<OneShotLatch>,
}

impl SymbolState {
    fn new(symbol: Symbol, max_buffer: usize) -> Self {
        Self {
            symbol,
            book: OrderBookL2::new(symbol),
            buffer: VecDeque::new(),
            snapshot_ready: false,
            first_cached_applied: false,
            max_buffer,
            latch: Arc::new(OneShotLatch::default()),
        }
    }

    fn drain_and_release(&mut self) {
        while let Some(batch) = self.buffer.pop_front() {
            batch.release();
        }
    }
}

/// Assembles a correct book per symbol from a live incremental stream and a REST
/// snapshot, stitching across the unavoidable race between stream-start and snapshot
/// arrival.
///
/// Per-symbol state is grounded on `books::map::OrderBookMapMulti`'s "shared map of
/// locked per-symbol state" shape, generalised with the buffer and readiness flags the
/// stitching protocol requires.
pub struct OrderBookStore {
    transport: DepthTransport,
    fetcher: Arc<dyn SnapshotFetcher>,
    subscriber: Arc<dyn StreamSubscriber>,
    config: Config,
    states: Arc<RwLock<HashMap<Symbol, Arc<RwLock<SymbolState>>>>>,
    cancel: CancellationToken,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
    lag_monitor: Option<LagMonitor>,
}

impl OrderBookStore {
    pub fn new(
        transport: DepthTransport,
        fetcher: Arc<dyn SnapshotFetcher>,
        subscriber: Arc<dyn StreamSubscriber>,
        config: Config,
    ) -> Self {
        Self {
            transport,
            fetcher,
            subscriber,
            config,
            states: Arc::new(RwLock::new(HashMap::new())),
            cancel: CancellationToken::new(),
            pump_handle: Mutex::new(None),
            lag_monitor: None,
        }
    }

    pub fn with_lag_monitor(mut self, monitor: impl Fn(LagEvent) + Send + Sync + 'static) -> Self {
        self.lag_monitor = Some(Arc::new(monitor));
        self
    }

    /// Open the single depth subscription and spawn the pump task.
    pub fn start(&self) -> Result<(), DataError> {
        let subscription = self.transport.subscribe(self.config.max_buffer_per_symbol)?;
        let states = self.states.clone();
        let cancel = self.cancel.clone();
        let lag_monitor = self.lag_monitor.clone();
        let max_buffer_per_symbol = self.config.max_buffer_per_symbol;
        let handle = tokio::spawn(pump_loop(
            subscription,
            states,
            cancel,
            lag_monitor,
            max_buffer_per_symbol,
        ));
        *self.pump_handle.lock() = Some(handle);
        Ok(())
    }

    /// Idempotently materialize a per-symbol book state and drive it to snapshot-ready.
    /// Cancelling at any awaited step drains and releases the symbol's buffered batches
    /// and resets it so a later retry starts clean.
    pub async fn get_or_create(
        &self,
        symbol: Symbol,
        cancel: &CancellationToken,
    ) -> Result<(), DataError> {
        let state_arc = self.get_or_insert_state(symbol);

        if state_arc.read().snapshot_ready {
            return Ok(());
        }

        let latch = state_arc.read().latch.clone();

        if let Err(error) = retry_with_backoff(&self.config, cancel, || {
            self.subscriber.ensure_depth_stream(symbol, cancel)
        })
        .await
        {
            self.reset_symbol_state(symbol);
            return Err(error);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.reset_symbol_state(symbol);
                return Err(DataError::CancelledByCaller);
            }
            _ = latch.wait() => {}
        }

        let snapshot = match retry_with_backoff(&self.config, cancel, || {
            self.fetcher.fetch_snapshot(symbol, self.config.snapshot_limit)
        })
        .await
        {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.reset_symbol_state(symbol);
                return Err(error);
            }
        };

        {
            let mut state = state_arc.write();
            state.book.apply(snapshot.as_view(), false);
            drain_buffer_on_ready(&mut state);
        }
        snapshot.release();

        info!(symbol = %symbol, "book is snapshot-ready");
        Ok(())
    }

    /// Read-only access to the book for `symbol`, if it exists. May be called from any
    /// thread.
    pub fn try_get<R>(&self, symbol: Symbol, read: impl FnOnce(&OrderBookL2) -> R) -> Option<R> {
        let state_arc = self.states.read().get(&symbol)?.clone();
        let state = state_arc.read();
        Some(read(&state.book))
    }

    /// Cancel the pump, await its completion (which drops and drains the depth
    /// subscription), then explicitly release every pooled batch still buffered.
    pub async fn release(&self) {
        self.cancel.cancel();
        let handle = self.pump_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let states = self.states.read();
        for state_arc in states.values() {
            state_arc.write().drain_and_release();
        }
    }

    fn get_or_insert_state(&self, symbol: Symbol) -> Arc<RwLock<SymbolState>> {
        if let Some(state) = self.states.read().get(&symbol) {
            return state.clone();
        }
        let max_buffer = self.config.max_buffer_per_symbol;
        self.states
            .write()
            .entry(symbol)
            .or_insert_with(|| Arc::new(RwLock::new(SymbolState::new(symbol, max_buffer))))
            .clone()
    }

    fn reset_symbol_state(&self, symbol: Symbol) {
        let Some(state_arc) = self.states.read().get(&symbol).cloned() else {
            return;
        };
        let max_buffer = self.config.max_buffer_per_symbol;
        let mut state = state_arc.write();
        state.drain_and_release();
        *state = SymbolState::new(symbol, max_buffer);
    }
}

/// Drain the pre-snapshot buffer in order, stitching each buffered batch against the
/// snapshot's last id.
fn drain_buffer_on_ready(state: &mut SymbolState) {
    while let Some(batch) = state.buffer.pop_front() {
        let header = batch.header();
        let last_update_id = state.book.last_update_id();

        if state.first_cached_applied && last_update_id == header.prev_last_id {
            state.book.apply(batch.as_view(), false);
        } else if header.last_id < last_update_id {
            debug!(symbol = %header.symbol, "discarding stale buffered batch during stitch");
        } else if header.first_id <= last_update_id + 1 && last_update_id < header.last_id {
            state.book.apply(batch.as_view(), true);
            state.first_cached_applied = true;
        } else {
            debug!(symbol = %header.symbol, "buffered batch does not overlap snapshot, discarding");
        }

        batch.release();
    }
    state.snapshot_ready = true;
}

async fn pump_loop(
    mut subscription: DepthSubscription,
    states: Arc<RwLock<HashMap<Symbol, Arc<RwLock<SymbolState>>>>>,
    cancel: CancellationToken,
    lag_monitor: Option<LagMonitor>,
    max_buffer_per_symbol: usize,
) {
    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = subscription.recv() => batch,
        };

        let Some(batch) = batch else {
            break;
        };

        handle_batch(&states, batch, lag_monitor.as_ref(), max_buffer_per_symbol);
    }
    // `subscription` drops here: drains any remaining batch and frees the transport slot.
}

fn handle_batch(
    states: &RwLock<HashMap<Symbol, Arc<RwLock<SymbolState>>>>,
    batch: L2UpdatePooled,
    lag_monitor: Option<&LagMonitor>,
    max_buffer_per_symbol: usize,
) {
    let header = batch.header();
    let max_buffer = states
        .read()
        .get(&header.symbol)
        .map(|state| state.read().max_buffer)
        .unwrap_or(max_buffer_per_symbol);

    let state_arc = {
        let mut map = states.write();
        map.entry(header.symbol)
            .or_insert_with(|| Arc::new(RwLock::new(SymbolState::new(header.symbol, max_buffer))))
            .clone()
    };

    let mut state = state_arc.write();
    if !state.snapshot_ready {
        if state.buffer.len() >= state.max_buffer {
            if let Some(oldest) = state.buffer.pop_front() {
                let error = DataError::BufferOverflow {
                    context: "pre-snapshot buffer",
                };
                warn!(symbol = %header.symbol, %error, "dropping oldest buffered batch");
                oldest.release();
            }
        }
        state.buffer.push_back(batch);
        state.latch.fire();
        return;
    }

    let last_update_id = state.book.last_update_id();
    let force = !state.first_cached_applied
        && header.first_id <= last_update_id + 1
        && last_update_id < header.last_id;
    if force {
        state.first_cached_applied = true;
    }

    if !state.book.apply(batch.as_view(), force) {
        let error = DataError::SequenceGap {
            symbol: header.symbol,
            expected: Some(state.book.last_update_id()),
            actual: Some(header.prev_last_id),
        };
        warn!(symbol = %header.symbol, %error, "rejected incremental batch: continuity violation");
    } else if let Some(monitor) = lag_monitor {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let lag_ms = (now_ms - header.event_time_ms).max(0);
        monitor(LagEvent {
            buffer_depth: state.buffer.len(),
            event_time_ms: header.event_time_ms,
            lag_ms,
        });
    }

    batch.release();
}

async fn retry_with_backoff<T, Fut>(
    config: &Config,
    cancel: &CancellationToken,
    mut op: impl FnMut() -> Fut,
) -> Result<T, DataError>
where
    Fut: Future<Output = Result<T, DataError>>,
{
    let mut delay = config.initial_backoff;
    let mut attempt = 0u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DataError::CancelledByCaller),
            result = op() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= config.max_retry_attempts {
                    warn!(attempts = attempt, error = %error, "retry budget exhausted");
                    return Err(error);
                }
                let jitter = Duration::from_millis(rand::rng().random_range(0..100));
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "transient failure, retrying");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DataError::CancelledByCaller),
                    _ = tokio::time::sleep(delay + jitter) => {}
                }
                delay = std::cmp::min(delay * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchHeader, L2Delta};
    use crate::pool::Pool;
    use std::sync::atomic::{AtomicU32, AtomicUsize};
    use venue_instrument::Side;

    fn symbol() -> Symbol {
        Symbol::parse("BTC-USDT@BinanceSpot").unwrap()
    }

    struct ImmediateSubscriber;

    #[async_trait]
    impl StreamSubscriber for ImmediateSubscriber {
        async fn ensure_depth_stream(
            &self,
            _symbol: Symbol,
            _cancel: &CancellationToken,
        ) -> Result<(), DataError> {
            Ok(())
        }
    }

    struct FixedSnapshotFetcher {
        last_update_id: u64,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SnapshotFetcher for FixedSnapshotFetcher {
        async fn fetch_snapshot(
            &self,
            symbol: Symbol,
            _limit: u32,
        ) -> Result<L2UpdatePooled, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let pool = Pool::new();
            let mut batch = L2UpdatePooled::new(pool, 1);
            batch.set_header(BatchHeader {
                symbol,
                event_time_ms: 0,
                is_snapshot: true,
                first_id: 0,
                last_id: self.last_update_id,
                prev_last_id: 0,
            });
            batch.add_delta(L2Delta::new(Side::Buy, 100.0, 1.0));
            Ok(batch)
        }
    }

    struct FailingThenFetcher {
        fail_times: AtomicU32,
        inner: FixedSnapshotFetcher,
    }

    #[async_trait]
    impl SnapshotFetcher for FailingThenFetcher {
        async fn fetch_snapshot(
            &self,
            symbol: Symbol,
            limit: u32,
        ) -> Result<L2UpdatePooled, DataError> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(DataError::ProtocolInvalid("simulated transient failure".into()));
            }
            self.inner.fetch_snapshot(symbol, limit).await
        }
    }

    fn test_config() -> Config {
        Config {
            max_buffer_per_symbol: 8,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            max_retry_attempts: 5,
            ..Config::default()
        }
    }

    fn depth_batch(first_id: u64, last_id: u64, prev_last_id: u64) -> L2UpdatePooled {
        let pool = Pool::new();
        let mut batch = L2UpdatePooled::new(pool, 1);
        batch.set_header(BatchHeader {
            symbol: symbol(),
            event_time_ms: 0,
            is_snapshot: false,
            first_id,
            last_id,
            prev_last_id,
        });
        batch.add_delta(L2Delta::new(Side::Sell, 50.0, 1.0));
        batch
    }

    #[tokio::test]
    async fn scenario_c_stitch_race_drops_stale_force_applies_overlap() {
        let transport = DepthTransport::new();
        let fetcher = Arc::new(FixedSnapshotFetcher {
            last_update_id: 11,
            calls: AtomicU32::new(0),
        });
        let subscriber = Arc::new(ImmediateSubscriber);
        let store = OrderBookStore::new(transport.clone(), fetcher, subscriber, test_config());
        store.start().unwrap();

        transport.try_publish(depth_batch(10, 10, 9)).unwrap();
        transport.try_publish(depth_batch(11, 11, 10)).unwrap();
        transport.try_publish(depth_batch(12, 12, 11)).unwrap();

        // Give the pump a chance to buffer all three before snapshot-ready runs.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancel = CancellationToken::new();
        store.get_or_create(symbol(), &cancel).await.unwrap();

        let last_update_id = store.try_get(symbol(), |book| book.last_update_id()).unwrap();
        assert_eq!(last_update_id, 12);

        store.release().await;
    }

    #[tokio::test]
    async fn retries_snapshot_fetch_then_succeeds() {
        let transport = DepthTransport::new();
        let fetcher = Arc::new(FailingThenFetcher {
            fail_times: AtomicU32::new(2),
            inner: FixedSnapshotFetcher {
                last_update_id: 1,
                calls: AtomicU32::new(0),
            },
        });
        let subscriber = Arc::new(ImmediateSubscriber);
        let store = OrderBookStore::new(transport.clone(), fetcher, subscriber, test_config());
        store.start().unwrap();

        transport.try_publish(depth_batch(1, 1, 0)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let cancel = CancellationToken::new();
        store.get_or_create(symbol(), &cancel).await.unwrap();
        assert!(store.try_get(symbol(), |book| book.last_update_id()).is_some());

        store.release().await;
    }

    #[tokio::test]
    async fn scenario_e_cancellation_releases_buffered_batches_without_leaks() {
        let transport = DepthTransport::new();

        struct HangingFetcher;
        #[async_trait]
        impl SnapshotFetcher for HangingFetcher {
            async fn fetch_snapshot(
                &self,
                _symbol: Symbol,
                _limit: u32,
            ) -> Result<L2UpdatePooled, DataError> {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }

        let fetcher = Arc::new(HangingFetcher);
        let subscriber = Arc::new(ImmediateSubscriber);
        let store = OrderBookStore::new(transport.clone(), fetcher, subscriber, test_config());
        store.start().unwrap();

        transport.try_publish(depth_batch(1, 1, 0)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = store.get_or_create(symbol(), &cancel).await;
        assert!(matches!(result, Err(DataError::CancelledByCaller)));

        store.release().await;
    }

    #[test]
    fn one_shot_latch_is_idempotent_and_fires_before_wait() {
        let latch = OneShotLatch::default();
        latch.fire();
        latch.fire();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            tokio::time::timeout(Duration::from_millis(50), latch.wait())
                .await
                .expect("latch should already be resolved");
        });
    }
}
