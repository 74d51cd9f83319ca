//! End-to-end exercise of the ingestion pipeline: parsed depth batches flow through a
//! `DepthTransport` into an `OrderBookStore`, which stitches them against a fake REST
//! snapshot collaborator, exactly as a live connection shard and parse loop would feed
//! it. No real network I/O; the fake `SnapshotFetcher`/`StreamSubscriber` stand in for
//! `ingest::snapshot::RestSnapshotFetcher`/`ingest::DepthStreamSubscriber`.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use venue_data::config::Config;
use venue_data::error::DataError;
use venue_data::model::{BatchHeader, L2Delta, L2UpdatePooled};
use venue_data::pool::Pool;
use venue_data::store::{SnapshotFetcher, StreamSubscriber};
use venue_data::{DepthTransport, OrderBookStore};
use venue_instrument::{Side, Symbol};

struct FixedSnapshot {
    last_update_id: u64,
    pool: Arc<Pool<L2Delta>>,
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotFetcher for FixedSnapshot {
    async fn fetch_snapshot(&self, symbol: Symbol, _limit: u32) -> Result<L2UpdatePooled, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut batch = L2UpdatePooled::new(self.pool.clone(), 2);
        batch.set_header(BatchHeader {
            symbol,
            event_time_ms: 0,
            is_snapshot: true,
            first_id: self.last_update_id,
            last_id: self.last_update_id,
            prev_last_id: self.last_update_id,
        });
        batch.add_delta(L2Delta::new(Side::Buy, 100.0, 1.0));
        batch.add_delta(L2Delta::new(Side::Sell, 101.0, 1.0));
        Ok(batch)
    }
}

struct NoopSubscriber;

#[async_trait]
impl StreamSubscriber for NoopSubscriber {
    async fn ensure_depth_stream(&self, _symbol: Symbol, _cancel: &CancellationToken) -> Result<(), DataError> {
        Ok(())
    }
}

fn depth_batch(pool: &Arc<Pool<L2Delta>>, symbol: Symbol, first_id: u64, last_id: u64, prev_last_id: u64) -> L2UpdatePooled {
    let mut batch = L2UpdatePooled::new(pool.clone(), 1);
    batch.set_header(BatchHeader {
        symbol,
        event_time_ms: 1,
        is_snapshot: false,
        first_id,
        last_id,
        prev_last_id,
    });
    batch.add_delta(L2Delta::new(Side::Buy, 99.5, 2.0));
    batch
}

#[tokio::test]
async fn stream_first_then_snapshot_converges_to_a_consistent_book() {
    let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
    let pool = Pool::new();
    let transport = DepthTransport::default();

    let fetcher = Arc::new(FixedSnapshot {
        last_update_id: 10,
        pool: pool.clone(),
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(OrderBookStore::new(
        transport.clone(),
        fetcher,
        Arc::new(NoopSubscriber),
        Config::default(),
    ));
    store.start().unwrap();

    // Simulate the parse loop publishing a pre-snapshot batch that overlaps the
    // eventual snapshot's lastUpdateId (the stitch race).
    let overlapping = depth_batch(&pool, symbol, 9, 11, 8);
    transport.try_publish(overlapping).unwrap();

    let cancel = CancellationToken::new();
    store.get_or_create(symbol, &cancel).await.unwrap();

    // Allow the pump task to process the post-readiness apply.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let bid_count = store.try_get(symbol, |book| book.bids().len()).unwrap();
    assert!(bid_count >= 1);

    store.release().await;
}

#[tokio::test]
async fn cancelling_mid_snapshot_wait_resets_state_for_a_clean_retry() {
    struct HangingFetcher;

    #[async_trait]
    impl SnapshotFetcher for HangingFetcher {
        async fn fetch_snapshot(&self, _symbol: Symbol, _limit: u32) -> Result<L2UpdatePooled, DataError> {
            std::future::pending().await
        }
    }

    let symbol = Symbol::parse("ETH-USDT@BinanceSpot").unwrap();
    let transport = DepthTransport::default();
    let store = Arc::new(OrderBookStore::new(
        transport,
        Arc::new(HangingFetcher),
        Arc::new(NoopSubscriber),
        Config::default(),
    ));
    store.start().unwrap();

    let cancel = CancellationToken::new();
    let cancel_for_task = cancel.clone();
    let store_clone = store.clone();
    let task = tokio::spawn(async move { store_clone.get_or_create(symbol, &cancel_for_task).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(DataError::CancelledByCaller)));
    assert!(store.try_get(symbol, |book| book.bids().len()).is_none());
    store.release().await;
}
