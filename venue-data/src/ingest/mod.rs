//! WebSocket ingestion: connection lifecycle, frame reassembly, subscribe/unsubscribe
//! protocol, connection sharding, and the parse loop that turns raw frame bytes into
//! transport publishes.

pub mod connection;
pub mod envelope;
pub mod parse_loop;
pub mod snapshot;
pub mod urls;

use connection::{ConnectionState, ShardCommand, connect_shard, run};
use envelope::{depth_stream_name, trade_stream_name};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use urls::Market;
use venue_instrument::Symbol;
use venue_integration::rate_limit::RateLimiter;

/// A connection caps at this many streams before a new shard is opened.
pub const MAX_STREAMS_PER_SHARD: usize = 1024;
/// Depth of the shared raw-bytes inbox every shard's receive loop feeds.
pub const RAW_INBOX_CAPACITY: usize = 256;
/// Outbound SUBSCRIBE/UNSUBSCRIBE envelopes per second, per shard.
pub const ENVELOPE_RATE_PER_SEC: usize = 10;

/// Decide which shard a brand-new stream belongs on: the index of the first shard with
/// room, or `shard_sizes.len()` (one past the end) to signal a new shard must be opened.
fn route_new_stream(shard_sizes: &[usize]) -> usize {
    shard_sizes
        .iter()
        .position(|&len| len < MAX_STREAMS_PER_SHARD)
        .unwrap_or(shard_sizes.len())
}

struct Shard {
    streams: HashSet<String>,
    command_tx: mpsc::UnboundedSender<ShardCommand>,
    task: JoinHandle<ConnectionState>,
}

/// Manages one venue market's (spot, USD-M, or COIN-M) WebSocket connections: opens and
/// shards them on the 1024-streams-per-connection cap, forwards subscribe/unsubscribe
/// requests, and feeds every received frame into a single shared raw-bytes inbox that
/// [`parse_loop::run`] drains.
///
/// Follows a connect-then-send flow
/// (`subscriber/mod.rs`), generalised from "one connection, subscribe once at startup"
/// to "many connections, subscribe dynamically, shard on the streams cap".
pub struct WsIngestion {
    market: Market,
    raw_tx: mpsc::Sender<Vec<u8>>,
    shards: Mutex<Vec<Shard>>,
    rate_limiter: RateLimiter,
    cancel: CancellationToken,
}

impl WsIngestion {
    /// Construct ingestion for one Binance market. Returns the ingestion handle and the
    /// receiving half of the shared raw-bytes inbox, which the caller hands to
    /// [`parse_loop::run`].
    pub fn new(market: Market) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (raw_tx, raw_rx) = mpsc::channel(RAW_INBOX_CAPACITY);
        (
            Self {
                market,
                raw_tx,
                shards: Mutex::new(Vec::new()),
                rate_limiter: RateLimiter::new(ENVELOPE_RATE_PER_SEC, Duration::from_secs(1)),
                cancel: CancellationToken::new(),
            },
            raw_rx,
        )
    }

    /// Ensure a depth stream subscription exists for `symbol`, creating a new shard
    /// connection if every existing shard is at capacity.
    pub async fn ensure_depth_stream(&self, symbol: Symbol) -> Result<(), crate::error::DataError> {
        self.ensure_stream(depth_stream_name(symbol)).await
    }

    /// Ensure a trade stream subscription exists for `symbol`.
    pub async fn ensure_trade_stream(&self, symbol: Symbol) -> Result<(), crate::error::DataError> {
        self.ensure_stream(trade_stream_name(symbol)).await
    }

    async fn ensure_stream(&self, stream: String) -> Result<(), crate::error::DataError> {
        if let Some(index) = self.shard_serving(&stream) {
            let _ = index;
            return Ok(());
        }

        if let Some(command_tx) = self.shard_with_room(&stream) {
            let _ = command_tx.send(ShardCommand::Subscribe(stream));
            return Ok(());
        }

        self.open_shard(stream).await
    }

    /// `RemoveSubscriptionsAsync` is implemented as an
    /// explicit UNSUBSCRIBE envelope with request-id tracking rather than a reconnect,
    /// since reconnecting would drop every other stream sharing the connection too.
    pub fn release_stream(&self, stream: String) {
        let mut shards = self.shards.lock();
        for shard in shards.iter_mut() {
            if shard.streams.remove(&stream) {
                let _ = shard.command_tx.send(ShardCommand::Unsubscribe(stream));
                return;
            }
        }
    }

    fn shard_serving(&self, stream: &str) -> Option<usize> {
        self.shards
            .lock()
            .iter()
            .position(|shard| shard.streams.contains(stream))
    }

    fn shard_with_room(&self, stream: &str) -> Option<mpsc::UnboundedSender<ShardCommand>> {
        let mut shards = self.shards.lock();
        let sizes: Vec<usize> = shards.iter().map(|shard| shard.streams.len()).collect();
        let shard = shards.get_mut(route_new_stream(&sizes))?;
        shard.streams.insert(stream.to_string());
        Some(shard.command_tx.clone())
    }

    async fn open_shard(&self, stream: String) -> Result<(), crate::error::DataError> {
        let socket = connect_shard(self.market.websocket_base_url()).await?;
        info!(market = ?self.market, stream, "opened new websocket shard");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let _ = command_tx.send(ShardCommand::Subscribe(stream.clone()));

        let raw_tx = self.raw_tx.clone();
        let rate_limiter = self.rate_limiter.clone();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(run(socket, raw_tx, command_rx, rate_limiter, cancel));

        let mut streams = HashSet::new();
        streams.insert(stream);
        self.shards.lock().push(Shard {
            streams,
            command_tx,
            task,
        });
        Ok(())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.lock().len()
    }

    /// Cancel every open connection and await their completion.
    pub async fn release(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .shards
            .lock()
            .drain(..)
            .map(|shard| shard.task)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

/// Adapts [`WsIngestion`] to the narrow [`crate::store::StreamSubscriber`] seam the
/// `OrderBookStore` depends on, keeping the store ignorant of shard/envelope concerns.
pub struct DepthStreamSubscriber(pub Arc<WsIngestion>);

#[async_trait::async_trait]
impl crate::store::StreamSubscriber for DepthStreamSubscriber {
    async fn ensure_depth_stream(
        &self,
        symbol: Symbol,
        _cancel: &CancellationToken,
    ) -> Result<(), crate::error::DataError> {
        self.0.ensure_depth_stream(symbol).await
    }
}
