//! Wires the full pipeline together against live Binance spot streams: a `WsIngestion`
//! shard table feeds the parse loop, which publishes onto `DepthTransport`/
//! `TradeTransport`; `OrderBookStore` and `TradesStore` consume those and print
//! top-of-book/trade prints to stdout.
//!
//! Run with `cargo run --example order_book_ingest -p venue-data`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use venue_data::config::Config;
use venue_data::ingest::urls::Market;
use venue_data::ingest::{DepthStreamSubscriber, WsIngestion, parse_loop, snapshot::RestSnapshotFetcher};
use venue_data::pool::Pool;
use venue_data::{DepthTransport, OrderBookStore, TradeTransport, TradesStore};
use venue_instrument::Symbol;

#[tokio::main]
async fn main() {
    init_logging();

    let symbols = ["BTC-USDT@BinanceSpot", "ETH-USDT@BinanceSpot"]
        .iter()
        .map(|native| Symbol::parse(native).expect("valid native symbol form"))
        .collect::<Vec<_>>();

    let pool = Pool::new();
    let (ingestion, raw_rx) = WsIngestion::new(Market::Spot);
    let ingestion = Arc::new(ingestion);

    let depth_transport = DepthTransport::new();
    let trade_transport = TradeTransport::new(1024);

    tokio::spawn(parse_loop::run(
        raw_rx,
        Arc::new(StaticSpotResolver),
        pool.clone(),
        depth_transport.clone(),
        trade_transport.clone(),
        CancellationToken::new(),
    ));

    let store = Arc::new(OrderBookStore::new(
        depth_transport,
        Arc::new(RestSnapshotFetcher::new(pool)),
        Arc::new(DepthStreamSubscriber(ingestion.clone())),
        Config::default(),
    ));
    store.start().expect("only one depth subscriber is ever opened");

    let trades = Arc::new(TradesStore::new(trade_transport));
    trades.start();

    // Subscription handles are kept alive for the run's duration; dropping one
    // unregisters its callback immediately.
    let mut book_handles = Vec::new();
    let mut trade_handles = Vec::new();

    for &symbol in &symbols {
        ingestion
            .ensure_trade_stream(symbol)
            .await
            .expect("trade stream subscription");
        store
            .get_or_create(symbol, &CancellationToken::new())
            .await
            .expect("book reaches snapshot-ready");

        if let Some(handle) = store.try_get(symbol, |book| {
            book.subscribe_top_updated(move || {
                info!(%symbol, "top of book changed");
            })
        }) {
            book_handles.push(handle);
        }
        trade_handles.push(trades.subscribe(symbol, move |trade| {
            info!(%symbol, price = trade.price, qty = trade.qty, "trade print");
        }));
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    drop(book_handles);
    drop(trade_handles);

    trades.release().await;
    store.release().await;
    ingestion.release().await;
}

struct StaticSpotResolver;

impl venue_data::parse::SymbolResolver for StaticSpotResolver {
    fn resolve(&self, wire_symbol: &str) -> Option<Symbol> {
        // Binance spot wire symbols (eg/ "BTCUSDT") are the concatenated native form
        // `Symbol::parse` already splits on a known stable-coin suffix.
        Symbol::parse(wire_symbol).ok()
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(cfg!(debug_assertions))
        .json()
        .init()
}
