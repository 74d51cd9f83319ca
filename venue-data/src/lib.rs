#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Venue-Data
//! A Binance-only L2 order-book and public-trade ingestion core: WebSocket frame
//! parsing, a snapshot+delta stitching `OrderBookStore`, a per-symbol `OrderBookL2`, a
//! fan-out `TradesStore`, and the pooled-buffer, panic-isolated-callback, and
//! cooperative-cancellation machinery all of the above share.

pub mod book;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod parse;
pub mod pool;
pub mod store;
pub mod trades_store;
pub mod transport;

pub use book::{Level, OrderBookL2, SubscriptionHandle};
pub use config::Config;
pub use error::DataError;
pub use pool::Pool;
pub use store::{LagEvent, OrderBookStore, SnapshotFetcher, StreamSubscriber};
pub use trades_store::{TradeCallbackHandle, TradesStore};
pub use transport::{DepthSubscription, DepthTransport, TradeSubscription, TradeTransport};
