//! Typed pub/sub between the WS parse loop and the store/consumer side: a single-
//! subscriber pooled depth channel and a fan-out trade channel.

pub mod depth;
pub mod trade;

pub use depth::{DepthSubscription, DepthTransport};
pub use trade::{TradeSubscription, TradeTransport};
