//! Zero-allocation-where-practical JSON parsers turning raw WebSocket frame bytes into
//! [`L2UpdatePooled`](crate::model::L2UpdatePooled) batches and
//! [`PublicTrade`](crate::model::PublicTrade) values.

pub mod depth;
pub mod trade;

pub use depth::parse_depth;
pub use trade::parse_trade;

use venue_instrument::Symbol;

/// Resolves a venue wire symbol (eg/ `"BTCUSDT"`) to a [`Symbol`], injected into the
/// parsers so they stay agnostic of whatever symbol table the caller maintains.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, wire_symbol: &str) -> Option<Symbol>;
}

/// Unwraps a combined-stream `{"stream": "...", "data": {...}}` envelope, returning the
/// inner payload value. Messages from a single-stream connection are returned unwrapped.
pub(crate) fn unwrap_envelope(value: &serde_json::Value) -> &serde_json::Value {
    match value.get("data") {
        Some(data) if value.get("stream").is_some() => data,
        _ => value,
    }
}
