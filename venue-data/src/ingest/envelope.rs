use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use venue_instrument::Symbol;

/// Binance stream name for a symbol's depth channel, eg/ `"btcusdt@depth@100ms"`.
pub fn depth_stream_name(symbol: Symbol) -> String {
    format!("{}@depth@100ms", symbol.to_wire_symbol().to_lowercase())
}

/// Binance stream name for a symbol's trade channel, eg/ `"btcusdt@trade"`.
pub fn trade_stream_name(symbol: Symbol) -> String {
    format!("{}@trade", symbol.to_wire_symbol().to_lowercase())
}

/// `{"method":"SUBSCRIBE"|"UNSUBSCRIBE","params":[...],"id":N}`.
#[derive(Debug, Serialize)]
pub struct SubscriptionEnvelope {
    pub method: Method,
    pub params: Vec<String>,
    pub id: u64,
}

#[derive(Debug, Copy, Clone, Serialize)]
pub enum Method {
    #[serde(rename = "SUBSCRIBE")]
    Subscribe,
    #[serde(rename = "UNSUBSCRIBE")]
    Unsubscribe,
}

impl SubscriptionEnvelope {
    pub fn subscribe(streams: Vec<String>, id: u64) -> Self {
        Self {
            method: Method::Subscribe,
            params: streams,
            id,
        }
    }

    pub fn unsubscribe(streams: Vec<String>, id: u64) -> Self {
        Self {
            method: Method::Unsubscribe,
            params: streams,
            id,
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).expect("SubscriptionEnvelope serializes infallibly")
    }
}

/// Per-connection monotonically increasing request id.
#[derive(Debug, Default)]
pub struct RequestIdSequence(AtomicU64);

impl RequestIdSequence {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
