use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime-tunable ingestion parameters. Consumers build one and pass it in; there is
/// no separate config crate, just a plain `Deserialize` struct owned by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Symbols to subscribe to, in their native wire form (eg/ "btcusdt").
    pub symbols: Vec<String>,
    /// Whether to use the combined-stream WS endpoint (`/stream?streams=A/B/C`).
    pub combined: bool,
    /// `limit` query parameter for the REST snapshot fetch.
    pub snapshot_limit: u32,
    /// How long a WS connection runs before a scheduled reconnect, if any caller wants one.
    pub duration_sec: u64,
    /// Minimum L2 updates a test/smoke harness should observe before passing.
    pub min_l2_updates: u64,
    /// Minimum trades a test/smoke harness should observe before passing.
    pub min_trades: u64,
    /// Lag threshold, in milliseconds, above which a lag monitor should alert.
    pub max_lag_ms: u64,
    /// Per-symbol pre-snapshot buffer capacity.
    pub max_buffer_per_symbol: usize,
    /// Bounded retry attempts for REST/WS transient failures.
    pub max_retry_attempts: u32,
    /// Initial backoff delay before the first retry.
    pub initial_backoff: Duration,
    /// Backoff delay ceiling.
    pub max_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            combined: true,
            snapshot_limit: 1000,
            duration_sec: 0,
            min_l2_updates: 0,
            min_trades: 0,
            max_lag_ms: 1500,
            max_buffer_per_symbol: 4096,
            max_retry_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}
