//! Concrete [`SnapshotFetcher`] over Binance's REST depth-snapshot endpoints, grounded on
//! a `BinanceSpotOrderBooksL2SnapshotFetcher` style REST fetcher, generalised across all three
//! markets via [`Market::snapshot_url`].

use crate::error::DataError;
use crate::model::{BatchHeader, L2Delta, L2UpdatePooled};
use crate::pool::Pool;
use crate::store::SnapshotFetcher;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use venue_instrument::Side;
use venue_instrument::Symbol;

use super::urls::market_of_symbol;

/// `{"lastUpdateId": N, "bids": [[price, qty], ...], "asks": [...]}`.
#[derive(Debug, Deserialize)]
struct DepthSnapshotResponse {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

pub struct RestSnapshotFetcher {
    client: reqwest::Client,
    pool: Arc<Pool<L2Delta>>,
}

impl RestSnapshotFetcher {
    pub fn new(pool: Arc<Pool<L2Delta>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            pool,
        }
    }
}

#[async_trait]
impl SnapshotFetcher for RestSnapshotFetcher {
    async fn fetch_snapshot(&self, symbol: Symbol, limit: u32) -> Result<L2UpdatePooled, DataError> {
        let market = market_of_symbol(symbol);
        let url = market.snapshot_url();

        let response = self
            .client
            .get(url)
            .query(&[
                ("symbol", symbol.to_wire_symbol()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(venue_integration::SocketError::from)?;

        if !response.status().is_success() {
            return Err(DataError::ProtocolInvalid(format!(
                "snapshot request for {symbol} failed with status {}",
                response.status()
            )));
        }

        let body: DepthSnapshotResponse = response
            .json()
            .await
            .map_err(venue_integration::SocketError::from)?;

        let mut batch = L2UpdatePooled::new(self.pool.clone(), body.bids.len() + body.asks.len());
        batch.set_header(BatchHeader {
            symbol,
            event_time_ms: 0,
            is_snapshot: true,
            first_id: body.last_update_id,
            last_id: body.last_update_id,
            prev_last_id: body.last_update_id,
        });

        if let Err(error) = fill(&mut batch, Side::Buy, &body.bids)
            .and_then(|()| fill(&mut batch, Side::Sell, &body.asks))
        {
            batch.release();
            return Err(error);
        }

        Ok(batch)
    }
}

fn fill(batch: &mut L2UpdatePooled, side: Side, levels: &[[String; 2]]) -> Result<(), DataError> {
    for [price, qty] in levels {
        // A snapshot never carries a zero-quantity "removal" level; skip it defensively
        // rather than feed the book a no-op delta.
        let qty: f64 = qty
            .parse()
            .map_err(|_| DataError::ProtocolInvalid("malformed snapshot quantity".into()))?;
        if qty == 0.0 {
            continue;
        }
        let price: f64 = price
            .parse()
            .map_err(|_| DataError::ProtocolInvalid("malformed snapshot price".into()))?;
        batch.add_delta(L2Delta::new(side, price, qty));
    }
    Ok(())
}
