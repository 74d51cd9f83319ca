use super::{SymbolResolver, unwrap_envelope};
use crate::error::DataError;
use crate::model::{BatchHeader, L2Delta, L2UpdatePooled};
use crate::pool::Pool;
use serde_json::Value;
use std::sync::Arc;
use venue_instrument::Side;

/// Parse a Binance `depthUpdate` message (spot or futures, optionally wrapped in a
/// combined-stream `{stream, data}` envelope) into a pooled [`L2UpdatePooled`] batch.
///
/// Extracts `E`, `s` (resolved via `resolver`), `U`/`u`, optional `pu`, and the `b`/`a`
/// price-level arrays. Fails on an unresolvable symbol or a malformed level; on failure
/// any partially filled batch is released before the error returns.
pub fn parse_depth(
    resolver: &dyn SymbolResolver,
    pool: &Arc<Pool<L2Delta>>,
    bytes: &[u8],
) -> Result<L2UpdatePooled, DataError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|error| {
        DataError::ProtocolInvalid(format!("depth message is not valid JSON: {error}"))
    })?;
    let payload = unwrap_envelope(&value);

    let wire_symbol = payload
        .get("s")
        .and_then(Value::as_str)
        .ok_or_else(|| DataError::ProtocolInvalid("depth message missing 's'".into()))?;
    let symbol = resolver
        .resolve(wire_symbol)
        .ok_or_else(|| DataError::ProtocolInvalid(format!("unresolvable symbol '{wire_symbol}'")))?;

    let event_time_ms = payload
        .get("E")
        .and_then(Value::as_i64)
        .ok_or_else(|| DataError::ProtocolInvalid("depth message missing 'E'".into()))?;
    let first_id = payload
        .get("U")
        .and_then(Value::as_u64)
        .ok_or_else(|| DataError::ProtocolInvalid("depth message missing 'U'".into()))?;
    let last_id = payload
        .get("u")
        .and_then(Value::as_u64)
        .ok_or_else(|| DataError::ProtocolInvalid("depth message missing 'u'".into()))?;
    // USD-M/COIN-M futures carry an explicit `pu` (previous final update id) field;
    // spot depth updates omit it and instead chain on `U == prev.u + 1`, so we
    // reconstruct the equivalent `prev_last_id` as `U - 1` to give both market types
    // one stitching path in `OrderBookStore`.
    let prev_last_id = payload
        .get("pu")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| first_id.saturating_sub(1));

    let bids = payload
        .get("b")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::ProtocolInvalid("depth message missing 'b'".into()))?;
    let asks = payload
        .get("a")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::ProtocolInvalid("depth message missing 'a'".into()))?;

    let mut batch = L2UpdatePooled::new(pool.clone(), bids.len() + asks.len());
    batch.set_header(BatchHeader {
        symbol,
        event_time_ms,
        is_snapshot: false,
        first_id,
        last_id,
        prev_last_id,
    });

    if let Err(error) = fill_deltas(&mut batch, Side::Buy, bids)
        .and_then(|()| fill_deltas(&mut batch, Side::Sell, asks))
    {
        batch.release();
        return Err(error);
    }

    Ok(batch)
}

fn fill_deltas(batch: &mut L2UpdatePooled, side: Side, levels: &[Value]) -> Result<(), DataError> {
    for level in levels {
        let (price, qty) = level_price_qty(level)?;
        batch.add_delta(L2Delta::new(side, price, qty));
    }
    Ok(())
}

fn level_price_qty(level: &Value) -> Result<(f64, f64), DataError> {
    let pair = level
        .as_array()
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| DataError::ProtocolInvalid("level is not a [price, qty] pair".into()))?;

    let price = numeric_or_str(&pair[0])
        .ok_or_else(|| DataError::ProtocolInvalid("malformed level price".into()))?;
    let qty = numeric_or_str(&pair[1])
        .ok_or_else(|| DataError::ProtocolInvalid("malformed level qty".into()))?;

    Ok((price, qty))
}

fn numeric_or_str(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venue_instrument::Symbol;

    struct FixedResolver(Symbol);

    impl SymbolResolver for FixedResolver {
        fn resolve(&self, wire_symbol: &str) -> Option<Symbol> {
            (wire_symbol == "BTCUSDT").then_some(self.0)
        }
    }

    #[test]
    fn parses_futures_style_depth_update() {
        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let resolver = FixedResolver(symbol);
        let pool = Pool::new();

        let input = br#"{"e":"depthUpdate","E":1700000000123,"s":"BTCUSDT","U":100,"u":102,"pu":99,"b":[["40000.1","0.5"],["39999.9","0"]],"a":[["40000.2","1.0"]]}"#;

        let batch = parse_depth(&resolver, &pool, input).unwrap();
        let header = batch.header();
        assert_eq!(header.symbol, symbol);
        assert_eq!(header.first_id, 100);
        assert_eq!(header.last_id, 102);
        assert_eq!(header.prev_last_id, 99);
        assert_eq!(batch.len(), 3);
        assert!(batch.deltas()[1].is_removal());
        batch.release();
    }

    #[test]
    fn unwraps_combined_stream_envelope() {
        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let resolver = FixedResolver(symbol);
        let pool = Pool::new();

        let input = br#"{"stream":"btcusdt@depth@100ms","data":{"e":"depthUpdate","E":1,"s":"BTCUSDT","U":1,"u":1,"b":[],"a":[]}}"#;

        let batch = parse_depth(&resolver, &pool, input).unwrap();
        assert_eq!(batch.header().symbol, symbol);
        batch.release();
    }

    #[test]
    fn releases_partial_batch_on_malformed_level() {
        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let resolver = FixedResolver(symbol);
        let pool = Pool::new();

        let input = br#"{"e":"depthUpdate","E":1,"s":"BTCUSDT","U":1,"u":1,"b":[["not-a-number","1.0"]],"a":[]}"#;

        assert!(parse_depth(&resolver, &pool, input).is_err());
        assert_eq!(pool.spare_len(), 1);
    }

    #[test]
    fn fails_on_unresolvable_symbol() {
        let symbol = Symbol::parse("BTC-USDT@BinanceSpot").unwrap();
        let resolver = FixedResolver(symbol);
        let pool = Pool::new();

        let input = br#"{"e":"depthUpdate","E":1,"s":"ETHUSDT","U":1,"u":1,"b":[],"a":[]}"#;

        assert!(parse_depth(&resolver, &pool, input).is_err());
    }
}
