use super::{SymbolResolver, unwrap_envelope};
use crate::error::DataError;
use crate::model::{PublicTrade, TradeAttr};
use serde_json::Value;
use venue_instrument::Side;

/// Parse a Binance trade message into a [`PublicTrade`].
///
/// `m == true` (buyer is maker) maps to an aggressor sell; `m == false` maps to an
/// aggressor buy. Timestamp prefers `T` (trade time) and falls back to `E` (event time).
/// An optional `X == "LIQUIDATION"` order-status field (present on some futures trade
/// variants) is surfaced on [`TradeAttr::is_liquidation`].
pub fn parse_trade(resolver: &dyn SymbolResolver, bytes: &[u8]) -> Result<PublicTrade, DataError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|error| {
        DataError::ProtocolInvalid(format!("trade message is not valid JSON: {error}"))
    })?;
    let payload = unwrap_envelope(&value);

    let wire_symbol = payload
        .get("s")
        .and_then(Value::as_str)
        .ok_or_else(|| DataError::ProtocolInvalid("trade message missing 's'".into()))?;
    let symbol = resolver
        .resolve(wire_symbol)
        .ok_or_else(|| DataError::ProtocolInvalid(format!("unresolvable symbol '{wire_symbol}'")))?;

    let price = payload
        .get("p")
        .and_then(numeric_or_str)
        .ok_or_else(|| DataError::ProtocolInvalid("trade message missing 'p'".into()))?;
    let qty = payload
        .get("q")
        .and_then(numeric_or_str)
        .ok_or_else(|| DataError::ProtocolInvalid("trade message missing 'q'".into()))?;

    let event_time_ms = payload.get("E").and_then(Value::as_i64);
    let trade_time_ms = payload.get("T").and_then(Value::as_i64);
    let ts_ms = trade_time_ms
        .or(event_time_ms)
        .ok_or_else(|| DataError::ProtocolInvalid("trade message missing 'T'/'E'".into()))?;

    let trade_id = payload.get("t").and_then(Value::as_u64).unwrap_or(0);

    let buyer_is_maker = payload
        .get("m")
        .and_then(Value::as_bool)
        .ok_or_else(|| DataError::ProtocolInvalid("trade message missing 'm'".into()))?;
    let aggressor = if buyer_is_maker { Side::Sell } else { Side::Buy };

    let liquidation = payload
        .get("X")
        .and_then(Value::as_str)
        .is_some_and(|status| status == "LIQUIDATION");

    let attr = TradeAttr::new(aggressor, buyer_is_maker, liquidation);

    Ok(PublicTrade::new(symbol, trade_id, ts_ms, price, qty, attr))
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
            (wire_symbol == "ETHUSDT").then_some(self.0)
        }
    }

    #[test]
    fn maps_buyer_is_maker_to_aggressor_sell() {
        let symbol = Symbol::parse("ETH-USDT@BinanceSpot").unwrap();
        let resolver = FixedResolver(symbol);

        let input = br#"{"e":"trade","E":1649324825173,"s":"ETHUSDT","t":1000000000,"p":"10000.19","q":"0.239000","T":1749354825200,"m":true}"#;

        let trade = parse_trade(&resolver, input).unwrap();
        assert_eq!(trade.symbol, symbol);
        assert_eq!(trade.trade_id, 1_000_000_000);
        assert_eq!(trade.ts_ms, 1_749_354_825_200);
        assert_eq!(trade.price, 10000.19);
        assert_eq!(trade.qty, 0.239);
        assert_eq!(trade.attr.aggressor(), Side::Sell);
        assert!(trade.attr.is_maker());
    }

    #[test]
    fn falls_back_to_event_time_when_trade_time_absent() {
        let symbol = Symbol::parse("ETH-USDT@BinanceSpot").unwrap();
        let resolver = FixedResolver(symbol);

        let input = br#"{"e":"trade","E":42,"s":"ETHUSDT","p":"1","q":"1","m":false}"#;

        let trade = parse_trade(&resolver, input).unwrap();
        assert_eq!(trade.ts_ms, 42);
        assert_eq!(trade.attr.aggressor(), Side::Buy);
    }

    #[test]
    fn detects_liquidation_status() {
        let symbol = Symbol::parse("ETH-USDT@BinanceSpot").unwrap();
        let resolver = FixedResolver(symbol);

        let input = br#"{"e":"trade","E":1,"T":1,"s":"ETHUSDT","p":"1","q":"1","X":"LIQUIDATION","m":false}"#;

        let trade = parse_trade(&resolver, input).unwrap();
        assert!(trade.attr.is_liquidation());
    }
}
