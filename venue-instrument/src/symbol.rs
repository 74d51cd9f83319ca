use crate::asset::{Asset, AssetError};
use crate::venue::{BINANCE_COIN_DELIVERY, BINANCE_SPOT, BINANCE_USD_PERP, VenueFlags};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Known quote-asset suffixes for splitting a concatenated native form such as
/// `"BTCUSDT"`, longest first so `"BUSD"` is not mistaken for a `"USD"` quote with a
/// dangling `"B"`.
const STABLE_QUOTE_SUFFIXES: &[&str] = &["FDUSD", "TUSD", "BUSD", "USDT", "USDC", "USD", "BTC"];

/// A tradeable instrument: `(base, quote, venue)`. `Copy`, totally ordered, so it can be
/// used directly as a sorted-map key (eg/ `OrderBookStore`'s per-symbol state map).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: Asset,
    pub quote: Asset,
    pub venue: VenueFlags,
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum SymbolError {
    #[error("symbol '{0}' is empty")]
    Empty(String),
    #[error("symbol '{0}' has no recognised quote-asset suffix")]
    NoQuoteSuffix(String),
    #[error("symbol '{0}' names an unrecognised venue preset")]
    UnknownPreset(String),
    #[error("symbol '{0}' is malformed: {1}")]
    Malformed(String, &'static str),
    #[error("asset error while parsing symbol: {0}")]
    Asset(#[from] AssetError),
}

impl Symbol {
    pub fn new(base: Asset, quote: Asset, venue: VenueFlags) -> Self {
        Self { base, quote, venue }
    }

    /// Parse one of the following native forms:
    /// - `"BTCUSDT"` — concatenated, split on a known stable-coin suffix, spot.
    /// - `"BTC-USDT"` — hyphenated, spot.
    /// - `"BTC-USDT-SWAP"` — hyphenated, USD-margined perpetual.
    /// - `"BTC-USD-YYYYMMDD"` — hyphenated, coin-margined delivery (the date is parsed
    ///   and validated but not retained, since `Symbol` is a 3-field tuple).
    /// - `"BASE-QUOTE@Preset"` — explicit preset, eg/ `"BTC-USDT@BinanceSpot"`.
    pub fn parse(native: &str) -> Result<Self, SymbolError> {
        if native.is_empty() {
            return Err(SymbolError::Empty(native.to_string()));
        }

        if let Some((pair, preset)) = native.split_once('@') {
            let venue: VenueFlags = preset
                .parse()
                .map_err(|_| SymbolError::UnknownPreset(native.to_string()))?;
            let (base, quote) = pair
                .split_once('-')
                .ok_or(SymbolError::Malformed(native.to_string(), "expected BASE-QUOTE@Preset"))?;
            return Ok(Self::new(Asset::new(base)?, Asset::new(quote)?, venue));
        }

        if let Some(rest) = native.strip_suffix("-SWAP") {
            let (base, quote) = rest
                .split_once('-')
                .ok_or(SymbolError::Malformed(native.to_string(), "expected BASE-QUOTE-SWAP"))?;
            return Ok(Self::new(
                Asset::new(base)?,
                Asset::new(quote)?,
                BINANCE_USD_PERP,
            ));
        }

        let hyphens = native.matches('-').count();
        if hyphens == 2 {
            // "BTC-USD-YYYYMMDD"
            let mut parts = native.splitn(3, '-');
            let base = parts.next().unwrap();
            let quote = parts.next().unwrap();
            let date = parts.next().unwrap();
            validate_delivery_date(native, date)?;
            return Ok(Self::new(
                Asset::new(base)?,
                Asset::new(quote)?,
                BINANCE_COIN_DELIVERY,
            ));
        }

        if let Some((base, quote)) = native.split_once('-') {
            return Ok(Self::new(Asset::new(base)?, Asset::new(quote)?, BINANCE_SPOT));
        }

        let (base, quote) = split_concatenated(native)
            .ok_or_else(|| SymbolError::NoQuoteSuffix(native.to_string()))?;
        Ok(Self::new(Asset::new(base)?, Asset::new(quote)?, BINANCE_SPOT))
    }

    /// Canonical, unambiguous native form: `"BASE-QUOTE@Preset"`. Round-trips exactly
    /// through [`Symbol::parse`].
    pub fn format(&self) -> String {
        format!("{}-{}@{}", self.base, self.quote, self.venue)
    }

    /// Binance wire form used in stream names and REST params, eg/ `"BTCUSDT"`.
    pub fn to_wire_symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

fn split_concatenated(native: &str) -> Option<(&str, &str)> {
    STABLE_QUOTE_SUFFIXES
        .iter()
        .find(|suffix| native.len() > suffix.len() && native.ends_with(*suffix))
        .map(|suffix| native.split_at(native.len() - suffix.len()))
}

fn validate_delivery_date(native: &str, date: &str) -> Result<(), SymbolError> {
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SymbolError::Malformed(
            native.to_string(),
            "expected an 8-digit YYYYMMDD delivery date",
        ));
    }
    Ok(())
}

impl std::str::FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({})", self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_concatenated_spot() {
        let symbol = Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(symbol.base.as_str(), "BTC");
        assert_eq!(symbol.quote.as_str(), "USDT");
        assert_eq!(symbol.venue, BINANCE_SPOT);
    }

    #[test]
    fn parses_hyphenated_spot() {
        let symbol = Symbol::parse("BTC-USDT").unwrap();
        assert_eq!(symbol.venue, BINANCE_SPOT);
    }

    #[test]
    fn parses_swap() {
        let symbol = Symbol::parse("BTC-USDT-SWAP").unwrap();
        assert_eq!(symbol.venue, BINANCE_USD_PERP);
    }

    #[test]
    fn parses_delivery() {
        let symbol = Symbol::parse("BTC-USD-20241227").unwrap();
        assert_eq!(symbol.venue, BINANCE_COIN_DELIVERY);
    }

    #[test]
    fn rejects_malformed_delivery_date() {
        assert!(Symbol::parse("BTC-USD-2024122").is_err());
    }

    #[test]
    fn round_trips_per_venue_preset() {
        for native in [
            "BTC-USDT@BinanceSpot",
            "BTC-USDT@BinanceUsdPerp",
            "BTC-USD@BinanceCoinDelivery",
        ] {
            let symbol = Symbol::parse(native).unwrap();
            assert_eq!(symbol.format(), native);
            assert_eq!(Symbol::parse(&symbol.format()).unwrap(), symbol);
        }
    }

    #[test]
    fn wire_symbol_concatenates_upper() {
        let symbol = Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(symbol.to_wire_symbol(), "BTCUSDT");
    }

    #[test]
    fn round_trips_through_json() {
        let symbol = Symbol::parse("BTC-USDT@BinanceUsdPerp").unwrap();
        let json = serde_json::to_string(&symbol).unwrap();
        let decoded: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, symbol);
    }
}
