use venue_instrument::{Symbol, VenueFlags};

/// Which of Binance's three market-data gateways a [`Symbol`] belongs on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Market {
    Spot,
    UsdMFutures,
    CoinMFutures,
}

impl Market {
    pub fn of(venue: VenueFlags) -> Self {
        if venue.is_coin_margined() {
            Market::CoinMFutures
        } else if venue.is_usd_margined() || venue.is_futures() {
            Market::UsdMFutures
        } else {
            Market::Spot
        }
    }

    /// Raw WebSocket base url (single-stream form; combined form appends
    /// `/stream?streams=...` instead).
    pub fn websocket_base_url(self) -> &'static str {
        match self {
            Market::Spot => "wss://stream.binance.com:9443/ws",
            Market::UsdMFutures => "wss://fstream.binance.com/ws",
            Market::CoinMFutures => "wss://dstream.binance.com/ws",
        }
    }

    /// REST depth-snapshot endpoint base.
    pub fn snapshot_url(self) -> &'static str {
        match self {
            Market::Spot => "https://api.binance.com/api/v3/depth",
            Market::UsdMFutures => "https://fapi.binance.com/fapi/v1/depth",
            Market::CoinMFutures => "https://dapi.binance.com/dapi/v1/depth",
        }
    }
}

/// The combined-stream WS url for a set of already-lowercased stream names.
pub fn combined_stream_url(market: Market, streams: &[String]) -> String {
    format!(
        "{}/stream?streams={}",
        market.websocket_base_url().trim_end_matches("/ws"),
        streams.join("/")
    )
}

pub fn market_of_symbol(symbol: Symbol) -> Market {
    Market::of(symbol.venue)
}
