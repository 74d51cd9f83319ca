use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// A bit-set over three disjoint byte-ranges of a `u32`: market kind, contract
/// attributes, and venue identity.
///
/// Composes market/contract/venue facts as one `Copy` value rather than an enum
/// discriminant, so a [`Symbol`](crate::Symbol) can carry all three independently.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct VenueFlags(u32);

// Market kind: bits 0-7.
pub const SPOT: u32 = 1 << 0;
pub const FUTURES: u32 = 1 << 1;
pub const OPTIONS: u32 = 1 << 2;
pub const SWAP: u32 = 1 << 3;
pub const MARGIN: u32 = 1 << 4;
const MARKET_MASK: u32 = 0x0000_00FF;

// Contract attributes: bits 8-15.
pub const PERPETUAL: u32 = 1 << 8;
pub const DELIVERY: u32 = 1 << 9;
pub const USD_MARGINED: u32 = 1 << 10;
pub const COIN_MARGINED: u32 = 1 << 11;
const CONTRACT_MASK: u32 = 0x0000_FF00;

// Venue identity: bits 16-23. Single bit expected at parse boundaries.
pub const BINANCE: u32 = 1 << 16;
const VENUE_MASK: u32 = 0x00FF_0000;

#[derive(Debug, Clone, Copy, Error, Eq, PartialEq)]
pub enum VenueFlagsError {
    #[error("venue flags {0:#010x} carry no venue identity bit")]
    NoVenue(u32),
    #[error("venue flags {0:#010x} carry more than one venue identity bit")]
    MultiVenue(u32),
}

/// The single venue encoded in a [`VenueFlags`] value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Venue {
    Binance,
}

impl VenueFlags {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit == bit
    }

    pub fn is_spot(self) -> bool {
        self.contains(SPOT)
    }

    pub fn is_futures(self) -> bool {
        self.contains(FUTURES)
    }

    pub fn is_perpetual(self) -> bool {
        self.contains(PERPETUAL)
    }

    pub fn is_delivery(self) -> bool {
        self.contains(DELIVERY)
    }

    pub fn is_usd_margined(self) -> bool {
        self.contains(USD_MARGINED)
    }

    pub fn is_coin_margined(self) -> bool {
        self.contains(COIN_MARGINED)
    }

    /// Extract the single [`Venue`] encoded by this bit-set.
    ///
    /// Errors if zero or more than one venue-identity bit is set: callers that need a
    /// single venue must reject multi-venue flags rather than guess.
    pub fn venue(self) -> Result<Venue, VenueFlagsError> {
        let venue_bits = self.0 & VENUE_MASK;
        match venue_bits {
            0 => Err(VenueFlagsError::NoVenue(self.0)),
            BINANCE => Ok(Venue::Binance),
            multi if multi.count_ones() > 1 => Err(VenueFlagsError::MultiVenue(self.0)),
            other => Err(VenueFlagsError::NoVenue(other)),
        }
    }

    pub const fn market_bits(self) -> u32 {
        self.0 & MARKET_MASK
    }

    pub const fn contract_bits(self) -> u32 {
        self.0 & CONTRACT_MASK
    }
}

/// Binance spot market, eg/ `BTCUSDT` traded on `wss://stream.binance.com:9443/ws`.
pub const BINANCE_SPOT: VenueFlags = VenueFlags::from_bits(SPOT | BINANCE);

/// Binance USD-margined perpetual swap, eg/ `BTCUSDT` on `fstream.binance.com`.
pub const BINANCE_USD_PERP: VenueFlags =
    VenueFlags::from_bits(FUTURES | SWAP | PERPETUAL | USD_MARGINED | BINANCE);

/// Binance coin-margined delivery future, eg/ `BTCUSD_PERP` style contracts on
/// `dstream.binance.com`. Delivery date is not retained on the flags or the
/// [`Symbol`](crate::Symbol), which is a 3-field tuple; see `DESIGN.md`.
pub const BINANCE_COIN_DELIVERY: VenueFlags =
    VenueFlags::from_bits(FUTURES | DELIVERY | COIN_MARGINED | BINANCE);

impl Display for VenueFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            v if v == BINANCE_SPOT => "BinanceSpot",
            v if v == BINANCE_USD_PERP => "BinanceUsdPerp",
            v if v == BINANCE_COIN_DELIVERY => "BinanceCoinDelivery",
            _ => "Unknown",
        };
        write!(f, "{name}")
    }
}

impl std::fmt::Debug for VenueFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "VenueFlags({self}, {:#010x})", self.0)
    }
}

impl std::str::FromStr for VenueFlags {
    type Err = VenueFlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BinanceSpot" => Ok(BINANCE_SPOT),
            "BinanceUsdPerp" => Ok(BINANCE_USD_PERP),
            "BinanceCoinDelivery" => Ok(BINANCE_COIN_DELIVERY),
            _ => Err(VenueFlagsError::NoVenue(0)),
        }
    }
}
