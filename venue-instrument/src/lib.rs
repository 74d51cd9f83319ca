#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Venue-Instrument
//! Core `Asset`, `VenueFlags` and `Symbol` identifier primitives shared by the venue
//! ingestion stack. Every type here is a small `Copy` value: no heap allocation, no
//! interior mutability, total ordering so they can key sorted maps directly.

pub mod asset;
pub mod symbol;
pub mod venue;

pub use asset::Asset;
pub use symbol::Symbol;
pub use venue::VenueFlags;

/// Side of a book level, delta, or trade aggressor.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Deserialize, serde::Serialize)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
        )
    }
}
