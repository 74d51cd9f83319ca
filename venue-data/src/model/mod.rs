//! Value types and the pooled mutable batch that flow through the transport.

pub mod book_update;
pub mod delta;
pub mod trade;

pub use book_update::{BatchHeader, L2Update, L2UpdatePooled};
pub use delta::L2Delta;
pub use trade::{PublicTrade, TradeAttr};
