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

//! # Venue-Integration
//! Low-level, exchange-agnostic transport primitives: the socket error taxonomy, a
//! `SubscriptionId` cross-reference type, WebSocket connect/frame helpers, and a
//! token-bucket rate limiter.

pub mod error;
pub mod protocol;
pub mod rate_limit;
pub mod subscription;

pub use error::SocketError;
pub use subscription::SubscriptionId;
