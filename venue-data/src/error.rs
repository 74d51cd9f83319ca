use thiserror::Error;
use venue_instrument::symbol::Symbol;

/// Tagged failure surface for every fallible operation in this crate.
///
/// Covers transient I/O, protocol/parse failures, sequencing rejection, back-pressure,
/// overflow, cancellation, and programmer error.
#[derive(Debug, Error)]
pub enum DataError {
    /// A suspending operation observed cancellation before completing.
    #[error("operation cancelled")]
    CancelledByCaller,

    /// Transient WebSocket/REST IO failure; retried with bounded backoff upstream.
    #[error("transient network failure: {0}")]
    NetworkTransient(#[from] venue_integration::SocketError),

    /// A wire message failed to parse or resolve to a known symbol.
    #[error("invalid protocol message: {0}")]
    ProtocolInvalid(String),

    /// A venue sequencing continuity check failed; the offending batch was discarded.
    #[error("sequence gap for {symbol}: expected prev_last_id {expected:?}, got {actual:?}")]
    SequenceGap {
        symbol: Symbol,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// A bounded buffer could not accept more entries.
    #[error("buffer overflow ({context})")]
    BufferOverflow { context: &'static str },

    /// A second depth subscription was attempted against the transport.
    #[error("a depth subscriber already exists")]
    AlreadySubscribed,

    /// An operation was attempted on a store/book that has not been started/created.
    #[error("{0} has not been initialized")]
    NotInitialized(&'static str),
}

impl DataError {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DataError::AlreadySubscribed | DataError::NotInitialized(_)
        )
    }
}
