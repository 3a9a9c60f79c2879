//! Error types for the receive path.

use thiserror::Error;

/// Errors surfaced by the buffered input layer.
///
/// Nothing here is retried internally. Every error is returned from the
/// read call that triggered it.
#[derive(Debug, Error)]
pub enum NetError {
    /// The driver cannot supply more bytes.
    #[error("connection closed")]
    ConnectionClosed,
    /// A driver was constructed without either receive primitive.
    #[error("driver implements neither fill-in-place nor pull-new receive")]
    UnconfiguredDriver,
    /// The block allocator is exhausted.
    #[error("out of buffer resources: {0}")]
    OutOfResources(String),
    /// Caller-side programming error (bad range, wrong state, oversized request).
    #[error("invalid use: {0}")]
    InvalidUse(String),
    /// Transport-level I/O failure other than end-of-stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        NetError::InvalidUse(msg.into())
    }

    /// True for end-of-stream, the only error a frame loop treats as a clean stop.
    pub fn is_closed(&self) -> bool {
        matches!(self, NetError::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
