//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Peer closed the stream (clean EOF or EOF in the middle of a frame)
    #[error("connection closed by peer")]
    Closed,

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload does not fit in a u16 length prefix
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Payload shorter than the fixed part of its sub-format
    #[error("truncated payload: need {need} bytes, got {got}")]
    Truncated {
        /// Minimum number of bytes required
        need: usize,
        /// Number of bytes present
        got: usize,
    },

    /// Payload length differs from the exact length required
    #[error("unexpected payload length {got}, expected {expected}")]
    Length {
        /// Exact number of bytes required
        expected: usize,
        /// Number of bytes present
        got: usize,
    },

    /// Unknown socket role in a handshake frame
    #[error("unknown socket role {0}")]
    Role(u8),

    /// Unknown outgoing packet kind
    #[error("unknown packet kind {0}")]
    Kind(u8),
}

impl WireError {
    /// Whether the error means the peer went away rather than misbehaved
    pub fn is_closed(&self) -> bool {
        matches!(self, WireError::Closed)
    }
}
