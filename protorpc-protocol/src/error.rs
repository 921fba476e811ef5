//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing, encoding or decoding protorpc traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("varint overflows a 64-bit integer")]
    VarintOverflow,

    #[error("truncated varint")]
    TruncatedVarint,

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    #[error("header too large: {size} bytes (max {max})")]
    HeaderTooLarge { size: usize, max: usize },

    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("unexpected checksum: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("unexpected raw length: header says {expected}, decoded {actual}")]
    RawLengthMismatch { expected: u64, actual: u64 },

    #[error("snappy error: {0}")]
    Snappy(#[from] snap::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown method {method} for service {service}")]
    UnknownMethod { service: String, method: String },
}

impl ProtocolError {
    /// Returns whether the error leaves the byte stream in an unknown
    /// position, so the connection must be closed and re-dialed.
    pub fn is_stream_fatal(&self) -> bool {
        !matches!(self, ProtocolError::UnknownMethod { .. })
    }
}
