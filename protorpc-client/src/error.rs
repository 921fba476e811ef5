//! Client error types.

use protorpc_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid method: {0:?}")]
    InvalidMethod(String),

    #[error("method {method} expects {expected}, got {actual}")]
    TypeMismatch {
        method: String,
        expected: String,
        actual: String,
    },

    #[error("dial {host}:{port} failed: {source}")]
    Dial {
        host: String,
        port: u16,
        #[source]
        source: ProtocolError,
    },

    #[error("connect timeout")]
    Timeout,

    #[error("unexpected call id: sent {sent}, got {received}")]
    UnexpectedCallId { sent: u64, received: u64 },

    /// Error text returned by the remote method.
    #[error("{0}")]
    Server(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Dial { .. } | ClientError::Timeout => true,
            ClientError::Protocol(e) => {
                matches!(e, ProtocolError::ConnectionClosed | ProtocolError::Io(_))
            }
            _ => false,
        }
    }

    /// Returns whether the connection can no longer be trusted to be at a
    /// frame boundary.
    pub fn is_stream_fatal(&self) -> bool {
        match self {
            ClientError::Protocol(e) => e.is_stream_fatal(),
            ClientError::UnexpectedCallId { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::Protocol(ProtocolError::ConnectionClosed).is_retryable());
        assert!(!ClientError::Server("divide by zero".to_string()).is_retryable());
        assert!(!ClientError::InvalidMethod(String::new()).is_retryable());
        assert!(!ClientError::Protocol(ProtocolError::VarintOverflow).is_retryable());
    }

    #[test]
    fn test_stream_fatal() {
        assert!(ClientError::UnexpectedCallId { sent: 1, received: 2 }.is_stream_fatal());
        assert!(ClientError::Protocol(ProtocolError::CrcMismatch {
            expected: 1,
            actual: 2
        })
        .is_stream_fatal());
        assert!(!ClientError::Server("ArithError".to_string()).is_stream_fatal());
    }

    #[test]
    fn test_server_text_is_verbatim() {
        assert_eq!(
            ClientError::Server("divide by zero".to_string()).to_string(),
            "divide by zero"
        );
    }
}
