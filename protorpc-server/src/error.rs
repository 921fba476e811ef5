//! Server error types.

use crate::config::ConfigError;
use protorpc_protocol::ProtocolError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("service already registered: {0}")]
    DuplicateService(String),

    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    #[error("method {method} does not belong to service {service}")]
    ForeignMethod { service: String, method: String },

    #[error("can't find service method: {0}")]
    MethodNotFound(String),

    #[error("method {method} expects {expected}, got {actual}")]
    TypeMismatch {
        method: String,
        expected: String,
        actual: String,
    },

    #[error("{0}")]
    Service(String),
}

impl ServerError {
    /// Returns whether the error was raised while setting the server up,
    /// before any connection was accepted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ServerError::Config(_)
                | ServerError::DuplicateService(_)
                | ServerError::DuplicateMethod(_)
                | ServerError::ForeignMethod { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_text() {
        let err = ServerError::MethodNotFound("ArithService.Sqrt".to_string());
        assert_eq!(
            err.to_string(),
            "can't find service method: ArithService.Sqrt"
        );
    }

    #[test]
    fn test_service_error_text_is_verbatim() {
        let err = ServerError::Service("divide by zero".to_string());
        assert_eq!(err.to_string(), "divide by zero");
        assert!(!err.is_configuration());
        assert!(ServerError::DuplicateService("EchoService".to_string()).is_configuration());
    }
}
