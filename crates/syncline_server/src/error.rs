//! Error types for the hub.

use syncline_core::CoreError;
use syncline_protocol::ProtocolError;
use thiserror::Error;

/// Result type for hub operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving sync sessions.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request was malformed or violated a limit.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested scope is not provisioned on the hub.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// No session is active for the (scope, endpoint) pair.
    #[error("no active session for scope {scope} and endpoint {endpoint}")]
    SessionNotFound {
        /// The requested scope.
        scope: String,
        /// The requesting endpoint.
        endpoint: String,
    },

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// A frame failed to encode or decode.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        ServerError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ServerError::SessionNotFound {
            scope: "sales".into(),
            endpoint: "e-1".into(),
        };
        assert!(err.to_string().contains("sales"));
        assert!(err.to_string().contains("e-1"));
    }

    #[test]
    fn store_errors_convert() {
        let err = ServerError::from(CoreError::UnknownScope("sales".into()));
        assert!(matches!(err, ServerError::Store(_)));
    }
}
