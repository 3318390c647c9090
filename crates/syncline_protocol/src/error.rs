//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Failed to encode a value to CBOR.
    #[error("encode error: {0}")]
    Encode(String),

    /// Failed to decode a value from CBOR.
    #[error("decode error: {0}")]
    Decode(String),

    /// A numeric wire code did not map to a known variant.
    #[error("invalid wire code {code} for {kind}")]
    InvalidCode {
        /// The kind of value being decoded.
        kind: &'static str,
        /// The unrecognized code.
        code: u8,
    },

    /// A message was structurally valid but semantically inconsistent.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Creates an invalid-code error.
    pub fn invalid_code(kind: &'static str, code: u8) -> Self {
        Self::InvalidCode { kind, code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_code("RowOp", 9);
        assert_eq!(err.to_string(), "invalid wire code 9 for RowOp");

        let err = ProtocolError::Decode("truncated input".into());
        assert!(err.to_string().contains("truncated"));
    }
}
