//! Error types for CSDL.

use crate::core::types::ContentHash;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for CSDL operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in CSDL operations.
///
/// The text layer never produces these; every variant belongs to the wire,
/// embedding or configuration surface.
#[derive(Error, Debug)]
pub enum Error {
    // Frame errors
    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Checksum mismatch: header {expected:#06x}, payload {actual:#06x}")]
    Checksum { expected: u16, actual: u16 },

    #[error("Unknown reference: {0} is not in the registry")]
    UnknownReference(ContentHash),

    #[error("Payload too large: {0} bytes (max 65535)")]
    PayloadTooLarge(usize),

    #[error("Unknown field id: {0:#04x}")]
    UnknownFieldId(u8),

    #[error("Unknown {table} symbol: {id:#04x}")]
    UnknownSymbol { table: &'static str, id: u8 },

    // Compression errors
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    // Embedding errors
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Embedding cancelled")]
    EmbeddingCancelled,

    #[error("Invalid embedding envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Unsupported quantization width: {0} bits")]
    UnsupportedQuantization(u8),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the peer can recover by resending the full, non-deduplicated message.
    pub fn needs_full_resend(&self) -> bool {
        matches!(self, Error::UnknownReference(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::DeserializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::InvalidEnvelope(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_reference_requests_resend() {
        let err = Error::UnknownReference(ContentHash(42));
        assert!(err.needs_full_resend());
        assert!(!Error::Frame("bad magic".into()).needs_full_resend());
    }

    #[test]
    fn test_checksum_display() {
        let err = Error::Checksum {
            expected: 0x1d0f,
            actual: 0xffff,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: header 0x1d0f, payload 0xffff"
        );
    }
}
