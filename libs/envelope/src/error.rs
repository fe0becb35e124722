//! Error types for envelope decoding, handlers, and transports.

use thiserror::Error;

/// Errors that can occur when decoding or encoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not valid envelope JSON.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame is not valid UTF-8.
    #[error("envelope is not valid UTF-8")]
    NotUtf8,
}

/// A business-logic failure reported by a handler.
///
/// Handler errors travel back to the caller as `success=false` responses,
/// never as transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The request payload could not be understood.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Creates a generic handler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::InvalidPayload(err.to_string())
    }
}

/// Errors raised by a frame transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The peer has gone away.
    #[error("transport closed")]
    Closed,

    /// An outbound envelope could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
