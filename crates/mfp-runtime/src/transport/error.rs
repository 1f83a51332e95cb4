//! Transport errors.

use mfp_types::{DocumentId, ErrorCode};
use thiserror::Error;

/// Errors raised when posting across a document boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The target document is gone.
    #[error("document {0} is closed")]
    DocumentClosed(DocumentId),

    /// The broker no longer receives messages.
    #[error("broker inbox is closed")]
    BrokerClosed,

    /// The payload could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::DocumentClosed(_) => "TRANSPORT_DOCUMENT_CLOSED",
            Self::BrokerClosed => "TRANSPORT_BROKER_CLOSED",
            Self::Encode(_) => "TRANSPORT_ENCODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
