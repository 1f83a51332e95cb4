//! Cross-document transport.
//!
//! The broker sees the transport as two primitives:
//!
//! - an inbox of [`TransportEvent`]s (messages and unloads), FIFO per
//!   sending document
//! - [`Transport::post`] to deliver a JSON payload to one document
//!
//! The origin attached to an inbound message is supplied by the
//! transport, never by the message itself, so a document cannot claim
//! another origin.

mod error;
mod in_process;

pub use error::TransportError;
pub use in_process::{DocumentEndpoint, DocumentReceiver, DocumentSender, InProcessTransport};

use mfp_types::DocumentId;
use serde_json::Value;

/// Inbound event delivered to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A document posted a message.
    Message {
        source: DocumentId,
        origin: String,
        data: Value,
    },
    /// A document went away.
    Unloaded { source: DocumentId },
}

/// Outbound delivery primitive.
pub trait Transport: Send + Sync {
    /// Posts `data` to the `target` document.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DocumentClosed`] if the document is gone.
    fn post(&self, target: DocumentId, data: Value) -> Result<(), TransportError>;
}
