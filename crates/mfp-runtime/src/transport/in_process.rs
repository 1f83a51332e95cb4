//! In-process transport.
//!
//! Each document is a pair of unbounded channels: one shared inbox
//! towards the broker, one private inbox per document. Unbounded
//! channels keep delivery FIFO per sender without back-pressure, like
//! cross-document posting.
//!
//! ```text
//! DocumentSender ──TransportEvent──► broker inbox ──► BrokerRunner
//!                                                        │
//! DocumentReceiver ◄──── Value ──── InProcessTransport ◄─┘ post()
//! ```
//!
//! Dropping the last [`DocumentSender`] of a document unloads it: the
//! document is removed and the broker receives
//! [`TransportEvent::Unloaded`].

use super::{Transport, TransportError, TransportEvent};
use mfp_types::DocumentId;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

struct Shared {
    documents: RwLock<HashMap<DocumentId, mpsc::UnboundedSender<Value>>>,
    broker_tx: mpsc::UnboundedSender<TransportEvent>,
}

/// Transport connecting in-process documents to one broker.
#[derive(Clone)]
pub struct InProcessTransport {
    shared: Arc<Shared>,
}

impl InProcessTransport {
    /// Creates a transport and the broker's inbox.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (broker_tx, broker_rx) = mpsc::unbounded_channel();
        let transport = Self {
            shared: Arc::new(Shared {
                documents: RwLock::new(HashMap::new()),
                broker_tx,
            }),
        };
        (transport, broker_rx)
    }

    /// Attaches a new document loaded from `origin`.
    pub fn open_document(&self, origin: impl Into<String>) -> DocumentEndpoint {
        let id = DocumentId::new();
        let origin = origin.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.documents.write().insert(id, tx);
        debug!(document = %id, origin = %origin, "Document opened");

        DocumentEndpoint {
            sender: DocumentSender {
                id,
                origin: Arc::from(origin.as_str()),
                broker_tx: self.shared.broker_tx.clone(),
                _guard: Arc::new(UnloadGuard {
                    id,
                    shared: Arc::downgrade(&self.shared),
                }),
            },
            receiver: DocumentReceiver { id, inbox: rx },
        }
    }

    /// Number of attached documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.shared.documents.read().len()
    }
}

impl Transport for InProcessTransport {
    fn post(&self, target: DocumentId, data: Value) -> Result<(), TransportError> {
        let documents = self.shared.documents.read();
        let tx = documents
            .get(&target)
            .ok_or(TransportError::DocumentClosed(target))?;
        tx.send(data)
            .map_err(|_| TransportError::DocumentClosed(target))
    }
}

/// Both ends of an attached document.
pub struct DocumentEndpoint {
    sender: DocumentSender,
    receiver: DocumentReceiver,
}

impl DocumentEndpoint {
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.sender.id
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.sender.origin
    }

    /// Posts to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BrokerClosed`] if the broker is gone.
    pub fn post(&self, data: Value) -> Result<(), TransportError> {
        self.sender.post(data)
    }

    /// Receives the next payload posted to this document.
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Splits into independently owned halves.
    #[must_use]
    pub fn split(self) -> (DocumentSender, DocumentReceiver) {
        (self.sender, self.receiver)
    }
}

/// Posting half of a document. Cloneable; the document unloads when
/// the last clone is dropped.
#[derive(Clone)]
pub struct DocumentSender {
    id: DocumentId,
    origin: Arc<str>,
    broker_tx: mpsc::UnboundedSender<TransportEvent>,
    _guard: Arc<UnloadGuard>,
}

impl DocumentSender {
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Posts to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BrokerClosed`] if the broker is gone.
    pub fn post(&self, data: Value) -> Result<(), TransportError> {
        self.broker_tx
            .send(TransportEvent::Message {
                source: self.id,
                origin: self.origin.to_string(),
                data,
            })
            .map_err(|_| TransportError::BrokerClosed)
    }
}

/// Receiving half of a document.
pub struct DocumentReceiver {
    id: DocumentId,
    inbox: mpsc::UnboundedReceiver<Value>,
}

impl DocumentReceiver {
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Receives the next payload; `None` once the document is unloaded
    /// or the transport is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.inbox.recv().await
    }
}

struct UnloadGuard {
    id: DocumentId,
    shared: Weak<Shared>,
}

impl Drop for UnloadGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.documents.write().remove(&self.id);
            // Broker may already be gone
            let _ = shared
                .broker_tx
                .send(TransportEvent::Unloaded { source: self.id });
            debug!(document = %self.id, "Document unloaded");
        }
    }
}
