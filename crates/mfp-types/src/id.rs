//! Identifier types for the messaging platform.
//!
//! All identifiers are UUID-based so they can travel across document
//! boundaries without coordination. They serialize as bare UUID strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a connected message client.
///
/// Assigned by the broker when a connect handshake is accepted. A
/// document may host several clients; each gets its own id.
///
/// # Connection Lifecycle
///
/// ```text
/// ┌──────────┐  connect   ┌──────────┐  connected  ┌──────────┐
/// │  Client  │ ─────────► │  Broker  │ ──────────► │  Client  │
/// │ (no id)  │            │ assigns  │             │ ClientId │
/// └──────────┘            └──────────┘             └──────────┘
/// ```
///
/// # Example
///
/// ```
/// use mfp_types::ClientId;
///
/// let id = ClientId::new();
/// assert!(id.to_string().starts_with("client:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

#[allow(clippy::new_without_default)] // ClientId is issued by the broker, never defaulted
impl ClientId {
    /// Creates a new [`ClientId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

/// Identifier of a single subscription within a client.
///
/// Every `subscribe`, `subscriber_count` or `handle_intents` call on a
/// client creates its own subscriber id, so two overlapping
/// subscriptions of the same client stay distinguishable to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

#[allow(clippy::new_without_default)]
impl SubscriberId {
    /// Creates a new [`SubscriberId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

/// Identifier of a document attached to the transport.
///
/// Documents are the unit of delivery: the transport posts envelopes
/// to a document, and a document unload removes every client it hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

#[allow(clippy::new_without_default)]
impl DocumentId {
    /// Creates a new [`DocumentId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}

/// Identifier of a registered capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityId(pub Uuid);

#[allow(clippy::new_without_default)]
impl CapabilityId {
    /// Creates a new [`CapabilityId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cap:{}", self.0)
    }
}

/// Identifier of a registered intention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentionId(pub Uuid);

#[allow(clippy::new_without_default)]
impl IntentionId {
    /// Creates a new [`IntentionId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for IntentionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "intention:{}", self.0)
    }
}
