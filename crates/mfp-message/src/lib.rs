//! Wire model for the microfrontend messaging platform.
//!
//! Everything that crosses a document boundary is defined here:
//!
//! - [`Envelope`] around [`ClientCommand`]s and [`BrokerEvent`]s
//! - [`TopicMessage`] and [`IntentMessage`] with their [`Headers`]
//! - The manifest model ([`Application`], [`Capability`], [`Intention`])
//! - [`ManifestCommand`]s answered by the broker's manifest registry
//! - [`MessagingError`], the error taxonomy clients observe
//!
//! # Message Flow
//!
//! ```text
//! ┌─────────────┐  Envelope<ClientCommand>   ┌─────────────┐
//! │   Client    │ ─────────────────────────► │   Broker    │
//! │  document   │                            │  (host doc) │
//! │             │ ◄───────────────────────── │             │
//! └─────────────┘  Envelope<BrokerEvent>     └─────────────┘
//! ```

mod command;
mod envelope;
mod error;
mod headers;
mod manifest;
mod message;
mod topic;

pub use command::{ManifestCommand, MANIFEST_REGISTRY_TYPE};
pub use envelope::{
    BrokerEvent, Channel, ClientCommand, ConnectRefusal, Envelope, Routed, Status, StatusReply,
};
pub use error::MessagingError;
pub use headers::{Headers, APP_SYMBOLIC_NAME, CLIENT_ID, REPLY_TO};
pub use manifest::{
    Application, ApplicationManifest, Capability, CapabilityDescriptor, CapabilityMetadata,
    Intention, IntentionDescriptor, IntentionMetadata, Manifest,
};
pub use message::{Intent, IntentMessage, TopicMessage};
pub use topic::{is_reply_topic, reply_topic, validate_topic, REPLY_TOPIC_PREFIX};
