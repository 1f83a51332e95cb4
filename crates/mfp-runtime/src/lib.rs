//! MFP Runtime - broker, registries and client of the messaging platform.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Wire Layer                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  mfp-types   : IDs, ErrorCode, Qualifier matching           │
//! │  mfp-message : Envelopes, messages, manifests, errors       │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  registry/  : ApplicationRegistry, ManifestRegistry         │
//! │  broker/    : MessageBroker, BrokerRunner, BrokerHandle     │
//! │  transport/ : Transport, InProcessTransport                 │
//! │  client/    : MessageClient, ManifestRegistryClient         │
//! │  platform/  : HostPlatform                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Frontend Layer (mfp-cli)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! ## [`registry`] - Applications and Manifests
//!
//! - [`ApplicationRegistry`](registry::ApplicationRegistry): registered
//!   applications, read-only after startup
//! - [`ManifestRegistry`](registry::ManifestRegistry): capabilities and
//!   intentions with visibility and provider lookup
//! - [`ManifestLoader`](registry::ManifestLoader): where manifests come from
//!
//! ## [`broker`] - Routing
//!
//! - [`MessageBroker`](broker::MessageBroker): topics, retained
//!   messages, intents, request/reply, subscriber counts
//! - [`BrokerRunner`](broker::BrokerRunner): drives the broker in a task
//!
//! ## [`client`] - Application Side
//!
//! - [`MessageClient`](client::MessageClient): handshake and messaging API
//! - [`ManifestRegistryClient`](client::ManifestRegistryClient): registry
//!   queries over intents
//!
//! ## [`config`] - Configuration Management
//!
//! Configuration priority: Environment > Project > Global > Default

pub mod broker;
pub mod client;
pub mod config;
pub mod platform;
pub mod registry;
pub mod transport;

// Re-exports for convenience
pub use broker::{BrokerError, BrokerHandle, BrokerRunner, MessageBroker};
pub use client::{
    ClientOptions, ClientState, IntentSelector, ManifestRegistryClient, MessageClient,
};
pub use config::{ConfigError, ConfigLoader, PlatformConfig};
pub use platform::{HostPlatform, PlatformError, PLATFORM_APP};
pub use registry::{
    FileManifestLoader, ManifestLoader, ManifestRegistry, RegistryError, StaticManifestLoader,
};
pub use transport::{InProcessTransport, Transport, TransportError, TransportEvent};
