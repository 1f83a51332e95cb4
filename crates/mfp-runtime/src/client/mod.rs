//! Message client.
//!
//! The application side of the platform: [`MessageClient`] connects a
//! document to the broker and exposes publish/subscribe, request/reply
//! and intent operations as async calls and cancelable streams.
//! [`ManifestRegistryClient`] wraps the broker's manifest registry
//! commands.
//!
//! # Example
//!
//! ```ignore
//! let client = MessageClient::connect(endpoint, "contact-app", ClientOptions::default());
//! let mut weather = client.subscribe("weather/zurich").await?;
//! while let Some(message) = weather.recv().await {
//!     println!("{:?}", message.body);
//! }
//! ```

mod connector;
mod registry;
mod stream;

pub use connector::{ClientOptions, ClientState, MessageClient};
pub use registry::{CapabilityWatch, ManifestRegistryClient};
pub use stream::{
    IntentSelector, IntentStream, ReceivedIntent, SubscriberCountStream, TopicSubscription,
};
