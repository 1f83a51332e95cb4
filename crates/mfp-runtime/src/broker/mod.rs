//! Message broker.
//!
//! [`MessageBroker`] holds all routing state: sessions, topic
//! subscriptions, subscriber-count observers, intent handlers, retained
//! messages and pending requests. It is synchronous and owned by a
//! single [`BrokerRunner`] task; everything else talks to it through
//! the transport or a [`BrokerHandle`].

mod bus;
mod error;
mod manifest_commands;
mod pending;
mod retained;
mod runner;
mod session;
mod subscriptions;

pub use bus::{MessageBroker, Outbound};
pub use error::BrokerError;
pub use runner::{BrokerCommand, BrokerHandle, BrokerRunner};
pub use session::ClientSession;
