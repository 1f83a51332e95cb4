//! Pending request correlation.
//!
//! A requester subscribes to a fresh reply topic before it publishes
//! the request. The subscription registers the topic here; the first
//! message published to it is the reply and consumes the entry.

use mfp_types::ClientId;
use std::collections::HashMap;

/// Reply topics awaiting exactly one reply, keyed by topic.
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: HashMap<String, ClientId>,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `topic` as a reply address of `requester`.
    ///
    /// Returns `false` if another client already owns the topic.
    pub fn register(&mut self, topic: &str, requester: ClientId) -> bool {
        match self.requests.get(topic) {
            Some(owner) => *owner == requester,
            None => {
                self.requests.insert(topic.to_string(), requester);
                true
            }
        }
    }

    /// Returns `true` if `topic` awaits a reply for `requester`.
    #[must_use]
    pub fn is_pending_for(&self, topic: &str, requester: ClientId) -> bool {
        self.requests.get(topic) == Some(&requester)
    }

    /// Consumes the entry of `topic`, returning its requester.
    pub fn take(&mut self, topic: &str) -> Option<ClientId> {
        self.requests.remove(topic)
    }

    /// Removes the entry of `topic` if `requester` owns it.
    pub fn remove_if_owner(&mut self, topic: &str, requester: ClientId) -> bool {
        if self.is_pending_for(topic, requester) {
            self.requests.remove(topic);
            return true;
        }
        false
    }

    /// Drops every request of `requester`.
    pub fn remove_client(&mut self, requester: ClientId) {
        self.requests.retain(|_, owner| *owner != requester);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
