//! Subscription bookkeeping.
//!
//! One [`SubscriptionTable`] holds topic subscriptions, a second one
//! holds subscriber-count observers. Entries are kept per topic in
//! insertion order so fan-out follows subscribe order.

use chrono::{DateTime, Utc};
use mfp_types::{ClientId, SubscriberId};
use std::collections::{BTreeSet, HashMap};

/// A live subscription of one client-side subscriber on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub client: ClientId,
    pub subscriber: SubscriberId,
    pub created_at: DateTime<Utc>,
}

/// Subscriptions keyed by exact topic.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    topics: HashMap<String, Vec<Subscription>>,
}

impl SubscriptionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription. Returns `false` if `client` already
    /// registered `subscriber` on the topic.
    pub fn add(&mut self, topic: &str, client: ClientId, subscriber: SubscriberId) -> bool {
        let entries = self.topics.entry(topic.to_string()).or_default();
        if entries.iter().any(|s| s.client == client && s.subscriber == subscriber) {
            return false;
        }
        entries.push(Subscription {
            topic: topic.to_string(),
            client,
            subscriber,
            created_at: Utc::now(),
        });
        true
    }

    /// Removes one subscription. Only the owning client can remove it.
    pub fn remove(&mut self, topic: &str, client: ClientId, subscriber: SubscriberId) -> bool {
        let Some(entries) = self.topics.get_mut(topic) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|s| !(s.client == client && s.subscriber == subscriber));
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Removes every subscription of `client` and returns the affected
    /// topics in sorted order.
    pub fn remove_client(&mut self, client: ClientId) -> Vec<String> {
        let mut affected = BTreeSet::new();
        self.topics.retain(|topic, entries| {
            let before = entries.len();
            entries.retain(|s| s.client != client);
            if entries.len() != before {
                affected.insert(topic.clone());
            }
            !entries.is_empty()
        });
        affected.into_iter().collect()
    }

    /// Removes every subscription on `topic` and returns how many there were.
    pub fn remove_topic(&mut self, topic: &str) -> usize {
        self.topics.remove(topic).map_or(0, |entries| entries.len())
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    /// Distinct clients subscribed to `topic`, in subscribe order.
    #[must_use]
    pub fn clients(&self, topic: &str) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = Vec::new();
        for subscription in self.entries(topic) {
            if !clients.contains(&subscription.client) {
                clients.push(subscription.client);
            }
        }
        clients
    }

    #[must_use]
    pub fn has_client(&self, topic: &str, client: ClientId) -> bool {
        self.entries(topic).iter().any(|s| s.client == client)
    }

    #[must_use]
    pub fn entries(&self, topic: &str) -> &[Subscription] {
        self.topics.get(topic).map_or(&[], Vec::as_slice)
    }
}

/// Clients that registered intent handlers.
#[derive(Debug, Default)]
pub struct IntentHandlers {
    handlers: Vec<(ClientId, SubscriberId)>,
}

impl IntentHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, client: ClientId, subscriber: SubscriberId) -> bool {
        if self.handlers.contains(&(client, subscriber)) {
            return false;
        }
        self.handlers.push((client, subscriber));
        true
    }

    pub fn remove(&mut self, client: ClientId, subscriber: SubscriberId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|entry| *entry != (client, subscriber));
        self.handlers.len() != before
    }

    pub fn remove_client(&mut self, client: ClientId) {
        self.handlers.retain(|(c, _)| *c != client);
    }

    /// Distinct handling clients, in registration order.
    #[must_use]
    pub fn clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = Vec::new();
        for (client, _) in &self.handlers {
            if !clients.contains(client) {
                clients.push(*client);
            }
        }
        clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tracks_live_subscriptions() {
        let mut table = SubscriptionTable::new();
        let client = ClientId::new();
        let (s1, s2) = (SubscriberId::new(), SubscriberId::new());

        assert_eq!(table.count("t"), 0);
        assert!(table.add("t", client, s1));
        assert!(table.add("t", client, s2));
        assert!(!table.add("t", client, s1));
        assert_eq!(table.count("t"), 2);
        assert_eq!(table.clients("t"), vec![client]);

        assert!(table.remove("t", client, s1));
        assert!(!table.remove("t", client, s1));
        assert_eq!(table.count("t"), 1);
        assert!(table.remove("t", client, s2));
        assert_eq!(table.count("t"), 0);
        assert!(table.entries("t").is_empty());
    }

    #[test]
    fn only_owner_removes_subscription() {
        let mut table = SubscriptionTable::new();
        let (owner, other) = (ClientId::new(), ClientId::new());
        let sub = SubscriberId::new();
        table.add("t", owner, sub);

        assert!(!table.remove("t", other, sub));
        assert_eq!(table.count("t"), 1);
    }

    #[test]
    fn subscriber_ids_are_scoped_per_client() {
        let mut table = SubscriptionTable::new();
        let (a, b) = (ClientId::new(), ClientId::new());
        let sub = SubscriberId::new();

        assert!(table.add("t", a, sub));
        assert!(table.add("t", b, sub));
        assert_eq!(table.count("t"), 2);
        assert_eq!(table.clients("t"), vec![a, b]);

        assert!(table.remove("t", a, sub));
        assert_eq!(table.clients("t"), vec![b]);
    }

    #[test]
    fn remove_client_reports_each_topic_once() {
        let mut table = SubscriptionTable::new();
        let (a, b) = (ClientId::new(), ClientId::new());
        table.add("x", a, SubscriberId::new());
        table.add("x", a, SubscriberId::new());
        table.add("y", a, SubscriberId::new());
        table.add("y", b, SubscriberId::new());

        assert_eq!(table.remove_client(a), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(table.count("x"), 0);
        assert_eq!(table.clients("y"), vec![b]);
        assert!(table.remove_client(a).is_empty());
    }

    #[test]
    fn intent_handlers_are_distinct_per_client() {
        let mut handlers = IntentHandlers::new();
        let (a, b) = (ClientId::new(), ClientId::new());
        let sub = SubscriberId::new();
        assert!(handlers.add(a, sub));
        assert!(!handlers.add(a, sub));
        handlers.add(a, SubscriberId::new());
        handlers.add(b, SubscriberId::new());

        assert_eq!(handlers.clients(), vec![a, b]);
        handlers.remove_client(a);
        assert_eq!(handlers.clients(), vec![b]);
    }
}
