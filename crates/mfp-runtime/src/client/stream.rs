//! Cancelable client streams.
//!
//! Every stream unregisters itself from the broker when dropped.

use super::MessageClient;
use mfp_message::{Capability, ClientCommand, Intent, IntentMessage, TopicMessage};
use mfp_types::{matches, Qualifier, SubscriberId};
use tokio::sync::mpsc;

/// Messages published to a topic.
pub struct TopicSubscription {
    client: MessageClient,
    topic: String,
    subscriber: SubscriberId,
    rx: mpsc::UnboundedReceiver<TopicMessage>,
}

impl TopicSubscription {
    pub(super) fn new(
        client: MessageClient,
        topic: String,
        subscriber: SubscriberId,
        rx: mpsc::UnboundedReceiver<TopicMessage>,
    ) -> Self {
        Self {
            client,
            topic,
            subscriber,
            rx,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message; `None` once the client is disconnected.
    pub async fn recv(&mut self) -> Option<TopicMessage> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<TopicMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for TopicSubscription {
    fn drop(&mut self) {
        self.client.remove_topic_route(&self.topic, self.subscriber);
        self.client.send_detached(ClientCommand::Unsubscribe {
            topic: self.topic.clone(),
            subscriber_id: self.subscriber,
        });
    }
}

/// Subscriber counts of a topic.
pub struct SubscriberCountStream {
    client: MessageClient,
    topic: String,
    subscriber: SubscriberId,
    rx: mpsc::UnboundedReceiver<usize>,
}

impl SubscriberCountStream {
    pub(super) fn new(
        client: MessageClient,
        topic: String,
        subscriber: SubscriberId,
        rx: mpsc::UnboundedReceiver<usize>,
    ) -> Self {
        Self {
            client,
            topic,
            subscriber,
            rx,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<usize> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<usize> {
        self.rx.try_recv().ok()
    }
}

impl Drop for SubscriberCountStream {
    fn drop(&mut self) {
        self.client.remove_count_route(self.subscriber);
        self.client
            .send_detached(ClientCommand::UnobserveSubscriberCount {
                topic: self.topic.clone(),
                subscriber_id: self.subscriber,
            });
    }
}

/// An intent delivered to a handler, with the capability it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedIntent {
    pub message: IntentMessage,
    pub capability: Option<Capability>,
}

/// Local filter of an intent handler.
///
/// The broker already routes only intents matching this application's
/// capabilities; the selector narrows them further, e.g. to one
/// capability type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntentSelector {
    pub kind: Option<String>,
    pub qualifier: Option<Qualifier>,
}

impl IntentSelector {
    #[must_use]
    pub fn of_type(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            qualifier: None,
        }
    }

    #[must_use]
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    #[must_use]
    pub fn accepts(&self, intent: &Intent) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == intent.kind)
            && self
                .qualifier
                .as_ref()
                .map_or(true, |pattern| matches(pattern, &intent.qualifier))
    }
}

/// Intents routed to this client.
pub struct IntentStream {
    client: MessageClient,
    subscriber: SubscriberId,
    rx: mpsc::UnboundedReceiver<ReceivedIntent>,
}

impl IntentStream {
    pub(super) fn new(
        client: MessageClient,
        subscriber: SubscriberId,
        rx: mpsc::UnboundedReceiver<ReceivedIntent>,
    ) -> Self {
        Self {
            client,
            subscriber,
            rx,
        }
    }

    pub async fn recv(&mut self) -> Option<ReceivedIntent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ReceivedIntent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for IntentStream {
    fn drop(&mut self) {
        self.client.remove_intent_route(self.subscriber);
        self.client.send_detached(ClientCommand::UnhandleIntents {
            subscriber_id: self.subscriber,
        });
    }
}
