//! MessageClient - a document's connection to the broker.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──► Connecting ──connected──────────► Connected ──disconnect()──► Disconnected
//!                   │                                 ▲
//!                   ├──connect-refused──► Refused     │
//!                   │                                 │
//!                   └──discovery timeout──► Failed ───┘ (broker found late)
//! ```
//!
//! Operations wait for the handshake outcome, then fail immediately
//! with the refusal or discovery error until the client is connected.
//!
//! A dispatcher task reads the document inbox and routes broker events
//! to the local streams. A topic route is registered inactive before the
//! subscribe command is sent: the retained replay addressed to it gets
//! through, but broadcasts only reach it once the broker's acknowledgement
//! has activated it. A subscription therefore never sees a message both
//! as a broadcast and as its retained replay.

use super::stream::{IntentStream, ReceivedIntent, SubscriberCountStream, TopicSubscription};
use super::IntentSelector;
use crate::config::MessagingConfig;
use crate::transport::{DocumentEndpoint, DocumentReceiver, DocumentSender, TransportError};
use mfp_message::{
    reply_topic, validate_topic, BrokerEvent, ClientCommand, Envelope, Headers, IntentMessage,
    MessagingError, StatusReply, TopicMessage, REPLY_TO,
};
use mfp_types::{ClientId, SubscriberId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CHANGE_BUFFER_SIZE: usize = 16;

/// Timeouts of a [`MessageClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long to wait for the broker to answer the handshake.
    pub broker_discover_timeout: Duration,
    /// How long to wait for acknowledgements and replies.
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&MessagingConfig::default())
    }
}

impl ClientOptions {
    #[must_use]
    pub fn from_config(config: &MessagingConfig) -> Self {
        Self {
            broker_discover_timeout: config.broker_discover_timeout(),
            request_timeout: config.request_timeout(),
        }
    }

    #[must_use]
    pub fn with_discover_timeout(mut self, timeout: Duration) -> Self {
        self.broker_discover_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Connection state of a [`MessageClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Connected(ClientId),
    /// The broker refused the handshake.
    Refused(MessagingError),
    /// No broker answered in time.
    Failed(MessagingError),
    Disconnected,
}

#[derive(Default)]
struct Routes {
    topics: HashMap<String, Vec<(SubscriberId, mpsc::UnboundedSender<TopicMessage>)>>,
    /// Topic routes the broker has not acknowledged yet.
    inactive: HashSet<SubscriberId>,
    /// Subscribe acks by reply uid, activating their route.
    activations: HashMap<String, SubscriberId>,
    counts: HashMap<SubscriberId, mpsc::UnboundedSender<usize>>,
    intents: Vec<(
        SubscriberId,
        Option<IntentSelector>,
        mpsc::UnboundedSender<ReceivedIntent>,
    )>,
}

struct Inner {
    app: String,
    options: ClientOptions,
    sender: DocumentSender,
    connect_uid: String,
    state: watch::Sender<ClientState>,
    acks: Mutex<HashMap<String, oneshot::Sender<StatusReply>>>,
    routes: Mutex<Routes>,
    changes: broadcast::Sender<u64>,
}

/// Connection of one application instance to the broker.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct MessageClient {
    inner: Arc<Inner>,
}

impl MessageClient {
    /// Starts the handshake for `app` over `endpoint` and returns
    /// immediately.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(
        endpoint: DocumentEndpoint,
        app: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let (sender, receiver) = endpoint.split();
        let (state, _) = watch::channel(ClientState::Connecting);
        let (changes, _) = broadcast::channel(CHANGE_BUFFER_SIZE);
        let inner = Arc::new(Inner {
            app: app.into(),
            options,
            sender,
            connect_uid: Uuid::new_v4().to_string(),
            state,
            acks: Mutex::new(HashMap::new()),
            routes: Mutex::new(Routes::default()),
            changes,
        });

        tokio::spawn(dispatch(Arc::downgrade(&inner), receiver));
        tokio::spawn(discovery_timeout(Arc::downgrade(&inner)));

        let hello = Envelope::new(ClientCommand::Connect {
            app_symbolic_name: inner.app.clone(),
        })
        .with_reply_uid(inner.connect_uid.clone());
        if let Err(e) = inner.post(&hello) {
            warn!(app = %inner.app, error = %e, "Failed to send connect request");
        }
        debug!(app = %inner.app, document = %inner.sender.id(), "Connecting to message broker");

        Self { inner }
    }

    /// Symbolic name of the application this client connects as.
    #[must_use]
    pub fn app(&self) -> &str {
        &self.inner.app
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.inner.state.borrow().clone()
    }

    /// Client id assigned by the broker, once connected.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> {
        match &*self.inner.state.borrow() {
            ClientState::Connected(id) => Some(*id),
            _ => None,
        }
    }

    /// Waits for the handshake outcome.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::ConnectRefused`] if the broker refused the client
    /// - [`MessagingError::BrokerDiscoverTimeout`] if no broker answered
    /// - [`MessagingError::Disconnected`] after [`disconnect`](Self::disconnect)
    pub async fn connected(&self) -> Result<ClientId, MessagingError> {
        let mut state = self.inner.state.subscribe();
        loop {
            let outcome = match &*state.borrow_and_update() {
                ClientState::Connecting => None,
                ClientState::Connected(id) => Some(Ok(*id)),
                ClientState::Refused(e) | ClientState::Failed(e) => Some(Err(e.clone())),
                ClientState::Disconnected => Some(Err(disconnected())),
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
            if state.changed().await.is_err() {
                return Err(disconnected());
            }
        }
    }

    /// Publishes a topic message.
    ///
    /// # Errors
    ///
    /// Fails with the connection error, [`MessagingError::Malformed`]
    /// for a blank topic, or the error the broker answers with.
    pub async fn publish(&self, message: TopicMessage) -> Result<(), MessagingError> {
        validate_topic(&message.topic)?;
        self.send(ClientCommand::Publish { message }).await
    }

    /// Subscribes to `topic`. Dropping the subscription unsubscribes.
    ///
    /// # Errors
    ///
    /// Fails with the connection error or the broker's answer.
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
    ) -> Result<TopicSubscription, MessagingError> {
        let topic = topic.into();
        validate_topic(&topic)?;
        self.connected().await?;

        let subscriber = SubscriberId::new();
        let uid = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut routes = self.inner.routes.lock();
            routes
                .topics
                .entry(topic.clone())
                .or_default()
                .push((subscriber, tx));
            routes.inactive.insert(subscriber);
            routes.activations.insert(uid.clone(), subscriber);
        }
        let subscription = TopicSubscription::new(self.clone(), topic.clone(), subscriber, rx);

        let command = ClientCommand::Subscribe {
            topic,
            subscriber_id: subscriber,
        };
        if let Err(e) = self.send_with_uid(command, uid.clone()).await {
            self.inner.routes.lock().activations.remove(&uid);
            return Err(e);
        }
        Ok(subscription)
    }

    /// Sends `message` as a request and waits for the single reply.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::RequestReply`] if nobody is subscribed to the
    ///   topic; this fails without waiting for the timeout
    /// - [`MessagingError::Timeout`] if no reply arrives in time
    pub async fn request(&self, mut message: TopicMessage) -> Result<TopicMessage, MessagingError> {
        validate_topic(&message.topic)?;
        let mut replies = self.subscribe(reply_topic()).await?;
        message.headers.insert(REPLY_TO, replies.topic());
        self.send(ClientCommand::Publish { message }).await?;
        self.await_reply(&mut replies, "request").await
    }

    /// Streams subscriber counts of `topic`, starting with the current one.
    ///
    /// # Errors
    ///
    /// Fails with the connection error or the broker's answer.
    pub async fn subscriber_count(
        &self,
        topic: impl Into<String>,
    ) -> Result<SubscriberCountStream, MessagingError> {
        let topic = topic.into();
        validate_topic(&topic)?;
        self.connected().await?;

        let subscriber = SubscriberId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.routes.lock().counts.insert(subscriber, tx);
        let stream = SubscriberCountStream::new(self.clone(), topic.clone(), subscriber, rx);

        self.send(ClientCommand::ObserveSubscriberCount {
            topic,
            subscriber_id: subscriber,
        })
        .await?;
        Ok(stream)
    }

    /// Issues an intent to the applications providing a matching capability.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::NotQualified`] if the application has not
    ///   declared a matching intention
    /// - [`MessagingError::NullProvider`] if no capability matches
    pub async fn issue_intent(&self, message: IntentMessage) -> Result<(), MessagingError> {
        self.send(ClientCommand::IssueIntent { message }).await
    }

    /// Issues an intent as a request and waits for the single reply.
    ///
    /// # Errors
    ///
    /// Like [`issue_intent`](Self::issue_intent); additionally
    /// [`MessagingError::RequestReply`] if no provider is running and
    /// [`MessagingError::Timeout`] if no reply arrives in time.
    pub async fn request_by_intent(
        &self,
        mut message: IntentMessage,
    ) -> Result<TopicMessage, MessagingError> {
        let mut replies = self.subscribe(reply_topic()).await?;
        message.headers.insert(REPLY_TO, replies.topic());
        self.send(ClientCommand::IssueIntent { message }).await?;
        self.await_reply(&mut replies, "intent request").await
    }

    /// Receives intents for the capabilities of this application,
    /// optionally narrowed by a local selector.
    ///
    /// # Errors
    ///
    /// Fails with the connection error.
    pub async fn handle_intents(
        &self,
        selector: Option<IntentSelector>,
    ) -> Result<IntentStream, MessagingError> {
        self.connected().await?;

        let subscriber = SubscriberId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .routes
            .lock()
            .intents
            .push((subscriber, selector, tx));
        let stream = IntentStream::new(self.clone(), subscriber, rx);

        self.send(ClientCommand::HandleIntents {
            subscriber_id: subscriber,
        })
        .await?;
        Ok(stream)
    }

    /// Replies to a received request.
    ///
    /// # Errors
    ///
    /// [`MessagingError::RequestReply`] if the message was not sent as a
    /// request or the requester no longer waits.
    pub async fn reply(
        &self,
        request: &Headers,
        body: impl Into<Value>,
    ) -> Result<(), MessagingError> {
        let Some(reply_to) = request.reply_to() else {
            return Err(MessagingError::RequestReply(
                "The message has no reply address".into(),
            ));
        };
        self.publish(TopicMessage::new(reply_to).with_body(body)).await
    }

    /// Capability change notifications, carrying the registry revision.
    #[must_use]
    pub fn capability_changes(&self) -> broadcast::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Disconnects from the broker. Later operations fail with
    /// [`MessagingError::Disconnected`].
    ///
    /// # Errors
    ///
    /// Fails if the client never connected.
    pub async fn disconnect(&self) -> Result<(), MessagingError> {
        let result = self.send(ClientCommand::Disconnect).await;
        self.inner.shut_down();
        info!(app = %self.inner.app, "Client disconnected");
        result
    }

    async fn await_reply(
        &self,
        replies: &mut TopicSubscription,
        operation: &str,
    ) -> Result<TopicMessage, MessagingError> {
        let timeout = self.inner.options.request_timeout;
        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(disconnected()),
            Err(_) => Err(MessagingError::timeout(operation, millis(timeout))),
        }
    }

    /// Sends `command` and waits for the broker's acknowledgement.
    async fn send(&self, command: ClientCommand) -> Result<(), MessagingError> {
        self.send_with_uid(command, Uuid::new_v4().to_string()).await
    }

    async fn send_with_uid(
        &self,
        command: ClientCommand,
        uid: String,
    ) -> Result<(), MessagingError> {
        let client = self.connected().await?;
        let name = command.name();
        let (tx, rx) = oneshot::channel();
        self.inner.acks.lock().insert(uid.clone(), tx);

        let envelope = Envelope::new(command)
            .from_client(client)
            .with_reply_uid(uid.clone());
        if let Err(e) = self.inner.post(&envelope) {
            self.inner.acks.lock().remove(&uid);
            return Err(e);
        }

        let timeout = self.inner.options.request_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(status)) => status.into_result(),
            Ok(Err(_)) => Err(disconnected()),
            Err(_) => {
                self.inner.acks.lock().remove(&uid);
                Err(MessagingError::timeout(name, millis(timeout)))
            }
        }
    }

    /// Sends `command` without waiting; used from `Drop`.
    pub(super) fn send_detached(&self, command: ClientCommand) {
        let Some(client) = self.client_id() else {
            return;
        };
        let envelope = Envelope::new(command).from_client(client);
        if let Err(e) = self.inner.post(&envelope) {
            debug!(app = %self.inner.app, error = %e, "Failed to send detached command");
        }
    }

    pub(super) fn remove_topic_route(&self, topic: &str, subscriber: SubscriberId) {
        let mut routes = self.inner.routes.lock();
        if let Some(entries) = routes.topics.get_mut(topic) {
            entries.retain(|(id, _)| *id != subscriber);
            if entries.is_empty() {
                routes.topics.remove(topic);
            }
        }
        routes.inactive.remove(&subscriber);
    }

    pub(super) fn remove_count_route(&self, subscriber: SubscriberId) {
        self.inner.routes.lock().counts.remove(&subscriber);
    }

    pub(super) fn remove_intent_route(&self, subscriber: SubscriberId) {
        self.inner
            .routes
            .lock()
            .intents
            .retain(|(id, _, _)| *id != subscriber);
    }
}

impl std::fmt::Debug for MessageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageClient")
            .field("app", &self.inner.app)
            .field("document", &self.inner.sender.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn post(&self, envelope: &Envelope<ClientCommand>) -> Result<(), MessagingError> {
        let data = serde_json::to_value(envelope)
            .map_err(|e| {
                MessagingError::Malformed(TransportError::Encode(e.to_string()).to_string())
            })?;
        self.sender
            .post(data)
            .map_err(|e| MessagingError::Disconnected(e.to_string()))
    }

    fn on_event(&self, envelope: Envelope<BrokerEvent>) {
        if let (Some(recipient), Some(me)) = (envelope.recipient, self.current_id()) {
            if recipient != me {
                return;
            }
        }

        match envelope.message {
            BrokerEvent::Connected { client_id } => {
                if envelope.reply_to_uid.as_deref() != Some(self.connect_uid.as_str()) {
                    return;
                }
                let connected = self.state.send_if_modified(|state| match state {
                    ClientState::Connecting | ClientState::Failed(_) => {
                        *state = ClientState::Connected(client_id);
                        true
                    }
                    _ => false,
                });
                if connected {
                    info!(app = %self.app, client = %client_id, "Connected to message broker");
                }
            }
            BrokerEvent::ConnectRefused { code, message } => {
                if envelope.reply_to_uid.as_deref() != Some(self.connect_uid.as_str()) {
                    return;
                }
                let err = MessagingError::ConnectRefused { code, message };
                warn!(app = %self.app, "{err}");
                self.state.send_if_modified(|state| match state {
                    ClientState::Connecting | ClientState::Failed(_) => {
                        *state = ClientState::Refused(err);
                        true
                    }
                    _ => false,
                });
            }
            BrokerEvent::Status(status) => {
                let Some(uid) = envelope.reply_to_uid else {
                    return;
                };
                {
                    let mut routes = self.routes.lock();
                    if let Some(subscriber) = routes.activations.remove(&uid) {
                        if status.is_ok() {
                            routes.inactive.remove(&subscriber);
                        }
                    }
                }
                if let Some(ack) = self.acks.lock().remove(&uid) {
                    // The caller may have timed out
                    let _ = ack.send(status);
                }
            }
            BrokerEvent::TopicMessage {
                message,
                subscriber_id,
            } => self.route_topic_message(message, subscriber_id),
            BrokerEvent::IntentMessage {
                message,
                capability,
            } => {
                let mut routes = self.routes.lock();
                routes.intents.retain(|(_, selector, tx)| {
                    if selector.as_ref().is_some_and(|s| !s.accepts(&message.intent)) {
                        return !tx.is_closed();
                    }
                    tx.send(ReceivedIntent {
                        message: message.clone(),
                        capability: capability.clone(),
                    })
                    .is_ok()
                });
            }
            BrokerEvent::SubscriberCount {
                subscriber_id,
                count,
                ..
            } => {
                let mut routes = self.routes.lock();
                if let Some(tx) = routes.counts.get(&subscriber_id) {
                    if tx.send(count).is_err() {
                        routes.counts.remove(&subscriber_id);
                    }
                }
            }
            BrokerEvent::CapabilityChange { revision } => {
                // No watcher is fine
                let _ = self.changes.send(revision);
            }
        }
    }

    fn route_topic_message(&self, message: TopicMessage, subscriber: Option<SubscriberId>) {
        let mut guard = self.routes.lock();
        let routes = &mut *guard;
        let Some(entries) = routes.topics.get_mut(&message.topic) else {
            debug!(app = %self.app, topic = %message.topic, "No local subscription for topic message");
            return;
        };
        let inactive = &routes.inactive;
        entries.retain(|(id, tx)| {
            let addressed = match subscriber {
                Some(target) => target == *id,
                None => !inactive.contains(id),
            };
            if !addressed {
                return !tx.is_closed();
            }
            tx.send(message.clone()).is_ok()
        });
        if entries.is_empty() {
            routes.topics.remove(&message.topic);
        }
    }

    fn current_id(&self) -> Option<ClientId> {
        match &*self.state.borrow() {
            ClientState::Connected(id) => Some(*id),
            _ => None,
        }
    }

    /// Marks the client disconnected and ends every stream and pending ack.
    fn shut_down(&self) {
        self.state.send_replace(ClientState::Disconnected);
        self.acks.lock().clear();
        let mut routes = self.routes.lock();
        routes.topics.clear();
        routes.inactive.clear();
        routes.activations.clear();
        routes.counts.clear();
        routes.intents.clear();
    }
}

async fn dispatch(inner: Weak<Inner>, mut receiver: DocumentReceiver) {
    while let Some(data) = receiver.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match serde_json::from_value::<Envelope<BrokerEvent>>(data) {
            Ok(envelope) => inner.on_event(envelope),
            Err(e) => warn!(app = %inner.app, error = %e, "[MalformedMessageError] Dropping undecodable broker message"),
        }
    }
    if let Some(inner) = inner.upgrade() {
        debug!(app = %inner.app, "Document inbox closed");
        inner.shut_down();
    }
}

async fn discovery_timeout(inner: Weak<Inner>) {
    let Some(timeout) = inner.upgrade().map(|i| i.options.broker_discover_timeout) else {
        return;
    };
    tokio::time::sleep(timeout).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let err = MessagingError::BrokerDiscoverTimeout {
        timeout_ms: millis(timeout),
    };
    let failed = inner.state.send_if_modified(|state| {
        if *state == ClientState::Connecting {
            *state = ClientState::Failed(err.clone());
            return true;
        }
        false
    });
    if failed {
        error!(app = %inner.app, "{err}");
    }
}

fn disconnected() -> MessagingError {
    MessagingError::Disconnected("The client is not connected to the message broker".into())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
