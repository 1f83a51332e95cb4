//! MessageBroker - the routing core.
//!
//! The broker is a plain state machine: it consumes one
//! [`TransportEvent`] at a time and returns the envelopes to post. It
//! owns every piece of routing state, so each inbound message is
//! applied atomically with respect to all others.
//!
//! # Inbound Flow
//!
//! ```text
//! TransportEvent::Message
//!     │
//!     ├─ decode Envelope<ClientCommand> ── fails ──► log, drop
//!     │
//!     ├─ connect ──► app registered? ── no ──► connect-refused (refused:rejected)
//!     │              origin matches? ── no ──► log, drop (refused:blocked)
//!     │              └─► session, connected
//!     │
//!     └─ other ──► verified session? ── no ──► log, drop
//!                  └─► dispatch ──► status ack (when replyToUid is set)
//! ```
//!
//! # Request/Reply
//!
//! A requester subscribes to a fresh `:reply:` topic, then publishes
//! with the `ReplyTo` header pointing at it. The request fails fast
//! with `RequestReplyError` if nobody is subscribed to the destination.
//! The first message published to the reply topic is the reply; it
//! consumes the pending entry and the requester's reply subscription.
//!
//! # Partitions
//!
//! Intents issued by the platform application reach only platform
//! capabilities, intents of regular applications only regular ones.

use super::manifest_commands;
use super::pending::PendingRequests;
use super::retained::RetainedStore;
use super::session::{ClientSession, SessionTable};
use super::subscriptions::{IntentHandlers, SubscriptionTable};
use crate::registry::{ManifestRegistry, RegistryError};
use crate::transport::TransportEvent;
use mfp_message::{
    is_reply_topic, validate_topic, Application, BrokerEvent, Capability, CapabilityDescriptor,
    ClientCommand, ConnectRefusal, Envelope, Headers, IntentMessage, IntentionDescriptor,
    ManifestCommand, MessagingError, StatusReply, TopicMessage, APP_SYMBOLIC_NAME,
    MANIFEST_REGISTRY_TYPE,
};
use mfp_types::{CapabilityId, ClientId, DocumentId, IntentionId, Qualifier, SubscriberId};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// An envelope addressed to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: DocumentId,
    pub envelope: Envelope<BrokerEvent>,
}

/// Routing core of the messaging platform.
pub struct MessageBroker {
    registry: ManifestRegistry,
    platform_app: String,
    sessions: SessionTable,
    subscriptions: SubscriptionTable,
    observers: SubscriptionTable,
    handlers: IntentHandlers,
    retained: RetainedStore,
    pending: PendingRequests,
    outbox: Vec<Outbound>,
}

impl MessageBroker {
    /// Creates a broker over `registry`.
    ///
    /// `platform_app` is the symbolic name of the built-in platform
    /// application; it forms its own intent partition.
    pub fn new(registry: ManifestRegistry, platform_app: impl Into<String>) -> Self {
        Self {
            registry,
            platform_app: platform_app.into(),
            sessions: SessionTable::new(),
            subscriptions: SubscriptionTable::new(),
            observers: SubscriptionTable::new(),
            handlers: IntentHandlers::new(),
            retained: RetainedStore::new(),
            pending: PendingRequests::new(),
            outbox: Vec::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }

    #[must_use]
    pub fn platform_app(&self) -> &str {
        &self.platform_app
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions.count(topic)
    }

    /// Applies one transport event and returns the envelopes to post.
    pub fn handle(&mut self, event: TransportEvent) -> Vec<Outbound> {
        match event {
            TransportEvent::Message {
                source,
                origin,
                data,
            } => self.on_message(source, &origin, data),
            TransportEvent::Unloaded { source } => {
                for client in self.sessions.by_document(source) {
                    self.drop_client(client, "document unloaded");
                }
            }
        }
        self.drain()
    }

    /// Takes the envelopes produced since the last drain.
    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    // === Control API ===

    /// Registers capabilities for `app` and notifies connected clients.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapabilityRegistration`] if the
    /// registration is rejected.
    pub fn register_capability(
        &mut self,
        app: &str,
        capabilities: Vec<CapabilityDescriptor>,
    ) -> Result<Vec<CapabilityId>, RegistryError> {
        let revision = self.registry.revision();
        let ids = self.registry.register_capability(app, capabilities)?;
        self.announce_changes(revision);
        Ok(ids)
    }

    /// Removes capabilities of `app`; see
    /// [`ManifestRegistry::unregister_capability`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapabilityRegistration`] if the
    /// application is unknown.
    pub fn unregister_capability(
        &mut self,
        app: &str,
        kind: &str,
        qualifier: &Qualifier,
    ) -> Result<usize, RegistryError> {
        let revision = self.registry.revision();
        let removed = self.registry.unregister_capability(app, kind, qualifier)?;
        self.announce_changes(revision);
        Ok(removed)
    }

    /// Registers intentions for `app` at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IntentionRegistration`] if the
    /// application may not register intentions.
    pub fn register_intention(
        &mut self,
        app: &str,
        intentions: Vec<IntentionDescriptor>,
    ) -> Result<Vec<IntentionId>, RegistryError> {
        let revision = self.registry.revision();
        let ids = self.registry.register_intention(app, intentions)?;
        self.announce_changes(revision);
        Ok(ids)
    }

    /// Removes intentions of `app`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IntentionRegistration`] if the
    /// application may not register intentions.
    pub fn unregister_intention(
        &mut self,
        app: &str,
        kind: &str,
        qualifier: &Qualifier,
    ) -> Result<usize, RegistryError> {
        let revision = self.registry.revision();
        let removed = self.registry.unregister_intention(app, kind, qualifier)?;
        self.announce_changes(revision);
        Ok(removed)
    }

    /// Registered applications.
    #[must_use]
    pub fn applications(&self) -> Vec<Application> {
        self.registry.applications().get_applications().to_vec()
    }

    // === Inbound ===

    fn on_message(&mut self, source: DocumentId, origin: &str, data: Value) {
        let envelope: Envelope<ClientCommand> = match serde_json::from_value(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(document = %source, origin, error = %e, "[MalformedMessageError] Dropping undecodable message");
                return;
            }
        };
        if !envelope.is_consistent() {
            warn!(
                document = %source,
                channel = %envelope.channel,
                command = envelope.message.name(),
                "[MalformedMessageError] Dropping message sent on the wrong channel"
            );
            return;
        }

        let uid = envelope.reply_to_uid;
        let command = match envelope.message {
            ClientCommand::Connect { app_symbolic_name } => {
                self.connect(source, origin, &app_symbolic_name, uid);
                return;
            }
            command => command,
        };

        let Some(session) = envelope
            .sender
            .and_then(|sender| self.sessions.verify(sender, source, origin))
            .cloned()
        else {
            warn!(
                document = %source,
                origin,
                sender = ?envelope.sender.map(|s| s.to_string()),
                command = command.name(),
                "Dropping message of a client that is not connected"
            );
            return;
        };

        let name = command.name();
        let result = self.dispatch(&session, command);
        match (result, uid) {
            (result, Some(uid)) => {
                if let Err(e) = &result {
                    debug!(client = %session.id, command = name, error = %e, "Command failed");
                }
                self.emit(
                    session.document,
                    Envelope::new(BrokerEvent::Status(StatusReply::from(result)))
                        .to_client(session.id)
                        .with_reply_uid(uid),
                );
            }
            (Err(e), None) => {
                warn!(client = %session.id, app = %session.app, command = name, "{e}");
            }
            (Ok(()), None) => {}
        }
    }

    fn connect(&mut self, document: DocumentId, origin: &str, app: &str, uid: Option<String>) {
        let Some(application) = self.registry.applications().get_application(app) else {
            warn!(
                app,
                origin,
                document = %document,
                "[MessageClientConnectError] Client connect attempt rejected: unknown application ({})",
                ConnectRefusal::Rejected
            );
            let mut envelope = Envelope::new(BrokerEvent::ConnectRefused {
                code: ConnectRefusal::Rejected,
                message: format!("Application '{app}' is not registered"),
            });
            envelope.reply_to_uid = uid;
            self.emit(document, envelope);
            return;
        };

        if application.origin != origin {
            error!(
                app,
                origin,
                expected = %application.origin,
                document = %document,
                "[MessageClientConnectError] Client connect attempt blocked: origin does not match the application origin ({})",
                ConnectRefusal::Blocked
            );
            return;
        }

        let session = ClientSession::new(document, app, origin);
        let client = session.id;
        self.sessions.insert(session);
        info!(client = %client, app, document = %document, "Client connected");

        let mut envelope =
            Envelope::new(BrokerEvent::Connected { client_id: client }).to_client(client);
        envelope.reply_to_uid = uid;
        self.emit(document, envelope);
    }

    fn dispatch(
        &mut self,
        session: &ClientSession,
        command: ClientCommand,
    ) -> Result<(), MessagingError> {
        match command {
            ClientCommand::Connect { .. } => Err(MessagingError::Malformed(
                "Client is already connected".into(),
            )),
            ClientCommand::Disconnect => {
                self.drop_client(session.id, "disconnected");
                Ok(())
            }
            ClientCommand::Publish { message } => self.publish(session, message),
            ClientCommand::Subscribe {
                topic,
                subscriber_id,
            } => self.subscribe(session, &topic, subscriber_id),
            ClientCommand::Unsubscribe {
                topic,
                subscriber_id,
            } => {
                self.unsubscribe(session, &topic, subscriber_id);
                Ok(())
            }
            ClientCommand::ObserveSubscriberCount {
                topic,
                subscriber_id,
            } => self.observe(session, &topic, subscriber_id),
            ClientCommand::UnobserveSubscriberCount {
                topic,
                subscriber_id,
            } => {
                self.observers.remove(&topic, session.id, subscriber_id);
                Ok(())
            }
            ClientCommand::IssueIntent { message } => self.issue_intent(session, message),
            ClientCommand::HandleIntents { subscriber_id } => {
                self.handlers.add(session.id, subscriber_id);
                debug!(client = %session.id, app = %session.app, "Handling intents");
                Ok(())
            }
            ClientCommand::UnhandleIntents { subscriber_id } => {
                self.handlers.remove(session.id, subscriber_id);
                Ok(())
            }
        }
    }

    // === Topics ===

    fn publish(
        &mut self,
        session: &ClientSession,
        mut message: TopicMessage,
    ) -> Result<(), MessagingError> {
        validate_topic(&message.topic)?;
        message.headers.stamp_sender(session.id, &session.app);

        if is_reply_topic(&message.topic) {
            return self.deliver_reply(message);
        }

        if let Some(reply_to) = message.headers.reply_to() {
            self.check_reply_address(reply_to, session.id)?;
            if self.subscriptions.count(&message.topic) == 0 {
                return Err(MessagingError::RequestReply(format!(
                    "No client is currently running which could answer the request on topic '{}'",
                    message.topic
                )));
            }
        }

        if message.retain {
            if message.is_empty() {
                if self.retained.clear(&message.topic) {
                    debug!(topic = %message.topic, "Cleared retained message");
                }
                return Ok(());
            }
            self.retained.store(&message);
        }

        let clients = self.subscriptions.clients(&message.topic);
        debug!(
            topic = %message.topic,
            client = %session.id,
            recipients = clients.len(),
            "Dispatching topic message"
        );
        for client in clients {
            self.emit_to_client(
                client,
                BrokerEvent::TopicMessage {
                    message: message.clone(),
                    subscriber_id: None,
                },
            );
        }
        Ok(())
    }

    /// Delivers a reply and consumes its pending request.
    fn deliver_reply(&mut self, mut reply: TopicMessage) -> Result<(), MessagingError> {
        let Some(requester) = self.pending.take(&reply.topic) else {
            return Err(MessagingError::RequestReply(format!(
                "No request is awaiting a reply on topic '{}'",
                reply.topic
            )));
        };
        reply.retain = false;
        let topic = reply.topic.clone();
        debug!(topic = %topic, requester = %requester, "Delivering reply");

        self.emit_to_client(
            requester,
            BrokerEvent::TopicMessage {
                message: reply,
                subscriber_id: None,
            },
        );
        if self.subscriptions.remove_topic(&topic) > 0 {
            self.notify_count(&topic);
        }
        Ok(())
    }

    fn check_reply_address(
        &self,
        reply_to: &str,
        requester: ClientId,
    ) -> Result<(), MessagingError> {
        if is_reply_topic(reply_to) && self.pending.is_pending_for(reply_to, requester) {
            return Ok(());
        }
        Err(MessagingError::RequestReply(format!(
            "Invalid reply address '{reply_to}': subscribe to a fresh reply topic before sending the request"
        )))
    }

    fn subscribe(
        &mut self,
        session: &ClientSession,
        topic: &str,
        subscriber: SubscriberId,
    ) -> Result<(), MessagingError> {
        validate_topic(topic)?;
        let reply = is_reply_topic(topic);
        if reply && !self.pending.register(topic, session.id) {
            return Err(MessagingError::RequestReply(format!(
                "Reply topic '{topic}' belongs to another client"
            )));
        }
        if !self.subscriptions.add(topic, session.id, subscriber) {
            return Ok(());
        }
        debug!(topic, client = %session.id, subscriber = %subscriber, "Subscribed");

        if !reply {
            if let Some(retained) = self.retained.get(topic).cloned() {
                self.emit_to_client(
                    session.id,
                    BrokerEvent::TopicMessage {
                        message: retained,
                        subscriber_id: Some(subscriber),
                    },
                );
            }
        }
        self.notify_count(topic);
        Ok(())
    }

    fn unsubscribe(&mut self, session: &ClientSession, topic: &str, subscriber: SubscriberId) {
        if !self.subscriptions.remove(topic, session.id, subscriber) {
            return;
        }
        debug!(topic, client = %session.id, subscriber = %subscriber, "Unsubscribed");
        if is_reply_topic(topic) && !self.subscriptions.has_client(topic, session.id) {
            self.pending.remove_if_owner(topic, session.id);
        }
        self.notify_count(topic);
    }

    fn observe(
        &mut self,
        session: &ClientSession,
        topic: &str,
        subscriber: SubscriberId,
    ) -> Result<(), MessagingError> {
        validate_topic(topic)?;
        if self.observers.add(topic, session.id, subscriber) {
            let count = self.subscriptions.count(topic);
            self.emit_to_client(
                session.id,
                BrokerEvent::SubscriberCount {
                    topic: topic.to_string(),
                    subscriber_id: subscriber,
                    count,
                },
            );
        }
        Ok(())
    }

    fn notify_count(&mut self, topic: &str) {
        let count = self.subscriptions.count(topic);
        let observers: Vec<(ClientId, SubscriberId)> = self
            .observers
            .entries(topic)
            .iter()
            .map(|o| (o.client, o.subscriber))
            .collect();
        for (client, subscriber) in observers {
            self.emit_to_client(
                client,
                BrokerEvent::SubscriberCount {
                    topic: topic.to_string(),
                    subscriber_id: subscriber,
                    count,
                },
            );
        }
    }

    // === Intents ===

    fn issue_intent(
        &mut self,
        session: &ClientSession,
        mut message: IntentMessage,
    ) -> Result<(), MessagingError> {
        if message.intent.kind.trim().is_empty() {
            return Err(MessagingError::Malformed(
                "Missing intent type: the intent must have a type".into(),
            ));
        }
        message.headers.stamp_sender(session.id, &session.app);

        if message.intent.kind == MANIFEST_REGISTRY_TYPE {
            return self.handle_manifest_command(session, message);
        }

        let app = session.app.as_str();
        let intent = &message.intent;
        let platform_side = app == self.platform_app;
        let providers: Vec<Capability> = self
            .registry
            .find_providers(app, &intent.kind, &intent.qualifier)
            .into_iter()
            .filter(|c| (c.app() == self.platform_app) == platform_side)
            .cloned()
            .collect();

        // Without intention checks the issuer may intend whatever its own
        // partition provides, and nothing beyond it.
        let qualified = if self.registry.applications().is_intention_check_disabled(app) {
            !providers.is_empty()
        } else {
            self.registry.has_intent(app, &intent.kind, &intent.qualifier)
        };
        if !qualified {
            let err = MessagingError::NotQualified(format!(
                "Application '{app}' is not qualified to publish intents of the type '{}' and qualifier '{}'. Ensure to have listed the intention in the application manifest.",
                intent.kind, intent.qualifier
            ));
            warn!(client = %session.id, app, "{err}");
            return Err(err);
        }

        if providers.is_empty() {
            return Err(MessagingError::NullProvider(format!(
                "No application found to provide a capability of the type '{}' and qualifier '{}'. Maybe, the capability is not public API or the providing application is not available.",
                intent.kind, intent.qualifier
            )));
        }

        let request = message.headers.reply_to().map(str::to_string);
        if let Some(reply_to) = &request {
            self.check_reply_address(reply_to, session.id)?;
        }

        let mut targets: Vec<(ClientId, Capability)> = Vec::new();
        for client in self.handlers.clients() {
            let Some(handler) = self.sessions.get(client) else {
                continue;
            };
            if let Some(capability) = providers.iter().find(|c| c.app() == handler.app) {
                targets.push((client, capability.clone()));
            }
        }

        if targets.is_empty() {
            if request.is_some() {
                return Err(MessagingError::RequestReply(format!(
                    "No client is currently running which could answer the intent '{}'",
                    message.intent
                )));
            }
            debug!(intent = %message.intent, "No running handler for intent");
            return Ok(());
        }

        debug!(intent = %message.intent, client = %session.id, recipients = targets.len(), "Dispatching intent");
        for (client, capability) in targets {
            self.emit_to_client(
                client,
                BrokerEvent::IntentMessage {
                    message: message.clone(),
                    capability: Some(capability),
                },
            );
        }
        Ok(())
    }

    /// Answers a `manifest-registry` intent.
    ///
    /// The reply is published as a platform message on the request's
    /// reply topic; without a reply address the command runs silently.
    fn handle_manifest_command(
        &mut self,
        session: &ClientSession,
        message: IntentMessage,
    ) -> Result<(), MessagingError> {
        let reply_to = message.headers.reply_to().map(str::to_string);
        if let Some(reply_to) = &reply_to {
            self.check_reply_address(reply_to, session.id)?;
        }

        let revision = self.registry.revision();
        let body = match ManifestCommand::from_body(message.body.as_ref()) {
            Ok(command) => manifest_commands::execute(&mut self.registry, &session.app, command),
            Err(e) => {
                warn!(client = %session.id, app = %session.app, "{e}");
                serde_json::to_value(StatusReply::error(&e)).unwrap_or(Value::Null)
            }
        };
        self.announce_changes(revision);

        let Some(reply_to) = reply_to else {
            return Ok(());
        };
        let reply = TopicMessage::new(reply_to)
            .with_body(body)
            .with_headers(Headers::new().with(APP_SYMBOLIC_NAME, self.platform_app.clone()));
        self.deliver_reply(reply)
    }

    // === Lifecycle ===

    /// Removes a client with all its subscriptions, observers, intent
    /// handlers and pending requests in one step.
    fn drop_client(&mut self, client: ClientId, reason: &str) {
        let Some(session) = self.sessions.remove(client) else {
            return;
        };
        let topics = self.subscriptions.remove_client(client);
        self.observers.remove_client(client);
        self.handlers.remove_client(client);
        self.pending.remove_client(client);
        info!(
            client = %client,
            app = %session.app,
            topics = topics.len(),
            reason,
            "Client disconnected"
        );
        for topic in topics {
            self.notify_count(&topic);
        }
    }

    fn announce_changes(&mut self, revision_before: u64) {
        let revision = self.registry.revision();
        if revision == revision_before {
            return;
        }
        let clients: Vec<ClientId> = self.sessions.iter().map(|s| s.id).collect();
        for client in clients {
            self.emit_to_client(client, BrokerEvent::CapabilityChange { revision });
        }
    }

    // === Outbound ===

    fn emit_to_client(&mut self, client: ClientId, event: BrokerEvent) {
        let Some(document) = self.sessions.get(client).map(|s| s.document) else {
            return;
        };
        self.emit(document, Envelope::new(event).to_client(client));
    }

    fn emit(&mut self, target: DocumentId, envelope: Envelope<BrokerEvent>) {
        self.outbox.push(Outbound { target, envelope });
    }
}
