//! Wire envelopes exchanged between client documents and the broker.
//!
//! # Wire Shape
//!
//! ```text
//! {
//!   "channel": "topic" | "intent" | "host",
//!   "message": { "type": "<kebab-case>", ... },
//!   "sender": "<client uuid>",        client → broker, after connect
//!   "recipient": "<client uuid>",     broker → client
//!   "replyToUid": "<correlation id>"  acknowledged commands
//! }
//! ```
//!
//! Client documents send [`ClientCommand`]s; the broker answers with
//! [`BrokerEvent`]s. A command carrying `replyToUid` is acknowledged
//! with a [`BrokerEvent::Status`] (or the connect outcome) under the
//! same id.

use crate::error::MessagingError;
use crate::manifest::Capability;
use crate::message::{IntentMessage, TopicMessage};
use mfp_types::{ClientId, ErrorCode, SubscriberId};
use serde::{Deserialize, Serialize};

/// Logical channel of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Topic publish/subscribe.
    Topic,
    /// Intent routing.
    Intent,
    /// Connection management and platform notifications.
    Host,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic => write!(f, "topic"),
            Self::Intent => write!(f, "intent"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Messages that know which channel they travel on.
pub trait Routed {
    fn channel(&self) -> Channel;
}

/// Commands sent by a client document to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    Connect { app_symbolic_name: String },
    Disconnect,
    Publish { message: TopicMessage },
    Subscribe {
        topic: String,
        subscriber_id: SubscriberId,
    },
    Unsubscribe {
        topic: String,
        subscriber_id: SubscriberId,
    },
    ObserveSubscriberCount {
        topic: String,
        subscriber_id: SubscriberId,
    },
    UnobserveSubscriberCount {
        topic: String,
        subscriber_id: SubscriberId,
    },
    IssueIntent { message: IntentMessage },
    HandleIntents { subscriber_id: SubscriberId },
    UnhandleIntents { subscriber_id: SubscriberId },
}

impl ClientCommand {
    /// Wire name of the command, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect => "disconnect",
            Self::Publish { .. } => "publish",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::ObserveSubscriberCount { .. } => "observe-subscriber-count",
            Self::UnobserveSubscriberCount { .. } => "unobserve-subscriber-count",
            Self::IssueIntent { .. } => "issue-intent",
            Self::HandleIntents { .. } => "handle-intents",
            Self::UnhandleIntents { .. } => "unhandle-intents",
        }
    }
}

impl Routed for ClientCommand {
    fn channel(&self) -> Channel {
        match self {
            Self::Connect { .. } | Self::Disconnect => Channel::Host,
            Self::IssueIntent { .. }
            | Self::HandleIntents { .. }
            | Self::UnhandleIntents { .. } => {
                Channel::Intent
            }
            Self::Publish { .. }
            | Self::Subscribe { .. }
            | Self::Unsubscribe { .. }
            | Self::ObserveSubscriberCount { .. }
            | Self::UnobserveSubscriberCount { .. } => Channel::Topic,
        }
    }
}

/// Events sent by the broker to a client document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BrokerEvent {
    Connected {
        client_id: ClientId,
    },
    ConnectRefused {
        code: ConnectRefusal,
        message: String,
    },
    Status(StatusReply),
    /// A topic message. Without `subscriber_id` it goes to every local
    /// subscription of the topic; with one, only to that subscription.
    TopicMessage {
        message: TopicMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscriber_id: Option<SubscriberId>,
    },
    IntentMessage {
        message: IntentMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capability: Option<Capability>,
    },
    SubscriberCount {
        topic: String,
        subscriber_id: SubscriberId,
        count: usize,
    },
    CapabilityChange {
        revision: u64,
    },
}

impl Routed for BrokerEvent {
    fn channel(&self) -> Channel {
        match self {
            Self::TopicMessage { .. } | Self::SubscriberCount { .. } => Channel::Topic,
            Self::IntentMessage { .. } => Channel::Intent,
            Self::Connected { .. }
            | Self::ConnectRefused { .. }
            | Self::Status(_)
            | Self::CapabilityChange { .. } => Channel::Host,
        }
    }
}

/// Envelope around a [`ClientCommand`] or [`BrokerEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<M> {
    pub channel: Channel,
    pub message: M,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_uid: Option<String>,
}

impl<M: Routed> Envelope<M> {
    /// Wraps `message` on its own channel.
    pub fn new(message: M) -> Self {
        Self {
            channel: message.channel(),
            message,
            sender: None,
            recipient: None,
            reply_to_uid: None,
        }
    }

    #[must_use]
    pub fn from_client(mut self, sender: ClientId) -> Self {
        self.sender = Some(sender);
        self
    }

    #[must_use]
    pub fn to_client(mut self, recipient: ClientId) -> Self {
        self.recipient = Some(recipient);
        self
    }

    #[must_use]
    pub fn with_reply_uid(mut self, uid: impl Into<String>) -> Self {
        self.reply_to_uid = Some(uid.into());
        self
    }

    /// Returns `true` if the declared channel agrees with the message.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.channel == self.message.channel()
    }
}

/// Why a connect handshake was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectRefusal {
    /// The application is not registered.
    #[serde(rename = "refused:rejected")]
    Rejected,
    /// The document origin differs from the application's origin.
    #[serde(rename = "refused:blocked")]
    Blocked,
}

impl std::fmt::Display for ConnectRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected => write!(f, "refused:rejected"),
            Self::Blocked => write!(f, "refused:blocked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Outcome of a command: `{status: "ok"}` or
/// `{status: "error", code, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReply {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            code: None,
            message: None,
        }
    }

    #[must_use]
    pub fn error(err: &MessagingError) -> Self {
        Self {
            status: Status::Error,
            code: Some(err.code().to_string()),
            message: Some(err.detail()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Converts into a result, rebuilding the typed error.
    ///
    /// # Errors
    ///
    /// Returns the [`MessagingError`] described by an error status.
    pub fn into_result(self) -> Result<(), MessagingError> {
        match self.status {
            Status::Ok => Ok(()),
            Status::Error => Err(MessagingError::from_wire(
                self.code.as_deref().unwrap_or("MESSAGING_REMOTE"),
                self.message.as_deref().unwrap_or_default(),
            )),
        }
    }
}

impl From<Result<(), MessagingError>> for StatusReply {
    fn from(result: Result<(), MessagingError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::error(&e),
        }
    }
}
