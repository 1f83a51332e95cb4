//! Messaging errors surfaced to clients.
//!
//! Every operation a message client performs fails with a
//! [`MessagingError`]. Errors detected by the broker travel back inside
//! a [`StatusReply`](crate::StatusReply) carrying the error code, and
//! are rebuilt on the client with [`MessagingError::from_wire`].
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`MessagingError::ConnectRefused`] | `MESSAGING_CONNECT_REFUSED` | No |
//! | [`MessagingError::BrokerDiscoverTimeout`] | `MESSAGING_BROKER_DISCOVER_TIMEOUT` | Yes |
//! | [`MessagingError::RequestReply`] | `MESSAGING_REQUEST_REPLY` | Yes |
//! | [`MessagingError::NotQualified`] | `MESSAGING_NOT_QUALIFIED` | No |
//! | [`MessagingError::NullProvider`] | `MESSAGING_NULL_PROVIDER` | No |
//! | [`MessagingError::CapabilityRegistration`] | `MESSAGING_CAPABILITY_REGISTRATION` | No |
//! | [`MessagingError::IntentionRegistration`] | `MESSAGING_INTENTION_REGISTRATION` | No |
//! | [`MessagingError::ApplicationNotFound`] | `MESSAGING_APPLICATION_NOT_FOUND` | No |
//! | [`MessagingError::UnsupportedQuery`] | `MESSAGING_UNSUPPORTED_QUERY` | No |
//! | [`MessagingError::Malformed`] | `MESSAGING_MALFORMED` | No |
//! | [`MessagingError::Timeout`] | `MESSAGING_TIMEOUT` | Yes |
//! | [`MessagingError::Disconnected`] | `MESSAGING_DISCONNECTED` | No |
//! | [`MessagingError::Remote`] | `MESSAGING_REMOTE` | No |
//!
//! # Usage
//!
//! ```
//! use mfp_message::MessagingError;
//! use mfp_types::ErrorCode;
//!
//! let err = MessagingError::RequestReply("no replier on topic 'weather'".into());
//! assert_eq!(err.code(), "MESSAGING_REQUEST_REPLY");
//! assert!(err.to_string().starts_with("[RequestReplyError]"));
//!
//! let rebuilt = MessagingError::from_wire(err.code(), &err.detail());
//! assert_eq!(rebuilt, err);
//! ```

use crate::envelope::ConnectRefusal;
use mfp_types::ErrorCode;
use thiserror::Error;

/// Errors observed by message clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// The broker refused the connect handshake.
    #[error("[MessageClientConnectError] Client connect attempt {code}: {message}")]
    ConnectRefused {
        code: ConnectRefusal,
        message: String,
    },

    /// No broker answered the handshake in time.
    #[error(
        "[BrokerDiscoverTimeoutError] Message broker not discovered within the {timeout_ms}ms timeout. Messages cannot be published or received."
    )]
    BrokerDiscoverTimeout { timeout_ms: u64 },

    /// A request found no replier at publish time.
    #[error("[RequestReplyError] {0}")]
    RequestReply(String),

    /// The issuing application has not declared a matching intention.
    #[error("[NotQualifiedError] {0}")]
    NotQualified(String),

    /// No visible capability matches the issued intent.
    #[error("[NullProviderError] {0}")]
    NullProvider(String),

    /// A capability could not be registered or unregistered.
    #[error("[CapabilityRegistrationError] {0}")]
    CapabilityRegistration(String),

    /// An intention could not be registered or unregistered.
    #[error("[IntentionRegistrationError] {0}")]
    IntentionRegistration(String),

    /// No application is registered under the given symbolic name.
    #[error("[ApplicationNotFoundError] {0}")]
    ApplicationNotFound(String),

    /// A manifest registry command is not known.
    #[error("[UnsupportedQueryError] {0}")]
    UnsupportedQuery(String),

    /// A command or message could not be understood.
    #[error("[MalformedMessageError] {0}")]
    Malformed(String),

    /// An operation did not complete within its timeout.
    #[error("[TimeoutError] {operation} did not complete within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The client is no longer connected to the broker.
    #[error("[DisconnectedError] {0}")]
    Disconnected(String),

    /// An error code this client version does not know.
    #[error("[BrokerError] {code}: {message}")]
    Remote { code: String, message: String },
}

impl MessagingError {
    /// Returns the message carried on the wire next to the code.
    ///
    /// For single-message variants this is the inner message, so that
    /// [`from_wire`](Self::from_wire) rebuilds an equal error.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::RequestReply(m)
            | Self::NotQualified(m)
            | Self::NullProvider(m)
            | Self::CapabilityRegistration(m)
            | Self::IntentionRegistration(m)
            | Self::ApplicationNotFound(m)
            | Self::UnsupportedQuery(m)
            | Self::Malformed(m)
            | Self::Disconnected(m) => m.clone(),
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuilds an error from a wire code and message.
    #[must_use]
    pub fn from_wire(code: &str, message: &str) -> Self {
        let message = message.to_string();
        match code {
            "MESSAGING_REQUEST_REPLY" => Self::RequestReply(message),
            "MESSAGING_NOT_QUALIFIED" => Self::NotQualified(message),
            "MESSAGING_NULL_PROVIDER" => Self::NullProvider(message),
            "MESSAGING_CAPABILITY_REGISTRATION" => Self::CapabilityRegistration(message),
            "MESSAGING_INTENTION_REGISTRATION" => Self::IntentionRegistration(message),
            "MESSAGING_APPLICATION_NOT_FOUND" => Self::ApplicationNotFound(message),
            "MESSAGING_UNSUPPORTED_QUERY" => Self::UnsupportedQuery(message),
            "MESSAGING_MALFORMED" => Self::Malformed(message),
            "MESSAGING_DISCONNECTED" => Self::Disconnected(message),
            _ => Self::Remote {
                code: code.to_string(),
                message,
            },
        }
    }

    /// Creates a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

impl ErrorCode for MessagingError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConnectRefused { .. } => "MESSAGING_CONNECT_REFUSED",
            Self::BrokerDiscoverTimeout { .. } => "MESSAGING_BROKER_DISCOVER_TIMEOUT",
            Self::RequestReply(_) => "MESSAGING_REQUEST_REPLY",
            Self::NotQualified(_) => "MESSAGING_NOT_QUALIFIED",
            Self::NullProvider(_) => "MESSAGING_NULL_PROVIDER",
            Self::CapabilityRegistration(_) => "MESSAGING_CAPABILITY_REGISTRATION",
            Self::IntentionRegistration(_) => "MESSAGING_INTENTION_REGISTRATION",
            Self::ApplicationNotFound(_) => "MESSAGING_APPLICATION_NOT_FOUND",
            Self::UnsupportedQuery(_) => "MESSAGING_UNSUPPORTED_QUERY",
            Self::Malformed(_) => "MESSAGING_MALFORMED",
            Self::Timeout { .. } => "MESSAGING_TIMEOUT",
            Self::Disconnected(_) => "MESSAGING_DISCONNECTED",
            Self::Remote { .. } => "MESSAGING_REMOTE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BrokerDiscoverTimeout { .. } | Self::RequestReply(_) | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfp_types::assert_error_codes;

    fn all_variants() -> Vec<MessagingError> {
        vec![
            MessagingError::ConnectRefused {
                code: ConnectRefusal::Rejected,
                message: "unknown".into(),
            },
            MessagingError::BrokerDiscoverTimeout { timeout_ms: 100 },
            MessagingError::RequestReply("x".into()),
            MessagingError::NotQualified("x".into()),
            MessagingError::NullProvider("x".into()),
            MessagingError::CapabilityRegistration("x".into()),
            MessagingError::IntentionRegistration("x".into()),
            MessagingError::ApplicationNotFound("x".into()),
            MessagingError::UnsupportedQuery("x".into()),
            MessagingError::Malformed("x".into()),
            MessagingError::timeout("request", 50),
            MessagingError::Disconnected("x".into()),
            MessagingError::Remote {
                code: "OTHER".into(),
                message: "x".into(),
            },
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "MESSAGING_");
    }

    #[test]
    fn recoverable_variants() {
        let recoverable: Vec<_> = all_variants()
            .into_iter()
            .filter(ErrorCode::is_recoverable)
            .map(|e| e.code())
            .collect();
        assert_eq!(
            recoverable,
            vec![
                "MESSAGING_BROKER_DISCOVER_TIMEOUT",
                "MESSAGING_REQUEST_REPLY",
                "MESSAGING_TIMEOUT"
            ]
        );
    }

    #[test]
    fn discover_timeout_message() {
        let err = MessagingError::BrokerDiscoverTimeout { timeout_ms: 250 };
        assert_eq!(
            err.to_string(),
            "[BrokerDiscoverTimeoutError] Message broker not discovered within the 250ms timeout. Messages cannot be published or received."
        );
    }

    #[test]
    fn connect_refused_message_names_the_code() {
        let err = MessagingError::ConnectRefused {
            code: ConnectRefusal::Rejected,
            message: "Unknown client 'app-x'".into(),
        };
        assert!(err.to_string().contains("refused:rejected"));
    }

    #[test]
    fn wire_round_trip_for_message_variants() {
        let err = MessagingError::NotQualified("app 'a' lacks intention".into());
        let rebuilt = MessagingError::from_wire(err.code(), &err.detail());
        assert_eq!(rebuilt, err);
    }

    #[test]
    fn unknown_wire_code_becomes_remote() {
        let err = MessagingError::from_wire("SOMETHING_NEW", "details");
        assert_eq!(
            err,
            MessagingError::Remote {
                code: "SOMETHING_NEW".into(),
                message: "details".into()
            }
        );
        assert_eq!(err.code(), "MESSAGING_REMOTE");
    }
}
