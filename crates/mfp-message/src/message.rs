//! Topic and intent messages.

use crate::headers::Headers;
use mfp_types::Qualifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message published to a topic.
///
/// An absent or `null` body is empty. Publishing an empty message with
/// `retain` set clears the retained message of the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub retain: bool,
}

impl TopicMessage {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            body: None,
            headers: Headers::new(),
            retain: false,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn retained(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Returns `true` if the body is absent or `null`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        is_empty_body(self.body.as_ref())
    }
}

/// Type and qualifier addressing a capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub qualifier: Qualifier,
}

impl Intent {
    pub fn new(kind: impl Into<String>, qualifier: Qualifier) -> Self {
        Self {
            kind: kind.into(),
            qualifier,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.qualifier)
    }
}

/// An intent with its payload, as issued by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMessage {
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: Headers,
}

impl IntentMessage {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            body: None,
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

pub(crate) fn is_empty_body(body: Option<&Value>) -> bool {
    matches!(body, None | Some(Value::Null))
}
