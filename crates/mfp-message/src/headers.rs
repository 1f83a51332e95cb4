//! Message headers.
//!
//! Headers are a string-keyed map of arbitrary JSON values. Three keys
//! are reserved and written by the platform, never trusted from a
//! client:
//!
//! | Key | Set by | Meaning |
//! |-----|--------|---------|
//! | [`REPLY_TO`] | requesting client | reply topic of a request |
//! | [`CLIENT_ID`] | broker | id of the sending client |
//! | [`APP_SYMBOLIC_NAME`] | broker | application of the sending client |

use mfp_types::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Header carrying the reply topic of a request.
pub const REPLY_TO: &str = "ReplyTo";

/// Header carrying the sender's client id.
pub const CLIENT_ID: &str = "ClientId";

/// Header carrying the sender's application symbolic name.
pub const APP_SYMBOLIC_NAME: &str = "AppSymbolicName";

/// String-keyed header map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Value>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reply topic of a request, if this message is one.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.get(REPLY_TO).and_then(Value::as_str)
    }

    /// Sending client, as stamped by the broker.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> {
        self.get(CLIENT_ID)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Sending application, as stamped by the broker.
    #[must_use]
    pub fn app_symbolic_name(&self) -> Option<&str> {
        self.get(APP_SYMBOLIC_NAME).and_then(Value::as_str)
    }

    /// Overwrites the sender headers with broker-verified values.
    pub fn stamp_sender(&mut self, client: ClientId, app: &str) {
        self.insert(CLIENT_ID, client.uuid().to_string());
        self.insert(APP_SYMBOLIC_NAME, app);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
