//! Retained message store.

use mfp_message::{TopicMessage, REPLY_TO};
use std::collections::HashMap;

/// Last retained message per exact topic.
#[derive(Debug, Default)]
pub struct RetainedStore {
    messages: HashMap<String, TopicMessage>,
}

impl RetainedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `message` for its topic, replacing any previous one.
    ///
    /// The stored copy never carries a reply address.
    pub fn store(&mut self, message: &TopicMessage) {
        let mut retained = message.clone();
        retained.headers.remove(REPLY_TO);
        self.messages.insert(retained.topic.clone(), retained);
    }

    /// Clears the retained message of `topic`. Returns `true` if one
    /// was stored.
    pub fn clear(&mut self, topic: &str) -> bool {
        self.messages.remove(topic).is_some()
    }

    #[must_use]
    pub fn get(&self, topic: &str) -> Option<&TopicMessage> {
        self.messages.get(topic)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfp_message::Headers;

    #[test]
    fn store_replaces_and_strips_reply_address() {
        let mut store = RetainedStore::new();
        store.store(&TopicMessage::new("t").with_body("first").retained(true));
        store.store(
            &TopicMessage::new("t")
                .with_body("second")
                .with_headers(Headers::new().with(REPLY_TO, ":reply:abc").with("k", 1))
                .retained(true),
        );

        let retained = store.get("t").unwrap();
        assert_eq!(retained.body, Some("second".into()));
        assert!(retained.headers.reply_to().is_none());
        assert!(retained.headers.contains_key("k"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_removes_entry() {
        let mut store = RetainedStore::new();
        store.store(&TopicMessage::new("t").with_body(1).retained(true));
        assert!(store.clear("t"));
        assert!(!store.clear("t"));
        assert!(store.is_empty());
    }
}
