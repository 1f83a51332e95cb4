//! Connected client sessions.

use chrono::{DateTime, Utc};
use mfp_types::{ClientId, DocumentId};
use std::collections::HashMap;

/// A client that completed the connect handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub id: ClientId,
    pub document: DocumentId,
    pub app: String,
    pub origin: String,
    pub connected_at: DateTime<Utc>,
}

impl ClientSession {
    pub fn new(document: DocumentId, app: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            id: ClientId::new(),
            document,
            app: app.into(),
            origin: origin.into(),
            connected_at: Utc::now(),
        }
    }
}

/// Sessions keyed by client id.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ClientId, ClientSession>,
}

impl SessionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: ClientSession) {
        self.sessions.insert(session.id, session);
    }

    #[must_use]
    pub fn get(&self, id: ClientId) -> Option<&ClientSession> {
        self.sessions.get(&id)
    }

    pub fn remove(&mut self, id: ClientId) -> Option<ClientSession> {
        self.sessions.remove(&id)
    }

    /// Clients connected through `document`.
    #[must_use]
    pub fn by_document(&self, document: DocumentId) -> Vec<ClientId> {
        let mut clients: Vec<&ClientSession> = self
            .sessions
            .values()
            .filter(|s| s.document == document)
            .collect();
        clients.sort_by_key(|s| s.connected_at);
        clients.into_iter().map(|s| s.id).collect()
    }

    /// Looks up the session of `sender`, provided the message arrived
    /// through the document and origin the session was opened with.
    ///
    /// A document can host several clients, but one document cannot
    /// speak for a client living in another.
    #[must_use]
    pub fn verify(
        &self,
        sender: ClientId,
        document: DocumentId,
        origin: &str,
    ) -> Option<&ClientSession> {
        self.sessions
            .get(&sender)
            .filter(|s| s.document == document && s.origin == origin)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_requires_same_document_and_origin() {
        let mut table = SessionTable::new();
        let doc = DocumentId::new();
        let session = ClientSession::new(doc, "app-a", "http://a.test");
        let id = session.id;
        table.insert(session);

        assert!(table.verify(id, doc, "http://a.test").is_some());
        assert!(table.verify(id, DocumentId::new(), "http://a.test").is_none());
        assert!(table.verify(id, doc, "http://evil.test").is_none());
        assert!(table.verify(ClientId::new(), doc, "http://a.test").is_none());
    }

    #[test]
    fn by_document_lists_hosted_clients() {
        let mut table = SessionTable::new();
        let doc = DocumentId::new();
        let first = ClientSession::new(doc, "host", "http://h.test");
        let second = ClientSession::new(doc, "platform", "http://h.test");
        let other = ClientSession::new(DocumentId::new(), "app-a", "http://a.test");
        let (first_id, second_id) = (first.id, second.id);
        table.insert(first);
        table.insert(second);
        table.insert(other);

        let hosted = table.by_document(doc);
        assert_eq!(hosted.len(), 2);
        assert!(hosted.contains(&first_id));
        assert!(hosted.contains(&second_id));

        table.remove(first_id);
        assert_eq!(table.by_document(doc), vec![second_id]);
        assert_eq!(table.len(), 2);
    }
}
