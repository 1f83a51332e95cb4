//! JSON-lines transport over stdin/stdout.
//!
//! The process embedding the broker relays cross-document messages as
//! one JSON object per line:
//!
//! ```text
//! stdin  {"document": "<uuid>", "origin": "http://a.test", "data": {...}}
//! stdin  {"document": "<uuid>", "unloaded": true}
//! stdout {"document": "<uuid>", "data": {...}}
//! ```
//!
//! A document is known from its first inbound line until it unloads.
//! Posting to an unknown document fails with `DocumentClosed`.

use mfp_runtime::{Transport, TransportError, TransportEvent};
use mfp_types::DocumentId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One inbound line.
#[derive(Debug, Deserialize)]
struct InboundLine {
    document: DocumentId,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    unloaded: bool,
}

/// One outbound line.
#[derive(Debug, Serialize)]
struct OutboundLine {
    document: DocumentId,
    data: Value,
}

/// Broker side of the stdio transport.
#[derive(Clone)]
pub struct StdioTransport {
    documents: Arc<Mutex<HashSet<DocumentId>>>,
    out_tx: mpsc::UnboundedSender<String>,
}

impl StdioTransport {
    /// Creates the transport with the channel feeding the stdout writer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let transport = Self {
            documents: Arc::new(Mutex::new(HashSet::new())),
            out_tx,
        };
        (transport, out_rx)
    }

    /// Turns one input line into a transport event.
    ///
    /// Returns `None` for blank or malformed lines.
    pub fn parse_line(&self, line: &str) -> Option<TransportEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let inbound: InboundLine = match serde_json::from_str(line) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed input line");
                return None;
            }
        };

        if inbound.unloaded {
            self.documents.lock().remove(&inbound.document);
            return Some(TransportEvent::Unloaded {
                source: inbound.document,
            });
        }

        let (Some(origin), Some(data)) = (inbound.origin, inbound.data) else {
            warn!(document = %inbound.document, "Ignoring input line without origin or data");
            return None;
        };
        self.documents.lock().insert(inbound.document);
        Some(TransportEvent::Message {
            source: inbound.document,
            origin,
            data,
        })
    }
}

impl Transport for StdioTransport {
    fn post(&self, target: DocumentId, data: Value) -> Result<(), TransportError> {
        if !self.documents.lock().contains(&target) {
            return Err(TransportError::DocumentClosed(target));
        }
        let line = serde_json::to_string(&OutboundLine {
            document: target,
            data,
        })
        .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.out_tx
            .send(line)
            .map_err(|_| TransportError::DocumentClosed(target))
    }
}

/// Reads stdin until EOF and forwards events to the broker inbox.
pub async fn read_stdin(transport: StdioTransport, inbox: mpsc::UnboundedSender<TransportEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(event) = transport.parse_line(&line) {
                    if inbox.send(event).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
}

/// Writes outbound lines to stdout until the transport is dropped.
pub async fn write_stdout(mut out_rx: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(mut line) = out_rx.recv().await {
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            warn!(error = %e, "Failed to write stdout");
            break;
        }
        let _ = stdout.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_line_registers_document() {
        let (transport, mut out_rx) = StdioTransport::new();
        let document = DocumentId::new();
        let line = json!({
            "document": document,
            "origin": "http://a.test",
            "data": {"channel": "topic"}
        })
        .to_string();

        let event = transport.parse_line(&line).expect("event");

        assert_eq!(
            event,
            TransportEvent::Message {
                source: document,
                origin: "http://a.test".into(),
                data: json!({"channel": "topic"}),
            }
        );
        transport.post(document, json!({"ok": true})).unwrap();
        let written: Value = serde_json::from_str(&out_rx.try_recv().unwrap()).unwrap();
        assert_eq!(written, json!({"document": document, "data": {"ok": true}}));
    }

    #[test]
    fn unload_forgets_document() {
        let (transport, _out_rx) = StdioTransport::new();
        let document = DocumentId::new();
        transport.parse_line(
            &json!({"document": document, "origin": "http://a.test", "data": {}}).to_string(),
        );

        let event = transport.parse_line(&json!({"document": document, "unloaded": true}).to_string());

        assert_eq!(event, Some(TransportEvent::Unloaded { source: document }));
        assert_eq!(
            transport.post(document, json!({})),
            Err(TransportError::DocumentClosed(document))
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (transport, _out_rx) = StdioTransport::new();

        assert!(transport.parse_line("").is_none());
        assert!(transport.parse_line("not json").is_none());
        assert!(transport
            .parse_line(&json!({"document": DocumentId::new()}).to_string())
            .is_none());
    }
}
