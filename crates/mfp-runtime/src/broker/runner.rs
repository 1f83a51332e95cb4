//! BrokerRunner - drives a [`MessageBroker`] in its own tokio task.
//!
//! # Architecture
//!
//! ```text
//!                           ┌──────────────────────────┐
//!                           │      BrokerRunner        │
//!                           │                          │
//! BrokerHandle ──cmd──────► │  command_rx ◄── mpsc     │
//!                           │                          │
//! Transport ──event───────► │  inbox ◄── mpsc          │
//!                           │         │                │
//!                           │         ▼                │
//!                           │  MessageBroker::handle() │
//!                           │         │                │
//!                           │         ▼                │
//!                           │  Transport::post() ──────┼──► documents
//!                           └──────────────────────────┘
//! ```
//!
//! Control commands are served before transport events. A post to a
//! document that has gone away is fed back to the broker as an unload.

use super::{BrokerError, MessageBroker, Outbound};
use crate::registry::RegistryError;
use crate::transport::{Transport, TransportError, TransportEvent};
use mfp_message::{Application, CapabilityDescriptor, IntentionDescriptor, Manifest};
use mfp_types::{CapabilityId, IntentionId, Qualifier};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Control command buffer size.
const COMMAND_BUFFER_SIZE: usize = 32;

type Reply<T> = oneshot::Sender<T>;

/// Commands sent from a [`BrokerHandle`] to the runner.
#[derive(Debug)]
pub enum BrokerCommand {
    RegisterCapability {
        app: String,
        capabilities: Vec<CapabilityDescriptor>,
        reply: Reply<Result<Vec<CapabilityId>, RegistryError>>,
    },
    UnregisterCapability {
        app: String,
        kind: String,
        qualifier: Qualifier,
        reply: Reply<Result<usize, RegistryError>>,
    },
    RegisterIntention {
        app: String,
        intentions: Vec<IntentionDescriptor>,
        reply: Reply<Result<Vec<IntentionId>, RegistryError>>,
    },
    UnregisterIntention {
        app: String,
        kind: String,
        qualifier: Qualifier,
        reply: Reply<Result<usize, RegistryError>>,
    },
    Applications {
        reply: Reply<Vec<Application>>,
    },
    Manifest {
        app: String,
        reply: Reply<Option<Manifest>>,
    },
    SubscriberCount {
        topic: String,
        reply: Reply<usize>,
    },
    Shutdown,
}

/// Runs a [`MessageBroker`] against a transport.
pub struct BrokerRunner {
    broker: MessageBroker,
    transport: Arc<dyn Transport>,
    inbox: mpsc::UnboundedReceiver<TransportEvent>,
    command_rx: mpsc::Receiver<BrokerCommand>,
}

impl BrokerRunner {
    /// Creates a runner and the handle controlling it.
    #[must_use]
    pub fn new(
        broker: MessageBroker,
        transport: Arc<dyn Transport>,
        inbox: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, BrokerHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let runner = Self {
            broker,
            transport,
            inbox,
            command_rx,
        };
        (runner, BrokerHandle { command_tx })
    }

    /// Runs until shut down, or until both the inbox and every handle
    /// are gone.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let (runner, handle) = BrokerRunner::new(broker, transport, inbox);
    /// tokio::spawn(runner.run());
    /// ```
    pub async fn run(mut self) -> MessageBroker {
        info!(
            applications = self.broker.registry().applications().len(),
            "MessageBroker started"
        );
        let mut inbox_open = true;
        let mut commands_open = true;

        while inbox_open || commands_open {
            tokio::select! {
                biased;

                command = self.command_rx.recv(), if commands_open => {
                    match command {
                        Some(BrokerCommand::Shutdown) => {
                            info!("MessageBroker: shutdown requested");
                            break;
                        }
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("MessageBroker: all handles dropped");
                            commands_open = false;
                        }
                    }
                }

                event = self.inbox.recv(), if inbox_open => {
                    match event {
                        Some(event) => {
                            let outbound = self.broker.handle(event);
                            self.flush(outbound);
                        }
                        None => {
                            debug!("MessageBroker: transport closed");
                            inbox_open = false;
                        }
                    }
                }
            }
        }

        info!(clients = self.broker.client_count(), "MessageBroker stopped");
        self.broker
    }

    fn handle_command(&mut self, command: BrokerCommand) {
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            BrokerCommand::RegisterCapability {
                app,
                capabilities,
                reply,
            } => {
                let _ = reply.send(self.broker.register_capability(&app, capabilities));
            }
            BrokerCommand::UnregisterCapability {
                app,
                kind,
                qualifier,
                reply,
            } => {
                let _ = reply.send(self.broker.unregister_capability(&app, &kind, &qualifier));
            }
            BrokerCommand::RegisterIntention {
                app,
                intentions,
                reply,
            } => {
                let _ = reply.send(self.broker.register_intention(&app, intentions));
            }
            BrokerCommand::UnregisterIntention {
                app,
                kind,
                qualifier,
                reply,
            } => {
                let _ = reply.send(self.broker.unregister_intention(&app, &kind, &qualifier));
            }
            BrokerCommand::Applications { reply } => {
                let _ = reply.send(self.broker.applications());
            }
            BrokerCommand::Manifest { app, reply } => {
                let _ = reply.send(self.broker.registry().manifest(&app));
            }
            BrokerCommand::SubscriberCount { topic, reply } => {
                let _ = reply.send(self.broker.subscriber_count(&topic));
            }
            BrokerCommand::Shutdown => {}
        }
        let outbound = self.broker.drain();
        self.flush(outbound);
    }

    fn flush(&mut self, outbound: Vec<Outbound>) {
        let mut queue: VecDeque<Outbound> = outbound.into();
        while let Some(Outbound { target, envelope }) = queue.pop_front() {
            let data = match serde_json::to_value(&envelope) {
                Ok(data) => data,
                Err(e) => {
                    warn!(document = %target, error = %TransportError::Encode(e.to_string()), "Dropping outbound message");
                    continue;
                }
            };
            match self.transport.post(target, data) {
                Ok(()) => {}
                Err(TransportError::DocumentClosed(document)) => {
                    debug!(document = %document, "Target document is gone; unloading its clients");
                    queue.extend(self.broker.handle(TransportEvent::Unloaded { source: document }));
                }
                Err(e) => warn!(document = %target, error = %e, "Failed to post message"),
            }
        }
    }
}

/// Cloneable control handle of a running broker.
#[derive(Clone, Debug)]
pub struct BrokerHandle {
    command_tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> BrokerCommand,
    ) -> Result<T, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(command(reply))
            .await
            .map_err(|_| BrokerError::Stopped)?;
        rx.await.map_err(|_| BrokerError::Stopped)
    }

    /// Registers capabilities on behalf of `app`.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::Stopped`] if the runner is gone
    /// - [`BrokerError::Registry`] if the registration is rejected
    pub async fn register_capability(
        &self,
        app: impl Into<String>,
        capabilities: Vec<CapabilityDescriptor>,
    ) -> Result<Vec<CapabilityId>, BrokerError> {
        let app = app.into();
        Ok(self
            .request(|reply| BrokerCommand::RegisterCapability {
                app,
                capabilities,
                reply,
            })
            .await??)
    }

    /// Removes capabilities of `app`; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Same as [`register_capability`](Self::register_capability).
    pub async fn unregister_capability(
        &self,
        app: impl Into<String>,
        kind: impl Into<String>,
        qualifier: Qualifier,
    ) -> Result<usize, BrokerError> {
        let (app, kind) = (app.into(), kind.into());
        Ok(self
            .request(|reply| BrokerCommand::UnregisterCapability {
                app,
                kind,
                qualifier,
                reply,
            })
            .await??)
    }

    /// Registers intentions on behalf of `app`.
    ///
    /// # Errors
    ///
    /// Same as [`register_capability`](Self::register_capability).
    pub async fn register_intention(
        &self,
        app: impl Into<String>,
        intentions: Vec<IntentionDescriptor>,
    ) -> Result<Vec<IntentionId>, BrokerError> {
        let app = app.into();
        Ok(self
            .request(|reply| BrokerCommand::RegisterIntention {
                app,
                intentions,
                reply,
            })
            .await??)
    }

    /// Removes intentions of `app`.
    ///
    /// # Errors
    ///
    /// Same as [`register_capability`](Self::register_capability).
    pub async fn unregister_intention(
        &self,
        app: impl Into<String>,
        kind: impl Into<String>,
        qualifier: Qualifier,
    ) -> Result<usize, BrokerError> {
        let (app, kind) = (app.into(), kind.into());
        Ok(self
            .request(|reply| BrokerCommand::UnregisterIntention {
                app,
                kind,
                qualifier,
                reply,
            })
            .await??)
    }

    /// Lists registered applications.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Stopped`] if the runner is gone.
    pub async fn applications(&self) -> Result<Vec<Application>, BrokerError> {
        self.request(|reply| BrokerCommand::Applications { reply })
            .await
    }

    /// Manifest of `app`, if registered.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Stopped`] if the runner is gone.
    pub async fn manifest(&self, app: impl Into<String>) -> Result<Option<Manifest>, BrokerError> {
        let app = app.into();
        self.request(|reply| BrokerCommand::Manifest { app, reply })
            .await
    }

    /// Current number of live subscriptions on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Stopped`] if the runner is gone.
    pub async fn subscriber_count(&self, topic: impl Into<String>) -> Result<usize, BrokerError> {
        let topic = topic.into();
        self.request(|reply| BrokerCommand::SubscriberCount { topic, reply })
            .await
    }

    /// Asks the runner to stop.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Stopped`] if the runner is already gone.
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        self.command_tx
            .send(BrokerCommand::Shutdown)
            .await
            .map_err(|_| BrokerError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ApplicationRegistry, ManifestRegistry};
    use crate::transport::InProcessTransport;
    use mfp_message::{BrokerEvent, ClientCommand, Envelope};
    use serde_json::Value;

    fn application(name: &str) -> Application {
        Application {
            symbolic_name: name.into(),
            name: name.into(),
            base_url: format!("http://{name}.test/"),
            origin: format!("http://{name}.test"),
            manifest_url: format!("http://{name}.test/manifest.json"),
            scope_check_disabled: false,
            intention_check_disabled: false,
            intention_register_api_disabled: true,
        }
    }

    fn start() -> (
        InProcessTransport,
        BrokerHandle,
        tokio::task::JoinHandle<MessageBroker>,
    ) {
        let mut applications = ApplicationRegistry::new();
        applications.register(application("app-a")).unwrap();
        let broker = MessageBroker::new(
            ManifestRegistry::new(Arc::new(applications)),
            "platform",
        );
        let (transport, inbox) = InProcessTransport::new();
        let (runner, handle) = BrokerRunner::new(broker, Arc::new(transport.clone()), inbox);
        (transport, handle, tokio::spawn(runner.run()))
    }

    fn decode(data: Value) -> Envelope<BrokerEvent> {
        serde_json::from_value(data).unwrap()
    }

    #[tokio::test]
    async fn handle_controls_registry() {
        let (_transport, handle, task) = start();

        let ids = handle
            .register_capability("app-a", vec![CapabilityDescriptor::new("map", Qualifier::nil())])
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(handle.manifest("app-a").await.unwrap().unwrap().capabilities.len(), 1);

        let err = handle
            .register_capability("ghost", vec![CapabilityDescriptor::new("map", Qualifier::nil())])
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Registry(_)));

        assert_eq!(handle.applications().await.unwrap().len(), 1);
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(handle.subscriber_count("t").await, Err(BrokerError::Stopped));
    }

    #[tokio::test]
    async fn serves_documents_over_transport() {
        let (transport, handle, _task) = start();
        let mut doc = transport.open_document("http://app-a.test");

        doc.post(
            serde_json::to_value(
                Envelope::new(ClientCommand::Connect {
                    app_symbolic_name: "app-a".into(),
                })
                .with_reply_uid("c1"),
            )
            .unwrap(),
        )
        .unwrap();
        let connected = decode(doc.recv().await.unwrap());
        let BrokerEvent::Connected { client_id } = connected.message else {
            panic!("expected connected");
        };
        assert_eq!(connected.reply_to_uid.as_deref(), Some("c1"));

        doc.post(
            serde_json::to_value(
                Envelope::new(ClientCommand::Subscribe {
                    topic: "t".into(),
                    subscriber_id: mfp_types::SubscriberId::new(),
                })
                .from_client(client_id)
                .with_reply_uid("s1"),
            )
            .unwrap(),
        )
        .unwrap();
        let ack = decode(doc.recv().await.unwrap());
        assert!(matches!(ack.message, BrokerEvent::Status(ref s) if s.is_ok()));
        assert_eq!(handle.subscriber_count("t").await.unwrap(), 1);

        drop(doc);
        // Control commands win over transport events, so poll
        let mut count = handle.subscriber_count("t").await.unwrap();
        for _ in 0..10 {
            if count == 0 {
                break;
            }
            tokio::task::yield_now().await;
            count = handle.subscriber_count("t").await.unwrap();
        }
        assert_eq!(count, 0);
    }
}
