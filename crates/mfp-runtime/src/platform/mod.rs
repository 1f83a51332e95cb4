//! Platform bootstrap.
//!
//! [`HostPlatform`] plays the host document: it owns the broker and
//! the in-process transport, and lets further documents attach.
//!
//! # Startup
//!
//! ```text
//! PlatformConfig ──► load_registries ──► MessageBroker ──► BrokerRunner (spawned)
//!                         ▲                                      │
//!   built-in "platform" ──┘                                      │ BrokerHandle
//!                                                                ▼
//!                    InProcessTransport ──► platform client, host client, ...
//! ```
//!
//! The built-in `platform` application lives at the host origin, has
//! scope and intention checks disabled and provides the public
//! `manifest-registry` capability answered by the broker.

mod error;

pub use error::PlatformError;

use crate::broker::{BrokerHandle, BrokerRunner, MessageBroker};
use crate::client::{ClientOptions, ManifestRegistryClient, MessageClient};
use crate::config::PlatformConfig;
use crate::registry::{load_registries, ManifestLoader};
use crate::transport::{DocumentEndpoint, InProcessTransport};
use mfp_message::{Application, ApplicationManifest, CapabilityDescriptor, MANIFEST_REGISTRY_TYPE};
use mfp_types::Qualifier;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Symbolic name of the built-in platform application.
pub const PLATFORM_APP: &str = "platform";

/// The built-in platform application at `host_origin` with its manifest.
#[must_use]
pub fn platform_application(host_origin: &str) -> (Application, ApplicationManifest) {
    let origin = host_origin.trim_end_matches('/').to_string();
    let application = Application {
        symbolic_name: PLATFORM_APP.into(),
        name: "Platform".into(),
        base_url: format!("{origin}/"),
        origin,
        manifest_url: format!("builtin:{PLATFORM_APP}"),
        scope_check_disabled: true,
        intention_check_disabled: true,
        intention_register_api_disabled: true,
    };
    let manifest = ApplicationManifest {
        name: "Platform".into(),
        base_url: None,
        intentions: vec![],
        capabilities: vec![CapabilityDescriptor::new(MANIFEST_REGISTRY_TYPE, Qualifier::nil())
            .public()
            .with_description("Queries and mutates the manifest registry")],
    };
    (application, manifest)
}

/// Loads all configured applications and builds a broker for them.
///
/// Applications whose manifest cannot be loaded are left out.
pub async fn build_broker(config: &PlatformConfig, loader: &dyn ManifestLoader) -> MessageBroker {
    let builtin = vec![platform_application(&config.host.origin)];
    let registry = load_registries(config.active_apps(), loader, builtin).await;
    MessageBroker::new(registry, PLATFORM_APP)
}

/// A running platform with its broker and in-process documents.
pub struct HostPlatform {
    config: PlatformConfig,
    transport: InProcessTransport,
    broker: BrokerHandle,
    task: JoinHandle<MessageBroker>,
    platform_client: MessageClient,
    host_client: Option<MessageClient>,
}

impl HostPlatform {
    /// Starts the broker and connects the platform client and, if
    /// configured, the host application's client.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::Config`] if the configuration is invalid
    /// - [`PlatformError::Client`] if the platform client cannot connect
    pub async fn start(
        config: PlatformConfig,
        loader: &dyn ManifestLoader,
    ) -> Result<Self, PlatformError> {
        config.validate()?;

        let broker = build_broker(&config, loader).await;
        let applications = broker.registry().applications().len();
        let (transport, inbox) = InProcessTransport::new();
        let (runner, handle) = BrokerRunner::new(broker, Arc::new(transport.clone()), inbox);
        let task = tokio::spawn(runner.run());

        let options = ClientOptions::from_config(&config.messaging);
        let platform_client = MessageClient::connect(
            transport.open_document(config.host.origin.clone()),
            PLATFORM_APP,
            options,
        );
        if let Err(e) = platform_client.connected().await {
            error!(error = %e, "Platform client failed to connect");
            let _ = handle.shutdown().await;
            return Err(e.into());
        }

        let host_client = match &config.host.symbolic_name {
            Some(app) => {
                let client = MessageClient::connect(
                    transport.open_document(config.host.origin.clone()),
                    app.clone(),
                    options,
                );
                match client.connected().await {
                    Ok(_) => Some(client),
                    Err(e) => {
                        warn!(app = %app, error = %e, "Host application is not connected");
                        None
                    }
                }
            }
            None => None,
        };

        info!(
            applications,
            origin = %config.host.origin,
            host_app = config.host.symbolic_name.as_deref().unwrap_or("-"),
            "Platform started"
        );
        Ok(Self {
            config,
            transport,
            broker: handle,
            task,
            platform_client,
            host_client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Control handle of the broker.
    #[must_use]
    pub fn broker(&self) -> &BrokerHandle {
        &self.broker
    }

    /// Client of the built-in platform application.
    #[must_use]
    pub fn platform_client(&self) -> &MessageClient {
        &self.platform_client
    }

    /// Client of the host application, if one is configured and connected.
    #[must_use]
    pub fn host_client(&self) -> Option<&MessageClient> {
        self.host_client.as_ref()
    }

    /// Manifest registry client acting as the platform application.
    #[must_use]
    pub fn manifest_registry(&self) -> ManifestRegistryClient {
        ManifestRegistryClient::new(self.platform_client.clone())
    }

    /// Attaches a new document loaded from `origin`.
    #[must_use]
    pub fn open_document(&self, origin: impl Into<String>) -> DocumentEndpoint {
        self.transport.open_document(origin)
    }

    /// Opens a document at `origin` and connects `app` from it.
    ///
    /// Returns immediately; await [`MessageClient::connected`] for the
    /// handshake outcome.
    #[must_use]
    pub fn connect_client(
        &self,
        app: impl Into<String>,
        origin: impl Into<String>,
    ) -> MessageClient {
        let options = ClientOptions::from_config(&self.config.messaging);
        MessageClient::connect(self.open_document(origin), app, options)
    }

    /// Number of attached documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.transport.document_count()
    }

    /// Disconnects the built-in clients and stops the broker.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Broker`] if the broker was already gone.
    pub async fn shutdown(self) -> Result<(), PlatformError> {
        if let Some(client) = &self.host_client {
            let _ = client.disconnect().await;
        }
        let _ = self.platform_client.disconnect().await;

        self.broker.shutdown().await?;
        let broker = self.task.await.map_err(|e| {
            error!(error = %e, "Broker task failed");
            crate::broker::BrokerError::Stopped
        })?;
        info!(clients = broker.client_count(), "Platform stopped");
        Ok(())
    }
}
