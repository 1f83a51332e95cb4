//! Client side of the broker's manifest registry.
//!
//! Each call is a request intent of type `manifest-registry` answered
//! by the broker itself.

use super::MessageClient;
use mfp_message::{
    Application, Capability, CapabilityDescriptor, Intent, IntentMessage, Manifest,
    ManifestCommand, MessagingError, StatusReply, MANIFEST_REGISTRY_TYPE,
};
use mfp_types::{CapabilityId, IntentionId, Qualifier};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Queries and mutates the manifest registry through a [`MessageClient`].
#[derive(Clone, Debug)]
pub struct ManifestRegistryClient {
    client: MessageClient,
}

impl ManifestRegistryClient {
    #[must_use]
    pub fn new(client: MessageClient) -> Self {
        Self { client }
    }

    /// Manifests of all registered applications.
    ///
    /// # Errors
    ///
    /// Fails like [`MessageClient::request_by_intent`], or with
    /// [`MessagingError::Malformed`] if the reply cannot be decoded.
    pub async fn manifests(&self) -> Result<Vec<Manifest>, MessagingError> {
        self.query(ManifestCommand::FindManifests).await
    }

    /// Manifest of `app`, `None` if it is not registered.
    ///
    /// # Errors
    ///
    /// Same as [`manifests`](Self::manifests).
    pub async fn manifest(
        &self,
        app: impl Into<String>,
    ) -> Result<Option<Manifest>, MessagingError> {
        self.query(ManifestCommand::FindManifest {
            symbolic_app_name: app.into(),
        })
        .await
    }

    /// Applications providing a capability for the intention `intent_id`.
    ///
    /// # Errors
    ///
    /// Same as [`manifests`](Self::manifests).
    pub async fn capability_providers(
        &self,
        intent_id: IntentionId,
    ) -> Result<Vec<Application>, MessagingError> {
        self.query(ManifestCommand::FindCapabilityProviders { intent_id })
            .await
    }

    /// Applications that declared an intention for the capability.
    ///
    /// # Errors
    ///
    /// Same as [`manifests`](Self::manifests).
    pub async fn capability_consumers(
        &self,
        capability_id: CapabilityId,
    ) -> Result<Vec<Application>, MessagingError> {
        self.query(ManifestCommand::FindCapabilityConsumers { capability_id })
            .await
    }

    /// # Errors
    ///
    /// Same as [`manifests`](Self::manifests).
    pub async fn capability(
        &self,
        capability_id: CapabilityId,
    ) -> Result<Option<Capability>, MessagingError> {
        self.query(ManifestCommand::FindCapability { capability_id })
            .await
    }

    /// Visible capabilities matching `kind` and `qualifier` that this
    /// application has an intention for.
    ///
    /// # Errors
    ///
    /// Same as [`manifests`](Self::manifests).
    pub async fn capabilities(
        &self,
        kind: impl Into<String>,
        qualifier: Qualifier,
    ) -> Result<Vec<Capability>, MessagingError> {
        self.query(ManifestCommand::FindCapabilities {
            kind: kind.into(),
            qualifier,
        })
        .await
    }

    /// Registers a capability for this application.
    ///
    /// # Errors
    ///
    /// [`MessagingError::CapabilityRegistration`] if the broker rejects it.
    pub async fn register_capability(
        &self,
        capability: CapabilityDescriptor,
    ) -> Result<(), MessagingError> {
        let status: StatusReply = self
            .query(ManifestCommand::RegisterCapability { capability })
            .await?;
        status.into_result()
    }

    /// Removes this application's capabilities of `kind` and `qualifier`.
    ///
    /// # Errors
    ///
    /// [`MessagingError::CapabilityRegistration`] if the broker rejects it.
    pub async fn unregister_capability(
        &self,
        kind: impl Into<String>,
        qualifier: Qualifier,
    ) -> Result<(), MessagingError> {
        let status: StatusReply = self
            .query(ManifestCommand::UnregisterCapability {
                kind: kind.into(),
                qualifier,
            })
            .await?;
        status.into_result()
    }

    /// Watches the result of [`capabilities`](Self::capabilities),
    /// re-running the query on every registry change.
    #[must_use]
    pub fn watch_capabilities(
        &self,
        kind: impl Into<String>,
        qualifier: Qualifier,
    ) -> CapabilityWatch {
        CapabilityWatch {
            registry: self.clone(),
            changes: self.client.capability_changes(),
            kind: kind.into(),
            qualifier,
            primed: false,
        }
    }

    async fn query<T: DeserializeOwned>(
        &self,
        command: ManifestCommand,
    ) -> Result<T, MessagingError> {
        let name = command.name();
        let message = IntentMessage::new(Intent::new(MANIFEST_REGISTRY_TYPE, Qualifier::nil()))
            .with_body(command.to_body());
        let reply = self.client.request_by_intent(message).await?;
        let body = reply.body.unwrap_or(Value::Null);

        // Rejected commands answer with an error status in place of data
        if let Ok(status) = serde_json::from_value::<StatusReply>(body.clone()) {
            if !status.is_ok() {
                status.into_result()?;
            }
        }
        serde_json::from_value(body).map_err(|e| {
            MessagingError::Malformed(format!("Unexpected reply to '{name}': {e}"))
        })
    }
}

/// Live result of a capability query.
pub struct CapabilityWatch {
    registry: ManifestRegistryClient,
    changes: broadcast::Receiver<u64>,
    kind: String,
    qualifier: Qualifier,
    primed: bool,
}

impl CapabilityWatch {
    /// Current capabilities on the first call, then the updated result
    /// after each registry change. `None` once the client is gone.
    pub async fn next(&mut self) -> Option<Result<Vec<Capability>, MessagingError>> {
        if self.primed {
            match self.changes.recv().await {
                Ok(revision) => debug!(revision, kind = %self.kind, "Capabilities changed"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, kind = %self.kind, "Skipped capability changes");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
        self.primed = true;
        Some(
            self.registry
                .capabilities(self.kind.clone(), self.qualifier.clone())
                .await,
        )
    }
}
