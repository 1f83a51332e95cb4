//! Application, capability and intention model.
//!
//! Manifests are authored by applications as JSON and loaded at
//! platform startup. Registration turns descriptors into registered
//! [`Capability`] and [`Intention`] records carrying metadata.
//!
//! ```text
//! ApplicationManifest ──load──► Application          (application registry)
//!        │
//!        ├── CapabilityDescriptor ──register──► Capability   (manifest registry)
//!        └── IntentionDescriptor  ──register──► Intention    (manifest registry)
//! ```

use mfp_types::{CapabilityId, IntentionId, Qualifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Manifest JSON as published by an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub intentions: Vec<IntentionDescriptor>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDescriptor>,
}

/// A registered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub symbolic_name: String,
    pub name: String,
    pub base_url: String,
    /// Scheme, host and port of `base_url`.
    pub origin: String,
    pub manifest_url: String,
    /// Lets the application see private capabilities of others.
    #[serde(default)]
    pub scope_check_disabled: bool,
    /// Lets the application issue intents without declaring intentions.
    #[serde(default)]
    pub intention_check_disabled: bool,
    /// Forbids registering intentions at runtime.
    #[serde(default = "default_true")]
    pub intention_register_api_disabled: bool,
}

/// Capability as declared in a manifest or a registration request.
///
/// `kind` defaults to empty so a descriptor missing its type still
/// parses and is rejected by the registry with a registration error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub qualifier: Qualifier,
    #[serde(default = "default_true")]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl CapabilityDescriptor {
    /// Creates a private capability descriptor.
    pub fn new(kind: impl Into<String>, qualifier: Qualifier) -> Self {
        Self {
            kind: kind.into(),
            qualifier,
            private: true,
            description: None,
            properties: None,
        }
    }

    #[must_use]
    pub fn public(mut self) -> Self {
        self.private = false;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// Intention as declared in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentionDescriptor {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub qualifier: Qualifier,
}

impl IntentionDescriptor {
    pub fn new(kind: impl Into<String>, qualifier: Qualifier) -> Self {
        Self {
            kind: kind.into(),
            qualifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityMetadata {
    pub id: CapabilityId,
    pub app_symbolic_name: String,
}

/// A registered capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub qualifier: Qualifier,
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    pub metadata: CapabilityMetadata,
}

impl Capability {
    /// Registers `descriptor` on behalf of `app` under a fresh id.
    pub fn from_descriptor(descriptor: CapabilityDescriptor, app: impl Into<String>) -> Self {
        Self {
            kind: descriptor.kind,
            qualifier: descriptor.qualifier,
            private: descriptor.private,
            description: descriptor.description,
            properties: descriptor.properties,
            metadata: CapabilityMetadata {
                id: CapabilityId::new(),
                app_symbolic_name: app.into(),
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> CapabilityId {
        self.metadata.id
    }

    #[must_use]
    pub fn app(&self) -> &str {
        &self.metadata.app_symbolic_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentionMetadata {
    pub id: IntentionId,
    pub app_symbolic_name: String,
}

/// A registered intention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intention {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub qualifier: Qualifier,
    pub metadata: IntentionMetadata,
}

impl Intention {
    pub fn from_descriptor(descriptor: IntentionDescriptor, app: impl Into<String>) -> Self {
        Self {
            kind: descriptor.kind,
            qualifier: descriptor.qualifier,
            metadata: IntentionMetadata {
                id: IntentionId::new(),
                app_symbolic_name: app.into(),
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> IntentionId {
        self.metadata.id
    }

    #[must_use]
    pub fn app(&self) -> &str {
        &self.metadata.app_symbolic_name
    }
}

/// Manifest of a registered application, as answered by
/// `find-manifest` and `find-manifests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub symbolic_name: String,
    pub name: String,
    pub base_url: String,
    pub intentions: Vec<Intention>,
    pub capabilities: Vec<Capability>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_json() {
        let json = r#"{
            "name": "Contact App",
            "baseUrl": "http://localhost:4201",
            "intentions": [{"type": "person", "qualifier": {"id": "*"}}],
            "capabilities": [
                {"type": "contact", "qualifier": {"id": "?"}, "private": false},
                {"type": "settings"}
            ]
        }"#;

        let manifest: ApplicationManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.name, "Contact App");
        assert_eq!(manifest.base_url.as_deref(), Some("http://localhost:4201"));
        assert_eq!(manifest.intentions.len(), 1);
        assert!(!manifest.capabilities[0].private);
        assert!(manifest.capabilities[1].private, "capabilities are private by default");
        assert!(manifest.capabilities[1].qualifier.is_empty());
    }

    #[test]
    fn descriptor_missing_type_still_parses() {
        let descriptor: CapabilityDescriptor = serde_json::from_str(r#"{"private": false}"#).unwrap();
        assert!(descriptor.kind.is_empty());
    }

    #[test]
    fn registered_capability_carries_metadata() {
        let capability = Capability::from_descriptor(
            CapabilityDescriptor::new("contact", Qualifier::nil()).public(),
            "contact-app",
        );
        assert_eq!(capability.app(), "contact-app");

        let json = serde_json::to_value(&capability).unwrap();
        assert_eq!(json["metadata"]["appSymbolicName"], "contact-app");
        assert_eq!(json["type"], "contact");
    }

    #[test]
    fn application_defaults_intention_register_api_disabled() {
        let app: Application = serde_json::from_value(serde_json::json!({
            "symbolicName": "a",
            "name": "A",
            "baseUrl": "http://a.test",
            "origin": "http://a.test",
            "manifestUrl": "http://a.test/manifest.json"
        }))
        .unwrap();
        assert!(app.intention_register_api_disabled);
        assert!(!app.scope_check_disabled);
    }
}
