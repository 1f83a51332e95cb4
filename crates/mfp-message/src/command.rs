//! Manifest registry commands.
//!
//! Clients query and mutate the manifest registry by issuing a request
//! intent of type [`MANIFEST_REGISTRY_TYPE`] whose body names a
//! command:
//!
//! ```text
//! {"command": "find-capabilities", "type": "person", "qualifier": {"id": "*"}}
//! ```
//!
//! Older clients name the command in a `query` field instead; it is
//! accepted as a deprecated alias.

use crate::error::MessagingError;
use crate::manifest::CapabilityDescriptor;
use mfp_types::{CapabilityId, IntentionId, Qualifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Intent type answered by the broker's manifest registry.
pub const MANIFEST_REGISTRY_TYPE: &str = "manifest-registry";

const COMMAND_FIELD: &str = "command";
const DEPRECATED_COMMAND_FIELD: &str = "query";

/// A manifest registry command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ManifestCommand {
    FindManifests,
    FindManifest {
        symbolic_app_name: String,
    },
    FindCapabilityProviders {
        intent_id: IntentionId,
    },
    FindCapabilityConsumers {
        capability_id: CapabilityId,
    },
    FindCapability {
        capability_id: CapabilityId,
    },
    FindCapabilities {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        qualifier: Qualifier,
    },
    RegisterCapability {
        capability: CapabilityDescriptor,
    },
    UnregisterCapability {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        qualifier: Qualifier,
    },
}

impl ManifestCommand {
    /// Wire names of all known commands.
    pub const NAMES: [&'static str; 8] = [
        "find-manifests",
        "find-manifest",
        "find-capability-providers",
        "find-capability-consumers",
        "find-capability",
        "find-capabilities",
        "register-capability",
        "unregister-capability",
    ];

    /// Wire name of the command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::FindManifests => Self::NAMES[0],
            Self::FindManifest { .. } => Self::NAMES[1],
            Self::FindCapabilityProviders { .. } => Self::NAMES[2],
            Self::FindCapabilityConsumers { .. } => Self::NAMES[3],
            Self::FindCapability { .. } => Self::NAMES[4],
            Self::FindCapabilities { .. } => Self::NAMES[5],
            Self::RegisterCapability { .. } => Self::NAMES[6],
            Self::UnregisterCapability { .. } => Self::NAMES[7],
        }
    }

    /// Returns `true` for commands that mutate the registry.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::RegisterCapability { .. } | Self::UnregisterCapability { .. }
        )
    }

    /// Parses a command from an intent body.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::UnsupportedQuery`] if the command name is unknown
    /// - [`MessagingError::Malformed`] if the body is not a command object
    pub fn from_body(body: Option<&Value>) -> Result<Self, MessagingError> {
        let Some(Value::Object(fields)) = body else {
            return Err(MessagingError::Malformed(
                "Manifest registry command must be a JSON object".into(),
            ));
        };

        let mut fields = fields.clone();
        if !fields.contains_key(COMMAND_FIELD) {
            if let Some(name) = fields.remove(DEPRECATED_COMMAND_FIELD) {
                fields.insert(COMMAND_FIELD.to_string(), name);
            }
        }

        let name = match fields.get(COMMAND_FIELD) {
            Some(Value::String(name)) => name.clone(),
            _ => {
                return Err(MessagingError::Malformed(
                    "Manifest registry command has no 'command' field".into(),
                ))
            }
        };
        if !Self::NAMES.contains(&name.as_str()) {
            return Err(MessagingError::UnsupportedQuery(format!(
                "Manifest registry command '{name}' is not supported"
            )));
        }

        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            MessagingError::Malformed(format!("Invalid '{name}' command: {e}"))
        })
    }

    /// Serializes the command into an intent body.
    #[must_use]
    pub fn to_body(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
