//! Manifest registry commands answered by the broker itself.
//!
//! Queries answer with JSON data; mutations answer with a
//! [`StatusReply`]. The requester is always the application of the
//! issuing client, never a name taken from the command body.

use crate::registry::ManifestRegistry;
use mfp_message::{Application, Capability, ManifestCommand, MessagingError, StatusReply};
use mfp_types::{matches, patch};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

/// Executes `command` on behalf of `requester` and returns the reply body.
pub(crate) fn execute(
    registry: &mut ManifestRegistry,
    requester: &str,
    command: ManifestCommand,
) -> Value {
    debug!(app = requester, command = command.name(), "Executing manifest registry command");

    match command {
        ManifestCommand::FindManifests => {
            let manifests: Vec<_> = registry
                .applications()
                .get_applications()
                .iter()
                .filter_map(|application| registry.manifest(&application.symbolic_name))
                .collect();
            to_json(&manifests)
        }
        ManifestCommand::FindManifest { symbolic_app_name } => {
            match registry.manifest(&symbolic_app_name) {
                Some(manifest) => to_json(&manifest),
                None => {
                    error!(
                        "{}",
                        MessagingError::ApplicationNotFound(format!(
                            "No application registered with given symbolic name '{symbolic_app_name}'"
                        ))
                    );
                    Value::Null
                }
            }
        }
        ManifestCommand::FindCapabilityProviders { intent_id } => {
            let Some(intention) = registry.get_intention(intent_id) else {
                return to_json(&Vec::<Application>::new());
            };
            let mut providers: Vec<&Application> = Vec::new();
            for capability in
                registry.find_providers(intention.app(), &intention.kind, &intention.qualifier)
            {
                if providers.iter().any(|a| a.symbolic_name == capability.app()) {
                    continue;
                }
                if let Some(application) = registry.applications().get_application(capability.app())
                {
                    providers.push(application);
                }
            }
            to_json(&providers)
        }
        ManifestCommand::FindCapabilityConsumers { capability_id } => {
            let Some(capability) = registry.get_capability(capability_id) else {
                return to_json(&Vec::<Application>::new());
            };
            let consumers: Vec<&Application> = registry
                .applications()
                .get_applications()
                .iter()
                .filter(|application| is_consumer(registry, capability, &application.symbolic_name))
                .collect();
            to_json(&consumers)
        }
        ManifestCommand::FindCapability { capability_id } => {
            to_json(&registry.get_capability(capability_id))
        }
        ManifestCommand::FindCapabilities { kind, qualifier } => {
            let scope_check_disabled = registry.is_scope_check_disabled(requester);
            let capabilities: Vec<&Capability> = registry
                .find_providers(requester, &kind, &qualifier)
                .into_iter()
                .filter(|c| {
                    scope_check_disabled || registry.has_intent(requester, &c.kind, &c.qualifier)
                })
                .collect();
            to_json(&capabilities)
        }
        ManifestCommand::RegisterCapability { capability } => {
            let result = registry
                .register_capability(requester, vec![capability])
                .map(|_| ())
                .map_err(MessagingError::from);
            to_json(&StatusReply::from(result))
        }
        ManifestCommand::UnregisterCapability { kind, qualifier } => {
            let result = registry
                .unregister_capability(requester, &kind, &qualifier)
                .map(|_| ())
                .map_err(MessagingError::from);
            to_json(&StatusReply::from(result))
        }
    }
}

/// An application consumes a capability if it may see it and declared
/// an intention matching it.
fn is_consumer(registry: &ManifestRegistry, capability: &Capability, app: &str) -> bool {
    registry.is_visible_for_application(capability, app)
        && registry
            .get_intents_by_application(app)
            .into_iter()
            .filter(|intention| intention.kind == capability.kind)
            .any(|intention| {
                matches(&capability.qualifier, &patch(&intention.qualifier, &capability.qualifier))
            })
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ApplicationRegistry;
    use mfp_message::{ApplicationManifest, CapabilityDescriptor, IntentionDescriptor};
    use mfp_types::Qualifier;
    use serde_json::json;
    use std::sync::Arc;

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

    /// `provider` offers a public and a private `person` capability,
    /// `consumer` declares an intention for any person.
    fn registry() -> ManifestRegistry {
        let mut applications = ApplicationRegistry::new();
        for name in ["provider", "consumer", "bystander"] {
            applications.register(application(name)).unwrap();
        }
        let mut registry = ManifestRegistry::new(Arc::new(applications));
        registry
            .register_manifest(
                "provider",
                &ApplicationManifest {
                    name: "provider".into(),
                    base_url: None,
                    intentions: vec![],
                    capabilities: vec![
                        CapabilityDescriptor::new("person", Qualifier::new().with("id", "*"))
                            .public(),
                        CapabilityDescriptor::new("secret", Qualifier::nil()),
                    ],
                },
            )
            .unwrap();
        registry
            .register_manifest(
                "consumer",
                &ApplicationManifest {
                    name: "consumer".into(),
                    base_url: None,
                    intentions: vec![
                        IntentionDescriptor::new("person", Qualifier::new().with("id", "*")),
                        IntentionDescriptor::new("secret", Qualifier::nil()),
                    ],
                    capabilities: vec![],
                },
            )
            .unwrap();
        registry
    }

    fn capability_id(registry: &ManifestRegistry, kind: &str) -> mfp_types::CapabilityId {
        registry.get_capabilities_by_type(kind)[0].id()
    }

    #[test]
    fn find_manifests_lists_every_application() {
        let mut registry = registry();
        let reply = execute(&mut registry, "consumer", ManifestCommand::FindManifests);
        assert_eq!(reply.as_array().unwrap().len(), 3);
    }

    #[test]
    fn find_manifest_of_unknown_application_is_null() {
        let mut registry = registry();
        let reply = execute(
            &mut registry,
            "consumer",
            ManifestCommand::FindManifest {
                symbolic_app_name: "ghost".into(),
            },
        );
        assert_eq!(reply, Value::Null);

        let reply = execute(
            &mut registry,
            "consumer",
            ManifestCommand::FindManifest {
                symbolic_app_name: "provider".into(),
            },
        );
        assert_eq!(reply["symbolicName"], "provider");
        assert_eq!(reply["capabilities"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn find_capability_providers_of_intention() {
        let mut registry = registry();
        let intent_id = registry.get_intents_by_application("consumer")[0].id();
        let reply = execute(
            &mut registry,
            "bystander",
            ManifestCommand::FindCapabilityProviders { intent_id },
        );
        let providers = reply.as_array().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0]["symbolicName"], "provider");
    }

    #[test]
    fn private_capabilities_have_no_foreign_consumers() {
        let mut registry = registry();
        let public = capability_id(&registry, "person");
        let private = capability_id(&registry, "secret");

        let reply = execute(
            &mut registry,
            "consumer",
            ManifestCommand::FindCapabilityConsumers {
                capability_id: public,
            },
        );
        assert_eq!(reply, json!([to_json(&application("consumer"))]));

        let reply = execute(
            &mut registry,
            "consumer",
            ManifestCommand::FindCapabilityConsumers {
                capability_id: private,
            },
        );
        assert_eq!(reply, json!([]));
    }

    #[test]
    fn find_capabilities_requires_intention() {
        let mut registry = registry();
        let find = || ManifestCommand::FindCapabilities {
            kind: "person".into(),
            qualifier: Qualifier::new().with("id", 5),
        };

        let reply = execute(&mut registry, "consumer", find());
        assert_eq!(reply.as_array().unwrap().len(), 1);

        let reply = execute(&mut registry, "bystander", find());
        assert_eq!(reply, json!([]));
    }

    #[test]
    fn find_capability_by_id() {
        let mut registry = registry();
        let id = capability_id(&registry, "person");
        let reply = execute(
            &mut registry,
            "consumer",
            ManifestCommand::FindCapability { capability_id: id },
        );
        assert_eq!(reply["type"], "person");

        let reply = execute(
            &mut registry,
            "consumer",
            ManifestCommand::FindCapability {
                capability_id: mfp_types::CapabilityId::new(),
            },
        );
        assert_eq!(reply, Value::Null);
    }

    #[test]
    fn register_and_unregister_answer_with_status() {
        let mut registry = registry();
        let reply = execute(
            &mut registry,
            "bystander",
            ManifestCommand::RegisterCapability {
                capability: CapabilityDescriptor::new("map", Qualifier::nil()),
            },
        );
        assert_eq!(reply, json!({"status": "ok"}));
        assert_eq!(registry.get_capabilities_by_application("bystander").len(), 1);

        let reply = execute(
            &mut registry,
            "bystander",
            ManifestCommand::RegisterCapability {
                capability: CapabilityDescriptor::new("", Qualifier::nil()),
            },
        );
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["code"], "MESSAGING_CAPABILITY_REGISTRATION");

        let reply = execute(
            &mut registry,
            "bystander",
            ManifestCommand::UnregisterCapability {
                kind: "map".into(),
                qualifier: Qualifier::nil(),
            },
        );
        assert_eq!(reply, json!({"status": "ok"}));
        assert!(registry.get_capabilities_by_application("bystander").is_empty());
    }
}
