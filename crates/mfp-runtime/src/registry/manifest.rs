//! Manifest registry.
//!
//! Holds the capabilities and intentions of all registered
//! applications and answers the questions the broker asks when routing
//! intents:
//!
//! - Which capabilities of a type exist? ([`get_capabilities_by_type`])
//! - May an application see a capability? ([`is_visible_for_application`])
//! - Has an application declared an intention? ([`has_intent`])
//!
//! Every mutation bumps [`revision`] and broadcasts a
//! [`CapabilityChange`].
//!
//! [`get_capabilities_by_type`]: ManifestRegistry::get_capabilities_by_type
//! [`is_visible_for_application`]: ManifestRegistry::is_visible_for_application
//! [`has_intent`]: ManifestRegistry::has_intent
//! [`revision`]: ManifestRegistry::revision

use super::{ApplicationRegistry, RegistryError};
use mfp_message::{
    ApplicationManifest, Capability, CapabilityDescriptor, Intention, IntentionDescriptor,
    Manifest,
};
use mfp_types::{matches, patch, CapabilityId, IntentionId, Qualifier};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_BUFFER_SIZE: usize = 64;

/// Notification of a registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityChange {
    /// Registry revision after the mutation.
    pub revision: u64,
    /// Application whose registrations changed.
    pub app: String,
}

/// In-memory store of capabilities and intentions.
#[derive(Debug)]
pub struct ManifestRegistry {
    applications: Arc<ApplicationRegistry>,
    capabilities: Vec<Capability>,
    intentions: Vec<Intention>,
    revision: u64,
    changes: broadcast::Sender<CapabilityChange>,
}

impl ManifestRegistry {
    #[must_use]
    pub fn new(applications: Arc<ApplicationRegistry>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER_SIZE);
        Self {
            applications,
            capabilities: Vec::new(),
            intentions: Vec::new(),
            revision: 0,
            changes,
        }
    }

    #[must_use]
    pub fn applications(&self) -> &ApplicationRegistry {
        &self.applications
    }

    /// Registers the intentions and capabilities declared in a manifest.
    ///
    /// Unlike the runtime registration API this ignores
    /// `intention_register_api_disabled`; manifests are the declared
    /// source of intentions.
    ///
    /// # Errors
    ///
    /// Fails like [`register_capability`](Self::register_capability) if
    /// the application is unknown or a descriptor has no type.
    pub fn register_manifest(
        &mut self,
        app: &str,
        manifest: &ApplicationManifest,
    ) -> Result<(), RegistryError> {
        self.ensure_known(app, RegistryError::CapabilityRegistration)?;
        validate_types(
            manifest.intentions.iter().map(|i| i.kind.as_str()),
            RegistryError::IntentionRegistration,
        )?;
        validate_types(
            manifest.capabilities.iter().map(|c| c.kind.as_str()),
            RegistryError::CapabilityRegistration,
        )?;

        self.intentions.extend(
            manifest
                .intentions
                .iter()
                .cloned()
                .map(|descriptor| Intention::from_descriptor(descriptor, app)),
        );
        self.capabilities.extend(
            manifest
                .capabilities
                .iter()
                .cloned()
                .map(|descriptor| Capability::from_descriptor(descriptor, app)),
        );
        self.changed(app);
        Ok(())
    }

    /// Registers capabilities on behalf of `app`.
    ///
    /// Either all descriptors are registered or none.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapabilityRegistration`] if the
    /// application is unknown or a descriptor has no type.
    pub fn register_capability(
        &mut self,
        app: &str,
        descriptors: Vec<CapabilityDescriptor>,
    ) -> Result<Vec<CapabilityId>, RegistryError> {
        self.ensure_known(app, RegistryError::CapabilityRegistration)?;
        validate_types(
            descriptors.iter().map(|d| d.kind.as_str()),
            RegistryError::CapabilityRegistration,
        )?;

        let registered: Vec<Capability> = descriptors
            .into_iter()
            .map(|descriptor| Capability::from_descriptor(descriptor, app))
            .collect();
        let ids = registered.iter().map(Capability::id).collect();
        debug!(app, count = registered.len(), "Registered capabilities");
        self.capabilities.extend(registered);
        self.changed(app);
        Ok(ids)
    }

    /// Removes capabilities of `app` with the given type and qualifier.
    ///
    /// Capabilities owned by other applications are never touched and
    /// their existence is not revealed: removing nothing is not an
    /// error. Returns the number of removed capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapabilityRegistration`] if the
    /// application is unknown or the type is empty.
    pub fn unregister_capability(
        &mut self,
        app: &str,
        kind: &str,
        qualifier: &Qualifier,
    ) -> Result<usize, RegistryError> {
        self.ensure_known(app, RegistryError::CapabilityRegistration)?;
        validate_types([kind], RegistryError::CapabilityRegistration)?;

        let before = self.capabilities.len();
        self.capabilities.retain(|capability| {
            !(capability.app() == app
                && capability.kind == kind
                && capability.qualifier == *qualifier)
        });
        let removed = before - self.capabilities.len();
        if removed > 0 {
            debug!(app, kind, removed, "Unregistered capabilities");
            self.changed(app);
        }
        Ok(removed)
    }

    /// Registers intentions on behalf of `app` at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IntentionRegistration`] if the
    /// application is unknown, has the intention registration API
    /// disabled, or a descriptor has no type.
    pub fn register_intention(
        &mut self,
        app: &str,
        descriptors: Vec<IntentionDescriptor>,
    ) -> Result<Vec<IntentionId>, RegistryError> {
        self.ensure_intention_api(app)?;
        validate_types(
            descriptors.iter().map(|d| d.kind.as_str()),
            RegistryError::IntentionRegistration,
        )?;

        let registered: Vec<Intention> = descriptors
            .into_iter()
            .map(|descriptor| Intention::from_descriptor(descriptor, app))
            .collect();
        let ids = registered.iter().map(Intention::id).collect();
        self.intentions.extend(registered);
        self.changed(app);
        Ok(ids)
    }

    /// Removes intentions of `app` with the given type and qualifier.
    ///
    /// # Errors
    ///
    /// Same conditions as [`register_intention`](Self::register_intention).
    pub fn unregister_intention(
        &mut self,
        app: &str,
        kind: &str,
        qualifier: &Qualifier,
    ) -> Result<usize, RegistryError> {
        self.ensure_intention_api(app)?;

        let before = self.intentions.len();
        self.intentions.retain(|intention| {
            !(intention.app() == app && intention.kind == kind && intention.qualifier == *qualifier)
        });
        let removed = before - self.intentions.len();
        if removed > 0 {
            self.changed(app);
        }
        Ok(removed)
    }

    #[must_use]
    pub fn get_capabilities_by_type(&self, kind: &str) -> Vec<&Capability> {
        self.capabilities.iter().filter(|c| c.kind == kind).collect()
    }

    #[must_use]
    pub fn get_capabilities_by_application(&self, app: &str) -> Vec<&Capability> {
        self.capabilities.iter().filter(|c| c.app() == app).collect()
    }

    #[must_use]
    pub fn get_capability(&self, id: CapabilityId) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.id() == id)
    }

    /// Declared intentions of `app`; implicit intentions for its own
    /// capabilities are not listed.
    #[must_use]
    pub fn get_intents_by_application(&self, app: &str) -> Vec<&Intention> {
        self.intentions.iter().filter(|i| i.app() == app).collect()
    }

    #[must_use]
    pub fn get_intention(&self, id: IntentionId) -> Option<&Intention> {
        self.intentions.iter().find(|i| i.id() == id)
    }

    /// Returns `true` if `app` may issue intents of `kind` and `qualifier`.
    ///
    /// An application holds a declared intention whose qualifier
    /// matches, or implicitly an intention for each of its own
    /// capabilities.
    #[must_use]
    pub fn has_intent(&self, app: &str, kind: &str, qualifier: &Qualifier) -> bool {
        let declared = self
            .intentions
            .iter()
            .filter(|i| i.app() == app && i.kind == kind)
            .any(|i| matches(&i.qualifier, qualifier));

        declared
            || self
                .capabilities
                .iter()
                .filter(|c| c.app() == app && c.kind == kind)
                .any(|c| matches(&c.qualifier, &patch(qualifier, &c.qualifier)))
    }

    /// Returns `true` if `app` may see `capability`: it is public, `app`
    /// owns it, or its owner has scope checks disabled.
    #[must_use]
    pub fn is_visible_for_application(&self, capability: &Capability, app: &str) -> bool {
        !capability.private
            || capability.app() == app
            || self.is_scope_check_disabled(capability.app())
    }

    #[must_use]
    pub fn is_scope_check_disabled(&self, app: &str) -> bool {
        self.applications.is_scope_check_disabled(app)
    }

    /// Capabilities of `kind` visible to `app` whose qualifier matches
    /// `qualifier` after patching.
    #[must_use]
    pub fn find_providers(&self, app: &str, kind: &str, qualifier: &Qualifier) -> Vec<&Capability> {
        self.get_capabilities_by_type(kind)
            .into_iter()
            .filter(|c| self.is_visible_for_application(c, app))
            .filter(|c| matches(&c.qualifier, &patch(qualifier, &c.qualifier)))
            .collect()
    }

    /// Manifest view of a registered application.
    #[must_use]
    pub fn manifest(&self, app: &str) -> Option<Manifest> {
        let application = self.applications.get_application(app)?;
        Some(Manifest {
            symbolic_name: application.symbolic_name.clone(),
            name: application.name.clone(),
            base_url: application.base_url.clone(),
            intentions: self
                .get_intents_by_application(app)
                .into_iter()
                .cloned()
                .collect(),
            capabilities: self
                .get_capabilities_by_application(app)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Subscribes to capability change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CapabilityChange> {
        self.changes.subscribe()
    }

    fn ensure_known(
        &self,
        app: &str,
        error: fn(String) -> RegistryError,
    ) -> Result<(), RegistryError> {
        if self.applications.get_application(app).is_none() {
            return Err(error(format!(
                "Application '{app}' is not registered"
            )));
        }
        Ok(())
    }

    fn ensure_intention_api(&self, app: &str) -> Result<(), RegistryError> {
        match self.applications.get_application(app) {
            None => Err(RegistryError::IntentionRegistration(format!(
                "Application '{app}' is not registered"
            ))),
            Some(application) if application.intention_register_api_disabled => {
                Err(RegistryError::IntentionRegistration(format!(
                    "Intention registration API is disabled for application '{app}'"
                )))
            }
            Some(_) => Ok(()),
        }
    }

    fn changed(&mut self, app: &str) {
        self.revision += 1;
        // No receivers is fine
        let _ = self.changes.send(CapabilityChange {
            revision: self.revision,
            app: app.to_string(),
        });
    }
}

fn validate_types<'a>(
    kinds: impl IntoIterator<Item = &'a str>,
    error: fn(String) -> RegistryError,
) -> Result<(), RegistryError> {
    if kinds.into_iter().any(|kind| kind.trim().is_empty()) {
        return Err(error("Missing required 'type' property".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfp_message::Application;

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

    fn registry_with(apps: Vec<Application>) -> ManifestRegistry {
        let mut applications = ApplicationRegistry::new();
        for app in apps {
            applications.register(app).unwrap();
        }
        ManifestRegistry::new(Arc::new(applications))
    }

    fn person(id: impl Into<mfp_types::QualifierValue>) -> Qualifier {
        Qualifier::new().with("entity", "person").with("id", id)
    }

    #[test]
    fn register_unknown_application_fails() {
        let mut registry = registry_with(vec![]);
        let err = registry
            .register_capability("ghost", vec![CapabilityDescriptor::new("x", Qualifier::nil())])
            .unwrap_err();
        assert!(matches!(err, RegistryError::CapabilityRegistration(_)));
    }

    #[test]
    fn register_without_type_fails_atomically() {
        let mut registry = registry_with(vec![application("a")]);
        let err = registry
            .register_capability(
                "a",
                vec![
                    CapabilityDescriptor::new("ok", Qualifier::nil()),
                    CapabilityDescriptor::new("", Qualifier::nil()),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::CapabilityRegistration(_)));
        assert!(registry.get_capabilities_by_application("a").is_empty());
        assert_eq!(registry.revision(), 0);
    }

    #[test]
    fn unregister_only_touches_own_capabilities() {
        let mut registry = registry_with(vec![application("a"), application("b")]);
        registry
            .register_capability("a", vec![CapabilityDescriptor::new("view", person("*"))])
            .unwrap();

        let removed = registry.unregister_capability("b", "view", &person("*")).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(registry.get_capabilities_by_type("view").len(), 1);

        let removed = registry.unregister_capability("a", "view", &person("*")).unwrap();
        assert_eq!(removed, 1);
        assert!(registry.get_capabilities_by_type("view").is_empty());
    }

    #[test]
    fn has_intent_checks_declared_intentions() {
        let mut registry = registry_with(vec![application("a")]);
        registry
            .register_manifest(
                "a",
                &ApplicationManifest {
                    name: "A".into(),
                    base_url: None,
                    intentions: vec![IntentionDescriptor::new("view", person("*"))],
                    capabilities: vec![],
                },
            )
            .unwrap();

        assert!(registry.has_intent("a", "view", &person(5)));
        assert!(!registry.has_intent("a", "view", &Qualifier::new().with("entity", "person")));
        assert!(!registry.has_intent("a", "edit", &person(5)));
    }

    #[test]
    fn own_capabilities_grant_implicit_intention() {
        let mut registry = registry_with(vec![application("a")]);
        registry
            .register_capability("a", vec![CapabilityDescriptor::new("view", person("*"))])
            .unwrap();

        assert!(registry.has_intent("a", "view", &person(5)));
        assert!(registry.get_intents_by_application("a").is_empty());
    }

    #[test]
    fn visibility_rules() {
        let mut owner_without_checks = application("open");
        owner_without_checks.scope_check_disabled = true;
        let mut registry =
            registry_with(vec![application("a"), application("b"), owner_without_checks]);

        registry
            .register_capability("a", vec![CapabilityDescriptor::new("private", Qualifier::nil())])
            .unwrap();
        registry
            .register_capability(
                "a",
                vec![CapabilityDescriptor::new("public", Qualifier::nil()).public()],
            )
            .unwrap();
        registry
            .register_capability("open", vec![CapabilityDescriptor::new("private", Qualifier::nil())])
            .unwrap();

        let private_of_a = registry
            .get_capabilities_by_application("a")
            .into_iter()
            .find(|c| c.kind == "private")
            .unwrap()
            .clone();
        let public_of_a = registry.get_capabilities_by_type("public")[0].clone();
        let private_of_open = registry.get_capabilities_by_application("open")[0].clone();

        assert!(registry.is_visible_for_application(&private_of_a, "a"));
        assert!(!registry.is_visible_for_application(&private_of_a, "b"));
        assert!(registry.is_visible_for_application(&public_of_a, "b"));
        assert!(registry.is_visible_for_application(&private_of_open, "b"));
    }

    #[test]
    fn find_providers_patches_wildcards() {
        let mut registry = registry_with(vec![application("a"), application("b")]);
        registry
            .register_capability(
                "a",
                vec![CapabilityDescriptor::new("view", person(42)).public()],
            )
            .unwrap();

        assert_eq!(registry.find_providers("b", "view", &person("*")).len(), 1);
        assert_eq!(registry.find_providers("b", "view", &person(42)).len(), 1);
        assert!(registry.find_providers("b", "view", &person(7)).is_empty());
        assert_eq!(registry.find_providers("b", "view", &Qualifier::any()).len(), 1);
    }

    #[test]
    fn intention_api_respects_flag() {
        let mut open = application("open");
        open.intention_register_api_disabled = false;
        let mut registry = registry_with(vec![application("closed"), open]);

        let err = registry
            .register_intention("closed", vec![IntentionDescriptor::new("view", Qualifier::nil())])
            .unwrap_err();
        assert!(matches!(err, RegistryError::IntentionRegistration(_)));

        registry
            .register_intention("open", vec![IntentionDescriptor::new("view", Qualifier::nil())])
            .unwrap();
        assert!(registry.has_intent("open", "view", &Qualifier::nil()));

        let removed = registry
            .unregister_intention("open", "view", &Qualifier::nil())
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!registry.has_intent("open", "view", &Qualifier::nil()));
    }

    #[test]
    fn mutations_broadcast_changes() {
        let mut registry = registry_with(vec![application("a")]);
        let mut changes = registry.subscribe();

        registry
            .register_capability("a", vec![CapabilityDescriptor::new("view", Qualifier::nil())])
            .unwrap();
        registry
            .unregister_capability("a", "view", &Qualifier::nil())
            .unwrap();
        // Removing nothing is silent
        registry
            .unregister_capability("a", "view", &Qualifier::nil())
            .unwrap();

        assert_eq!(changes.try_recv().unwrap().revision, 1);
        assert_eq!(changes.try_recv().unwrap().revision, 2);
        assert!(changes.try_recv().is_err());
        assert_eq!(registry.revision(), 2);
    }

    #[test]
    fn manifest_view() {
        let mut registry = registry_with(vec![application("a")]);
        registry
            .register_capability("a", vec![CapabilityDescriptor::new("view", Qualifier::nil())])
            .unwrap();

        let manifest = registry.manifest("a").unwrap();
        assert_eq!(manifest.symbolic_name, "a");
        assert_eq!(manifest.capabilities.len(), 1);
        assert!(registry.manifest("ghost").is_none());
    }
}
