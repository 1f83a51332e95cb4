//! Application registry.
//!
//! Populated once at platform startup; read-only afterwards. Lookups
//! of unknown symbolic names return `None` and callers decide whether
//! absence is an error.

use super::RegistryError;
use crate::config::ApplicationConfig;
use mfp_message::{Application, ApplicationManifest};
use tracing::warn;
use url::Url;

/// Registered applications, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ApplicationRegistry {
    applications: Vec<Application>,
}

impl ApplicationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateApplication`] if the symbolic
    /// name is taken.
    pub fn register(&mut self, application: Application) -> Result<(), RegistryError> {
        if self.get_application(&application.symbolic_name).is_some() {
            return Err(RegistryError::DuplicateApplication(
                application.symbolic_name,
            ));
        }
        self.applications.push(application);
        Ok(())
    }

    #[must_use]
    pub fn get_application(&self, symbolic_name: &str) -> Option<&Application> {
        self.applications
            .iter()
            .find(|app| app.symbolic_name == symbolic_name)
    }

    #[must_use]
    pub fn get_applications(&self) -> &[Application] {
        &self.applications
    }

    /// Unknown applications have scope checks enabled.
    #[must_use]
    pub fn is_scope_check_disabled(&self, symbolic_name: &str) -> bool {
        self.get_application(symbolic_name)
            .is_some_and(|app| app.scope_check_disabled)
    }

    /// Unknown applications have intention checks enabled.
    #[must_use]
    pub fn is_intention_check_disabled(&self, symbolic_name: &str) -> bool {
        self.get_application(symbolic_name)
            .is_some_and(|app| app.intention_check_disabled)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.applications.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

/// Builds the [`Application`] for a configured app from its manifest.
///
/// The base URL is the manifest's `baseUrl` resolved against the
/// manifest URL, or the manifest URL's directory if absent. The origin
/// is the base URL's scheme, host and port.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidUrl`] if `baseUrl` cannot be resolved.
pub fn resolve_application(
    config: &ApplicationConfig,
    manifest: &ApplicationManifest,
    manifest_url: &Url,
) -> Result<Application, RegistryError> {
    let base_url = match manifest.base_url.as_deref() {
        Some(base) => manifest_url
            .join(base)
            .map_err(|e| RegistryError::invalid_url(base, e))?,
        None => manifest_url
            .join("./")
            .map_err(|e| RegistryError::invalid_url(manifest_url.as_str(), e))?,
    };

    let origin = base_url.origin().ascii_serialization();
    if !base_url.origin().is_tuple() {
        warn!(
            app = %config.symbolic_name,
            base_url = %base_url,
            "Application base URL has an opaque origin; only documents with origin 'null' can connect"
        );
    }

    Ok(Application {
        symbolic_name: config.symbolic_name.clone(),
        name: manifest.name.clone(),
        base_url: base_url.to_string(),
        origin,
        manifest_url: manifest_url.to_string(),
        scope_check_disabled: config.scope_check_disabled,
        intention_check_disabled: config.intention_check_disabled,
        intention_register_api_disabled: config.intention_register_api_disabled,
    })
}
