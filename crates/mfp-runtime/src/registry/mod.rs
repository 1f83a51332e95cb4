//! Application and manifest registries.
//!
//! # Startup
//!
//! ```text
//! PlatformConfig.apps ──► ManifestLoader ──► resolve_application ──► ApplicationRegistry
//!                                │                                          │ (Arc, read-only)
//!                                └── manifest ─────────────────────────► ManifestRegistry
//! ```
//!
//! An application whose manifest cannot be loaded is logged and left
//! out; the platform starts with the remaining applications.

mod application;
mod error;
mod loader;
mod manifest;

pub use application::{resolve_application, ApplicationRegistry};
pub use error::RegistryError;
pub use loader::{FileManifestLoader, ManifestLoader, StaticManifestLoader};
pub use manifest::{CapabilityChange, ManifestRegistry};

use crate::config::ApplicationConfig;
use mfp_message::{Application, ApplicationManifest};
use std::sync::Arc;
use tracing::{error, info};

/// Loads manifests for `apps` and builds both registries.
///
/// `builtin` applications are registered first with their manifests
/// as given, without going through the loader.
pub async fn load_registries<'a>(
    apps: impl IntoIterator<Item = &'a ApplicationConfig>,
    loader: &dyn ManifestLoader,
    builtin: Vec<(Application, ApplicationManifest)>,
) -> ManifestRegistry {
    let mut applications = ApplicationRegistry::new();
    let mut manifests = Vec::new();

    for (application, manifest) in builtin {
        let name = application.symbolic_name.clone();
        match applications.register(application) {
            Ok(()) => manifests.push((name, manifest)),
            Err(e) => error!(app = %name, error = %e, "Failed to register built-in application"),
        }
    }

    for config in apps {
        let app = config.symbolic_name.as_str();
        let loaded = match load_application(config, loader).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(app, error = %e, "Failed to load application manifest; application is not registered");
                continue;
            }
        };
        let (application, manifest) = loaded;
        if let Err(e) = applications.register(application) {
            error!(app, error = %e, "Failed to register application");
            continue;
        }
        manifests.push((app.to_string(), manifest));
    }

    let mut registry = ManifestRegistry::new(Arc::new(applications));
    for (app, manifest) in &manifests {
        match registry.register_manifest(app, manifest) {
            Ok(()) => info!(
                app = %app,
                capabilities = manifest.capabilities.len(),
                intentions = manifest.intentions.len(),
                "Registered application"
            ),
            Err(e) => error!(app = %app, error = %e, "Failed to register application manifest"),
        }
    }
    registry
}

async fn load_application(
    config: &ApplicationConfig,
    loader: &dyn ManifestLoader,
) -> Result<(Application, ApplicationManifest), RegistryError> {
    let url = loader.resolve(&config.manifest_url)?;
    let manifest = loader.load(&url).await?;
    let application = resolve_application(config, &manifest, &url)?;
    Ok((application, manifest))
}
