//! Manifest loading.
//!
//! The platform does not fetch manifests itself; a [`ManifestLoader`]
//! supplies them. Malformed manifests are rejected here, before any
//! registry sees them.

use super::RegistryError;
use async_trait::async_trait;
use mfp_message::ApplicationManifest;
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// Loads application manifests.
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    /// Turns a configured manifest location into a URL.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidUrl`] if the location is not a URL.
    fn resolve(&self, manifest_url: &str) -> Result<Url, RegistryError> {
        Url::parse(manifest_url).map_err(|e| RegistryError::invalid_url(manifest_url, e))
    }

    /// Loads and parses the manifest at `url`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ManifestLoad`] if the manifest cannot be read
    /// - [`RegistryError::ManifestParse`] if it is not a valid manifest
    async fn load(&self, url: &Url) -> Result<ApplicationManifest, RegistryError>;
}

/// Loads manifests from the local filesystem.
///
/// Absolute `file:` URLs are read as is; plain paths resolve against
/// the base directory.
#[derive(Debug, Clone)]
pub struct FileManifestLoader {
    base_dir: PathBuf,
}

impl FileManifestLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl ManifestLoader for FileManifestLoader {
    fn resolve(&self, manifest_url: &str) -> Result<Url, RegistryError> {
        if let Ok(url) = Url::parse(manifest_url) {
            return Ok(url);
        }

        let mut path = self.base_dir.join(manifest_url);
        if path.is_relative() {
            let cwd = std::env::current_dir()
                .map_err(|e| RegistryError::invalid_url(manifest_url, e))?;
            path = cwd.join(path);
        }
        Url::from_file_path(&path).map_err(|()| {
            RegistryError::invalid_url(manifest_url, "not an absolute file path")
        })
    }

    async fn load(&self, url: &Url) -> Result<ApplicationManifest, RegistryError> {
        if url.scheme() != "file" {
            return Err(RegistryError::manifest_load(
                url.as_str(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        let path = url
            .to_file_path()
            .map_err(|()| RegistryError::manifest_load(url.as_str(), "not a local file"))?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RegistryError::manifest_load(url.as_str(), e))?;

        serde_json::from_str(&content).map_err(|e| RegistryError::manifest_parse(url.as_str(), e))
    }
}

/// Serves manifests from memory, keyed by URL.
///
/// Used to embed the platform without a filesystem and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticManifestLoader {
    manifests: HashMap<String, ApplicationManifest>,
}

impl StaticManifestLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `manifest` at `url`.
    #[must_use]
    pub fn with(mut self, url: impl Into<String>, manifest: ApplicationManifest) -> Self {
        self.manifests.insert(url.into(), manifest);
        self
    }
}

#[async_trait]
impl ManifestLoader for StaticManifestLoader {
    async fn load(&self, url: &Url) -> Result<ApplicationManifest, RegistryError> {
        self.manifests
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| RegistryError::manifest_load(url.as_str(), "no such manifest"))
    }
}
