//! Configuration types.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Platform configuration after merging all layers.
///
/// # Example
///
/// ```
/// use mfp_runtime::config::PlatformConfig;
///
/// let config = PlatformConfig::from_toml(r#"
/// [host]
/// origin = "http://localhost:4200"
///
/// [[apps]]
/// symbolic_name = "contact-app"
/// manifest_url = "manifests/contact.json"
/// "#).unwrap();
///
/// assert_eq!(config.apps.len(), 1);
/// assert_eq!(config.messaging.broker_discover_timeout_ms, 10_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    /// Enable debug mode.
    pub debug: bool,

    /// Host document settings.
    pub host: HostConfig,

    /// Messaging timeouts.
    pub messaging: MessagingConfig,

    /// Applications to register at startup.
    pub apps: Vec<ApplicationConfig>,
}

impl PlatformConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default. A non-empty `apps` list replaces the
    /// current one.
    pub fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.debug != default.debug {
            self.debug = other.debug;
        }

        self.host.merge(&other.host);
        self.messaging.merge(&other.messaging);

        if !other.apps.is_empty() {
            self.apps.clone_from(&other.apps);
        }
    }

    /// Applications that are not excluded.
    pub fn active_apps(&self) -> impl Iterator<Item = &ApplicationConfig> {
        self.apps.iter().filter(|app| !app.exclude)
    }

    /// Checks constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for blank or duplicate symbolic
    /// names, blank manifest URLs, or zero timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for app in &self.apps {
            if app.symbolic_name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "application without symbolic_name".into(),
                ));
            }
            if app.manifest_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "application '{}' has no manifest_url",
                    app.symbolic_name
                )));
            }
            if !seen.insert(app.symbolic_name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "application '{}' is configured twice",
                    app.symbolic_name
                )));
            }
        }
        if self.messaging.broker_discover_timeout_ms == 0 || self.messaging.request_timeout_ms == 0
        {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }
}

/// Host document configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Origin of the host document. The built-in platform client and
    /// the host application connect from here.
    pub origin: String,

    /// Application connecting through the host document, if any.
    pub symbolic_name: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:4200".into(),
            symbolic_name: None,
        }
    }
}

impl HostConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.origin != default.origin {
            self.origin.clone_from(&other.origin);
        }
        if other.symbolic_name.is_some() {
            self.symbolic_name.clone_from(&other.symbolic_name);
        }
    }
}

/// Messaging timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessagingConfig {
    /// How long a client waits for the connect handshake.
    pub broker_discover_timeout_ms: u64,

    /// How long a request waits for its reply.
    pub request_timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            broker_discover_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl MessagingConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.broker_discover_timeout_ms != default.broker_discover_timeout_ms {
            self.broker_discover_timeout_ms = other.broker_discover_timeout_ms;
        }
        if other.request_timeout_ms != default.request_timeout_ms {
            self.request_timeout_ms = other.request_timeout_ms;
        }
    }

    #[must_use]
    pub fn broker_discover_timeout(&self) -> Duration {
        Duration::from_millis(self.broker_discover_timeout_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// An application to register at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    pub symbolic_name: String,

    /// URL or path of the manifest JSON. Relative paths resolve against
    /// the manifest base directory of the loader.
    pub manifest_url: String,

    #[serde(default)]
    pub scope_check_disabled: bool,

    #[serde(default)]
    pub intention_check_disabled: bool,

    #[serde(default = "default_true")]
    pub intention_register_api_disabled: bool,

    /// Keep the entry but do not register the application.
    #[serde(default)]
    pub exclude: bool,
}

impl ApplicationConfig {
    pub fn new(symbolic_name: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            manifest_url: manifest_url.into(),
            scope_check_disabled: false,
            intention_check_disabled: false,
            intention_register_api_disabled: true,
            exclude: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PlatformConfig::default();
        assert!(!config.debug);
        assert_eq!(config.host.origin, "http://localhost:4200");
        assert_eq!(config.messaging.request_timeout_ms, 30_000);
        assert!(config.apps.is_empty());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = PlatformConfig::default();
        config
            .apps
            .push(ApplicationConfig::new("app-a", "file:///tmp/a.json"));
        let toml = config.to_toml().unwrap();
        let restored = PlatformConfig::from_toml(&toml).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn app_flags_default() {
        let config = PlatformConfig::from_toml(
            r#"
[[apps]]
symbolic_name = "a"
manifest_url = "a.json"
"#,
        )
        .unwrap();
        let app = &config.apps[0];
        assert!(!app.scope_check_disabled);
        assert!(!app.intention_check_disabled);
        assert!(app.intention_register_api_disabled);
        assert!(!app.exclude);
    }

    #[test]
    fn merge_overrides_non_default() {
        let mut base = PlatformConfig::default();
        base.apps.push(ApplicationConfig::new("base", "base.json"));

        let overlay = PlatformConfig {
            host: HostConfig {
                symbolic_name: Some("host-app".into()),
                ..Default::default()
            },
            messaging: MessagingConfig {
                request_timeout_ms: 500,
                ..Default::default()
            },
            ..Default::default()
        };

        base.merge(&overlay);

        assert_eq!(base.host.symbolic_name.as_deref(), Some("host-app"));
        assert_eq!(base.host.origin, "http://localhost:4200");
        assert_eq!(base.messaging.request_timeout_ms, 500);
        assert_eq!(base.messaging.broker_discover_timeout_ms, 10_000);
        assert_eq!(base.apps.len(), 1, "empty overlay keeps apps");
    }

    #[test]
    fn merge_replaces_apps() {
        let mut base = PlatformConfig::default();
        base.apps.push(ApplicationConfig::new("base", "base.json"));

        let mut overlay = PlatformConfig::default();
        overlay.apps.push(ApplicationConfig::new("other", "other.json"));

        base.merge(&overlay);
        assert_eq!(base.apps.len(), 1);
        assert_eq!(base.apps[0].symbolic_name, "other");
    }

    #[test]
    fn validate_rejects_duplicates() {
        let mut config = PlatformConfig::default();
        config.apps.push(ApplicationConfig::new("a", "a.json"));
        config.apps.push(ApplicationConfig::new("a", "b.json"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = PlatformConfig::default();
        config.messaging.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn active_apps_skips_excluded() {
        let mut config = PlatformConfig::default();
        config.apps.push(ApplicationConfig::new("a", "a.json"));
        let mut excluded = ApplicationConfig::new("b", "b.json");
        excluded.exclude = true;
        config.apps.push(excluded);

        let names: Vec<_> = config.active_apps().map(|a| a.symbolic_name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
