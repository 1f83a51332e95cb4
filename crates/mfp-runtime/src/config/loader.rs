//! Reads the file layers of a [`PlatformConfig`] and applies `MFP_*`
//! overrides on top. Missing files are skipped; a file that exists but
//! does not parse aborts the load.

use super::{
    default_config_path, ConfigError, PlatformConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Assigns a boolean `MFP_*` override to `$field` when the variable is set.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Assigns a positive millisecond `MFP_*` override to `$field`.
macro_rules! parse_env_millis {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = val
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected positive integer"))?;
        }
    };
}

/// Builds a [`PlatformConfig`] from the global file, the project file
/// and the environment.
///
/// ```ignore
/// use mfp_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/srv/portal")
///     .skip_env_vars()
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Overrides `~/.mfp/config.toml`.
    global_config_path: Option<PathBuf>,

    /// Holds `.mfp/config.toml`; no project layer when unset.
    project_root: Option<PathBuf>,

    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the global layer from `path` instead of the home directory.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Enables the project layer under `path`.
    ///
    /// Project config will be loaded from `<project_root>/.mfp/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Ignores `MFP_*` variables; used by tests.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Merges every enabled layer over the defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ReadFile`] or [`ConfigError::ParseToml`] for a
    /// present but broken file, [`ConfigError::InvalidEnvVar`] for a bad
    /// override.
    pub fn load(&self) -> Result<PlatformConfig, ConfigError> {
        let mut config = PlatformConfig::default();

        for (layer, path) in self.file_layers() {
            if let Some(overlay) = self.load_file(&path)? {
                debug!(layer, path = %path.display(), "Config layer applied");
                config.merge(&overlay);
            }
        }

        if !self.skip_env {
            self.apply_env_vars(&mut config)?;
        }

        Ok(config)
    }

    /// Candidate files, lowest priority first.
    fn file_layers(&self) -> Vec<(&'static str, PathBuf)> {
        let mut layers = Vec::with_capacity(2);
        if !self.skip_global {
            let path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);
            layers.push(("global", path));
        }
        if let (false, Some(root)) = (self.skip_project, &self.project_root) {
            layers.push((
                "project",
                root.join(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILE),
            ));
        }
        layers
    }

    fn load_file(&self, path: &Path) -> Result<Option<PlatformConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

        let config =
            PlatformConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }

    fn apply_env_vars(&self, config: &mut PlatformConfig) -> Result<(), ConfigError> {
        parse_env_bool!(config.debug, "MFP_DEBUG");

        parse_env_millis!(
            config.messaging.broker_discover_timeout_ms,
            "MFP_DISCOVER_TIMEOUT_MS"
        );
        parse_env_millis!(config.messaging.request_timeout_ms, "MFP_REQUEST_TIMEOUT_MS");

        if let Ok(val) = std::env::var("MFP_HOST_ORIGIN") {
            config.host.origin = val;
        }
        if let Ok(val) = std::env::var("MFP_HOST_APP") {
            config.host.symbolic_name = Some(val);
        }

        Ok(())
    }
}

/// `true/false`, `1/0`, `yes/no` or `on/off`, any case.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config, PlatformConfig::default());
    }

    #[test]
    fn load_global_config() {
        let temp = TempDir::new().unwrap();
        let config_path = create_config_file(
            temp.path(),
            r#"
debug = true

[messaging]
request_timeout_ms = 1500
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&config_path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .unwrap();

        assert!(config.debug);
        assert_eq!(config.messaging.request_timeout_ms, 1500);
    }

    #[test]
    fn load_project_overrides_global() {
        let global_temp = TempDir::new().unwrap();
        let project_temp = TempDir::new().unwrap();

        let global_path = create_config_file(
            global_temp.path(),
            r#"
[host]
origin = "http://global.test"

[[apps]]
symbolic_name = "global-app"
manifest_url = "global.json"
"#,
        );

        let project_dir = project_temp.path().join(PROJECT_CONFIG_DIR);
        std::fs::create_dir_all(&project_dir).unwrap();
        create_config_file(
            &project_dir,
            r#"
[host]
symbolic_name = "host-app"

[[apps]]
symbolic_name = "project-app"
manifest_url = "project.json"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&global_path)
            .with_project_root(project_temp.path())
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.host.origin, "http://global.test");
        assert_eq!(config.host.symbolic_name.as_deref(), Some("host-app"));
        assert_eq!(config.apps.len(), 1);
        assert_eq!(config.apps[0].symbolic_name, "project-app");
    }

    #[test]
    fn missing_files_are_ignored() {
        let temp = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .with_global_config(temp.path().join("nope.toml"))
            .with_project_root(temp.path())
            .skip_env_vars()
            .load()
            .unwrap();
        assert_eq!(config, PlatformConfig::default());
    }

    #[test]
    fn invalid_toml_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = create_config_file(temp.path(), "debug = [not toml");

        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .unwrap_err();

        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn env_var_override() {
        // Only test touching MFP_HOST_ORIGIN and MFP_DISCOVER_TIMEOUT_MS
        std::env::set_var("MFP_HOST_ORIGIN", "http://env.test");
        std::env::set_var("MFP_DISCOVER_TIMEOUT_MS", "250");

        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .load()
            .unwrap();

        assert_eq!(config.host.origin, "http://env.test");
        assert_eq!(config.messaging.broker_discover_timeout_ms, 250);

        std::env::set_var("MFP_DISCOVER_TIMEOUT_MS", "soon");
        let err = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));

        // Cleanup
        std::env::remove_var("MFP_HOST_ORIGIN");
        std::env::remove_var("MFP_DISCOVER_TIMEOUT_MS");
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
