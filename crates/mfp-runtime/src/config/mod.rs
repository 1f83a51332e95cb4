//! Platform configuration.
//!
//! A [`PlatformConfig`] names the host document, the messaging timeouts
//! and the applications whose manifests the broker registers. Sources
//! are merged in order, later ones winning field by field:
//!
//! ```text
//! defaults ─► ~/.mfp/config.toml ─► <project>/.mfp/config.toml ─► MFP_* env
//! ```
//!
//! Application lists are not merged: a layer that names any `[[apps]]`
//! replaces the list of the layers below it.
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `MFP_DEBUG` | `debug` | bool |
//! | `MFP_HOST_ORIGIN` | `host.origin` | String |
//! | `MFP_HOST_APP` | `host.symbolic_name` | String |
//! | `MFP_DISCOVER_TIMEOUT_MS` | `messaging.broker_discover_timeout_ms` | u64 |
//! | `MFP_REQUEST_TIMEOUT_MS` | `messaging.request_timeout_ms` | u64 |
//!
//! # Example Configuration
//!
//! ```toml
//! # <project>/.mfp/config.toml
//!
//! [host]
//! origin = "http://localhost:4200"
//! symbolic_name = "host-app"
//!
//! [messaging]
//! broker_discover_timeout_ms = 10000
//! request_timeout_ms = 30000
//!
//! [[apps]]
//! symbolic_name = "host-app"
//! manifest_url = "manifests/host.json"
//!
//! [[apps]]
//! symbolic_name = "contact-app"
//! manifest_url = "http://localhost:4201/manifest.json"
//! scope_check_disabled = true
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{ApplicationConfig, HostConfig, MessagingConfig, PlatformConfig};

use std::path::PathBuf;

/// Directory holding platform config, both under the user's home and
/// under a project root.
pub const PROJECT_CONFIG_DIR: &str = ".mfp";

/// File name of a platform config layer.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";

/// `~/.mfp/config.toml`, or `./.mfp/config.toml` without a home directory.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROJECT_CONFIG_DIR)
        .join(PROJECT_CONFIG_FILE)
}
