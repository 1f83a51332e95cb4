//! Configuration errors.
//!
//! # Error Codes
//!
//! | Code | Recoverable | Description |
//! |------|-------------|-------------|
//! | `CONFIG_READ_FILE` | No | A config file exists but cannot be read |
//! | `CONFIG_PARSE_TOML` | No | A config file is not valid TOML |
//! | `CONFIG_INVALID_ENV_VAR` | No | An `MFP_*` variable holds a bad value |
//! | `CONFIG_INVALID` | No | Duplicate apps, blank names or zero timeouts |

use mfp_types::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a [`PlatformConfig`](super::PlatformConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A platform config file exists but could not be read.
    #[error("cannot read platform config {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A platform config file is not valid TOML or has unknown shape.
    #[error("malformed platform config {}: {source}", path.display())]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An `MFP_*` override could not be applied.
    #[error("environment override {name} rejected: {message}")]
    InvalidEnvVar { name: String, message: String },

    /// The merged configuration fails validation.
    #[error("platform config rejected: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// I/O failure on `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Syntax or schema failure in `path`.
    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "CONFIG_READ_FILE",
            Self::ParseToml { .. } => "CONFIG_PARSE_TOML",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
            Self::Invalid(_) => "CONFIG_INVALID",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
