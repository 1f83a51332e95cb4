//! Registry errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`RegistryError::CapabilityRegistration`] | `REGISTRY_CAPABILITY_REGISTRATION` | No |
//! | [`RegistryError::IntentionRegistration`] | `REGISTRY_INTENTION_REGISTRATION` | No |
//! | [`RegistryError::DuplicateApplication`] | `REGISTRY_DUPLICATE_APPLICATION` | No |
//! | [`RegistryError::InvalidUrl`] | `REGISTRY_INVALID_URL` | No |
//! | [`RegistryError::ManifestLoad`] | `REGISTRY_MANIFEST_LOAD` | Yes |
//! | [`RegistryError::ManifestParse`] | `REGISTRY_MANIFEST_PARSE` | No |

use mfp_message::MessagingError;
use mfp_types::ErrorCode;
use thiserror::Error;

/// Errors raised while building or mutating the registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{0}")]
    CapabilityRegistration(String),

    #[error("{0}")]
    IntentionRegistration(String),

    #[error("application '{0}' is already registered")]
    DuplicateApplication(String),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to load manifest '{url}': {reason}")]
    ManifestLoad { url: String, reason: String },

    #[error("failed to parse manifest '{url}': {reason}")]
    ManifestParse { url: String, reason: String },
}

impl RegistryError {
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn manifest_load(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::ManifestLoad {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn manifest_parse(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::ManifestParse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::CapabilityRegistration(_) => "REGISTRY_CAPABILITY_REGISTRATION",
            Self::IntentionRegistration(_) => "REGISTRY_INTENTION_REGISTRATION",
            Self::DuplicateApplication(_) => "REGISTRY_DUPLICATE_APPLICATION",
            Self::InvalidUrl { .. } => "REGISTRY_INVALID_URL",
            Self::ManifestLoad { .. } => "REGISTRY_MANIFEST_LOAD",
            Self::ManifestParse { .. } => "REGISTRY_MANIFEST_PARSE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::ManifestLoad { .. })
    }
}

impl From<RegistryError> for MessagingError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::CapabilityRegistration(m) => Self::CapabilityRegistration(m),
            RegistryError::IntentionRegistration(m) => Self::IntentionRegistration(m),
            other => Self::Remote {
                code: other.code().to_string(),
                message: other.to_string(),
            },
        }
    }
}
