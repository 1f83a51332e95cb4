//! Platform startup errors.
//!
//! [`PlatformError`] collects the errors of every layer the platform
//! wires together.

use crate::broker::BrokerError;
use crate::config::ConfigError;
use mfp_message::MessagingError;
use mfp_types::ErrorCode;
use thiserror::Error;

/// Errors raised while starting or stopping a [`HostPlatform`](super::HostPlatform).
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The configuration is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The broker failed or stopped.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The platform client could not connect.
    #[error("Platform client error: {0}")]
    Client(#[from] MessagingError),
}

impl ErrorCode for PlatformError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.code(),
            Self::Broker(e) => e.code(),
            Self::Client(e) => e.code(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Broker(e) => e.is_recoverable(),
            Self::Client(e) => e.is_recoverable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts() {
        let err: PlatformError = ConfigError::Invalid("apps".into()).into();
        assert!(matches!(err, PlatformError::Config(_)));
        assert_eq!(err.code(), "CONFIG_INVALID");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn nested_errors_keep_their_codes() {
        let err: PlatformError = BrokerError::Stopped.into();
        assert_eq!(err.code(), "BROKER_STOPPED");
    }
}
