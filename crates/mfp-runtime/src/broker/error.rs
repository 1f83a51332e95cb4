//! Broker control errors.
//!
//! # Error Codes
//!
//! | Code | Recoverable | Description |
//! |------|-------------|-------------|
//! | `BROKER_STOPPED` | No | The broker runner is no longer running |
//! | `BROKER_REGISTRY` | No | A registry mutation was rejected |

use crate::registry::RegistryError;
use mfp_types::ErrorCode;
use thiserror::Error;

/// Errors returned by [`BrokerHandle`](super::BrokerHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The runner stopped or dropped the reply.
    #[error("message broker is not running")]
    Stopped,

    /// The registry rejected the request.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ErrorCode for BrokerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Stopped => "BROKER_STOPPED",
            Self::Registry(_) => "BROKER_REGISTRY",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
