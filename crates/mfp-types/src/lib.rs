//! Core types for the microfrontend messaging platform.
//!
//! Everything here is shared by the wire model, the broker and the
//! client connector, and depends only on `serde`, `serde_json` and `uuid`.
//!
//! ```text
//! mfp-cli ──► mfp-runtime ──► mfp-message ──► mfp-types
//!                  │                              ▲
//!                  └──────────────────────────────┘
//! ```
//!
//! - [`Qualifier`] and [`matches`]: the wildcard matcher that decides
//!   which intentions, capabilities and selectors apply to an intent
//! - typed UUID ids for clients, documents, subscribers and manifest
//!   entries
//! - [`ErrorCode`]: the code/recoverability pair every error carries
//!   on the wire
//!
//! # Example
//!
//! ```
//! use mfp_types::{matches, ClientId, Qualifier};
//!
//! let client = ClientId::new();
//! println!("connected as {client}");
//!
//! let pattern = Qualifier::new().with("entity", "person").with("id", "*");
//! assert!(matches(&pattern, &Qualifier::new().with("entity", "person").with("id", 1)));
//! ```

mod error;
mod id;
mod qualifier;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{CapabilityId, ClientId, DocumentId, IntentionId, SubscriberId};
pub use qualifier::{matches, patch, Qualifier, QualifierValue, ASTERISK, OPTIONAL};
