//! Unified error interface for the messaging platform.
//!
//! Every error enum in the workspace implements [`ErrorCode`] so the
//! broker can put a stable, machine-readable code on the wire next to
//! the human-readable message.
//!
//! # Example
//!
//! ```
//! use mfp_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LinkError {
//!     Refused,
//!     Timeout,
//! }
//!
//! impl ErrorCode for LinkError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Refused => "LINK_REFUSED",
//!             Self::Timeout => "LINK_TIMEOUT",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Timeout)
//!     }
//! }
//!
//! let err = LinkError::Timeout;
//! assert_eq!(err.code(), "LINK_TIMEOUT");
//! assert!(err.is_recoverable());
//! ```

/// Machine-readable error code interface.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**: e.g. `"MESSAGING_TIMEOUT"`
/// - **Prefixed by layer**: `MESSAGING_`, `REGISTRY_`, `BROKER_`, `TRANSPORT_`,
///   `CONFIG_`
/// - **Stable**: codes are part of the wire contract and never change
///
/// # Recoverability
///
/// An error is recoverable when re-issuing the same operation later may
/// succeed (a broker that shows up late, a reply that was slow).
/// Protocol violations and qualification failures are not.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether re-issuing the operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Test helper: panics unless `err.code()` is non-empty UPPER_SNAKE_CASE
/// starting with `expected_prefix`.
///
/// # Example
///
/// ```
/// use mfp_types::{ErrorCode, assert_error_code};
///
/// #[derive(Debug)]
/// enum MyError { Timeout }
///
/// impl ErrorCode for MyError {
///     fn code(&self) -> &'static str { "MY_TIMEOUT" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&MyError::Timeout, "MY_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");

    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );

    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates every variant of an error enum at once.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
