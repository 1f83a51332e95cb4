//! Topic validation and reply topics.
//!
//! Topics match exactly; there are no wildcard segments. Topics under
//! [`REPLY_TOPIC_PREFIX`] are reserved for request/reply correlation:
//! the broker accepts a publish to one only as the reply to a pending
//! request.

use crate::MessagingError;
use uuid::Uuid;

/// Prefix reserved for generated reply topics.
pub const REPLY_TOPIC_PREFIX: &str = ":reply:";

/// Generates a fresh, single-use reply topic.
///
/// ```
/// use mfp_message::{is_reply_topic, reply_topic};
///
/// let a = reply_topic();
/// let b = reply_topic();
/// assert!(is_reply_topic(&a));
/// assert_ne!(a, b);
/// ```
#[must_use]
pub fn reply_topic() -> String {
    format!("{REPLY_TOPIC_PREFIX}{}", Uuid::new_v4())
}

/// Returns `true` if `topic` lies in the reserved reply namespace.
#[must_use]
pub fn is_reply_topic(topic: &str) -> bool {
    topic.starts_with(REPLY_TOPIC_PREFIX)
}

/// Rejects empty or blank topics.
///
/// # Errors
///
/// Returns [`MessagingError::Malformed`] for a blank topic.
pub fn validate_topic(topic: &str) -> Result<(), MessagingError> {
    if topic.trim().is_empty() {
        return Err(MessagingError::Malformed(
            "Missing message topic: the topic must not be empty".into(),
        ));
    }
    Ok(())
}
