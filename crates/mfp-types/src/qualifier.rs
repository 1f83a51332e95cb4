//! Qualifiers and wildcard matching.
//!
//! A [`Qualifier`] is a dictionary of string keys to scalar values that
//! narrows an intent or capability beyond its type. Two wildcard values
//! are understood:
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `*`   | key must be present, any value |
//! | `?`   | key may be absent, any value |
//!
//! A pattern holding the pair `"*": "*"` is lenient: the candidate may
//! carry keys the pattern does not mention.
//!
//! Matching is split into two pure functions:
//!
//! - [`matches`]: tests a candidate against a pattern
//! - [`patch`]: resolves an intent's wildcards against a capability
//!   qualifier, producing a concrete candidate for [`matches`]
//!
//! ```
//! use mfp_types::{matches, patch, Qualifier};
//!
//! let capability = Qualifier::new().with("entity", "person").with("id", "*");
//! let intent = Qualifier::new().with("entity", "person").with("id", 42);
//! assert!(matches(&capability, &patch(&intent, &capability)));
//!
//! assert!(matches(&Qualifier::any(), &intent));
//! assert!(!matches(&Qualifier::nil(), &intent));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wildcard value requiring the key to be present with any value.
pub const ASTERISK: &str = "*";

/// Wildcard value allowing the key to be absent.
pub const OPTIONAL: &str = "?";

/// A scalar qualifier value.
///
/// Equality is type-sensitive: `"1"`, `1` and `true` are all distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualifierValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl QualifierValue {
    /// Returns `true` for the `*` wildcard.
    #[must_use]
    pub fn is_asterisk(&self) -> bool {
        matches!(self, Self::Text(s) if s == ASTERISK)
    }

    /// Returns `true` for the `?` wildcard.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Text(s) if s == OPTIONAL)
    }

    /// Returns `true` for either wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.is_asterisk() || self.is_optional()
    }
}

impl std::fmt::Display for QualifierValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<&str> for QualifierValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for QualifierValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for QualifierValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for QualifierValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<i32> for QualifierValue {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for QualifierValue {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

/// Key/value dictionary narrowing an intent or capability.
///
/// Key order is irrelevant; the map is kept sorted so equal qualifiers
/// serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qualifier(BTreeMap<String, QualifierValue>);

impl Qualifier {
    /// Creates an empty qualifier.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The nil qualifier `{}`: matches only candidates without keys.
    #[must_use]
    pub fn nil() -> Self {
        Self::new()
    }

    /// The any qualifier `{"*": "*"}`: matches every candidate.
    #[must_use]
    pub fn any() -> Self {
        Self::new().with(ASTERISK, ASTERISK)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QualifierValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QualifierValue>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&QualifierValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &QualifierValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the qualifier carries the `"*": "*"` pair.
    #[must_use]
    pub fn is_lenient(&self) -> bool {
        self.get(ASTERISK).is_some_and(QualifierValue::is_asterisk)
    }

    /// Returns `true` if any value is a wildcard.
    #[must_use]
    pub fn has_wildcards(&self) -> bool {
        self.0.values().any(QualifierValue::is_wildcard)
    }
}

impl<K: Into<String>, V: Into<QualifierValue>> FromIterator<(K, V)> for Qualifier {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl std::fmt::Display for Qualifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Tests `candidate` against `pattern`.
///
/// - Unless `pattern` is lenient, `candidate` must not carry keys absent
///   from `pattern`.
/// - `*` requires the key to be present.
/// - `?` accepts presence or absence.
/// - Any other value requires an equal value under the same key.
#[must_use]
pub fn matches(pattern: &Qualifier, candidate: &Qualifier) -> bool {
    let lenient = pattern.is_lenient();

    if !lenient && candidate.keys().any(|key| !pattern.contains_key(key)) {
        return false;
    }

    pattern
        .iter()
        .filter(|(key, value)| !(lenient && key.as_str() == ASTERISK && value.is_asterisk()))
        .all(|(key, expected)| match candidate.get(key) {
            _ if expected.is_optional() => true,
            Some(_) if expected.is_asterisk() => true,
            Some(actual) => expected == actual,
            None => false,
        })
}

/// Resolves the wildcards of an intent qualifier against a capability
/// qualifier.
///
/// The result is used only as the candidate of [`matches`] with the
/// capability qualifier as pattern; it is never stored.
///
/// - A wildcard value takes the capability's value for that key, if any.
/// - A `?` value for a key the capability lacks is dropped.
/// - A `"*": "*"` pair is replaced by every capability key the intent
///   does not mention.
#[must_use]
pub fn patch(intent: &Qualifier, capability: &Qualifier) -> Qualifier {
    let mut patched = Qualifier::new();

    for (key, value) in intent.iter() {
        if key == ASTERISK && value.is_asterisk() {
            continue;
        }
        if !value.is_wildcard() {
            patched.insert(key.clone(), value.clone());
            continue;
        }
        match capability.get(key) {
            Some(provided) => patched.insert(key.clone(), provided.clone()),
            None if value.is_asterisk() => patched.insert(key.clone(), value.clone()),
            None => {}
        }
    }

    if intent.is_lenient() {
        for (key, value) in capability.iter() {
            if !patched.contains_key(key) {
                patched.insert(key.clone(), value.clone());
            }
        }
    }

    patched
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q(pairs: &[(&str, QualifierValue)]) -> Qualifier {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn any_qualifier_matches_everything() {
        assert!(matches(&Qualifier::any(), &Qualifier::nil()));
        assert!(matches(&Qualifier::any(), &Qualifier::new().with("a", 1)));
        assert!(matches(
            &Qualifier::any(),
            &Qualifier::new().with("a", "x").with("b", true)
        ));
    }

    #[test]
    fn nil_qualifier_matches_only_nil() {
        assert!(matches(&Qualifier::nil(), &Qualifier::nil()));
        assert!(!matches(&Qualifier::nil(), &Qualifier::new().with("a", 1)));
    }

    #[test]
    fn optional_wildcard_allows_absence() {
        let pattern = Qualifier::new().with("a", OPTIONAL);
        assert!(matches(&pattern, &Qualifier::nil()));
        assert!(matches(&pattern, &Qualifier::new().with("a", "anything")));
    }

    #[test]
    fn asterisk_wildcard_requires_presence() {
        let pattern = Qualifier::new().with("a", ASTERISK);
        assert!(!matches(&pattern, &Qualifier::nil()));
        assert!(matches(&pattern, &Qualifier::new().with("a", 7)));
    }

    #[test]
    fn literal_values_are_type_sensitive() {
        let pattern = Qualifier::new().with("id", 1);
        assert!(matches(&pattern, &Qualifier::new().with("id", 1)));
        assert!(!matches(&pattern, &Qualifier::new().with("id", "1")));
        assert!(!matches(&pattern, &Qualifier::new().with("id", true)));
        assert!(!matches(&pattern, &Qualifier::new().with("id", 2)));
    }

    #[test]
    fn strict_pattern_rejects_extra_keys() {
        let pattern = Qualifier::new().with("entity", "person");
        let candidate = Qualifier::new().with("entity", "person").with("id", 5);
        assert!(!matches(&pattern, &candidate));

        let lenient = pattern.clone().with(ASTERISK, ASTERISK);
        assert!(matches(&lenient, &candidate));
    }

    #[test]
    fn patch_substitutes_capability_values() {
        let capability = Qualifier::new().with("entity", "person").with("id", 5);
        let intent = Qualifier::new().with("entity", "person").with("id", ASTERISK);

        let patched = patch(&intent, &capability);
        assert_eq!(patched, capability);
        assert!(matches(&capability, &patched));
    }

    #[test]
    fn patch_drops_optional_keys_the_capability_lacks() {
        let capability = Qualifier::new().with("entity", "person");
        let intent = Qualifier::new().with("entity", "person").with("id", OPTIONAL);

        let patched = patch(&intent, &capability);
        assert_eq!(patched, capability);
        assert!(matches(&capability, &patched));
    }

    #[test]
    fn patch_keeps_required_keys_the_capability_lacks() {
        let capability = Qualifier::new().with("entity", "person");
        let intent = Qualifier::new().with("entity", "person").with("id", ASTERISK);

        let patched = patch(&intent, &capability);
        assert!(patched.contains_key("id"));
        assert!(!matches(&capability, &patched));
    }

    #[test]
    fn patch_any_qualifier_expands_to_capability() {
        let capability = Qualifier::new().with("entity", "person").with("id", ASTERISK);
        let patched = patch(&Qualifier::any(), &capability);
        assert_eq!(patched, capability);
        assert!(matches(&capability, &patched));
    }

    #[test]
    fn patch_keeps_literal_mismatch() {
        let capability = Qualifier::new().with("entity", "company");
        let intent = Qualifier::new().with("entity", "person").with(ASTERISK, ASTERISK);
        assert!(!matches(&capability, &patch(&intent, &capability)));
    }

    #[test]
    fn deserializes_mixed_values() {
        let parsed: Qualifier =
            serde_json::from_str(r#"{"entity":"person","id":42,"active":true}"#).unwrap();
        assert_eq!(
            parsed,
            q(&[
                ("entity", "person".into()),
                ("id", 42i64.into()),
                ("active", true.into()),
            ])
        );
    }

    #[test]
    fn display_is_sorted() {
        let qualifier = Qualifier::new().with("b", 2).with("a", "x");
        assert_eq!(qualifier.to_string(), "{a: 'x', b: 2}");
    }

    fn value_strategy() -> impl Strategy<Value = QualifierValue> {
        prop_oneof![
            any::<bool>().prop_map(QualifierValue::Bool),
            any::<i64>().prop_map(QualifierValue::from),
            "[a-z]{1,6}".prop_map(QualifierValue::Text),
            Just(QualifierValue::from(ASTERISK)),
            Just(QualifierValue::from(OPTIONAL)),
        ]
    }

    fn qualifier_strategy() -> impl Strategy<Value = Qualifier> {
        prop::collection::btree_map("[a-d]", value_strategy(), 0..4).prop_map(Qualifier)
    }

    proptest! {
        #[test]
        fn matching_is_reflexive(q in qualifier_strategy()) {
            prop_assert!(matches(&q, &q));
        }

        #[test]
        fn any_pattern_accepts_all(q in qualifier_strategy()) {
            prop_assert!(matches(&Qualifier::any(), &q));
        }

        #[test]
        fn any_intent_reaches_every_capability(cap in qualifier_strategy()) {
            prop_assert!(matches(&cap, &patch(&Qualifier::any(), &cap)));
        }

        #[test]
        fn matching_is_deterministic(p in qualifier_strategy(), c in qualifier_strategy()) {
            prop_assert_eq!(matches(&p, &c), matches(&p, &c));
        }
    }
}
