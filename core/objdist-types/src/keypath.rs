//! Keypaths: segment-wise addresses into the state tree.
//!
//! A keypath is an ordered list of segment names. The empty keypath is the
//! root of the tree. Keypaths only become strings at the wire boundary, where
//! they are joined with a [`Delimiter`].
//!
//! Prefix tests are always done segment by segment, never on the rendered
//! string: `man` is an ancestor of `man/name` but not of `manx`.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = "/";

/// A validated, non-empty keypath delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Delimiter(String);

impl Delimiter {
    /// Creates a delimiter. Empty strings are rejected.
    pub fn new(delimiter: impl Into<String>) -> Result<Self, Error> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(Error::EmptyDelimiter);
        }
        Ok(Self(delimiter))
    }

    /// Returns the delimiter text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that `segment` survives rendering and parsing unchanged: it
    /// must be non-empty and must not contain the delimiter.
    pub fn check_segment(&self, segment: &str) -> Result<(), Error> {
        if segment.is_empty() || segment.contains(self.as_str()) {
            return Err(Error::UnrepresentableKey {
                segment: segment.to_string(),
                delimiter: self.0.clone(),
            });
        }
        Ok(())
    }

    /// Runs [`check_segment`](Self::check_segment) on every key that would
    /// become a keypath segment. Arrays are leaves, so objects inside them
    /// are not checked.
    pub fn check_keys(&self, value: &Value) -> Result<(), Error> {
        let Value::Object(map) = value else {
            return Ok(());
        };
        map.iter().try_for_each(|(key, child)| {
            self.check_segment(key)?;
            self.check_keys(child)
        })
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(DEFAULT_DELIMITER.to_string())
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Delimiter {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Delimiter> for String {
    fn from(delimiter: Delimiter) -> Self {
        delimiter.0
    }
}

/// An address in the state tree.
///
/// Ordering is lexicographic over segments, so every ancestor sorts before
/// its descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keypath(Vec<String>);

impl Keypath {
    /// The root keypath (no segments).
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a keypath from segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parses a rendered keypath. Empty text is the root; empty segments
    /// (leading, trailing or doubled delimiters) are skipped.
    #[must_use]
    pub fn parse(text: &str, delimiter: &Delimiter) -> Self {
        Self(
            text.split(delimiter.as_str())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Joins the segments with `delimiter`. The root renders as `""`.
    #[must_use]
    pub fn render(&self, delimiter: &Delimiter) -> String {
        self.0.join(delimiter.as_str())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the last segment, `None` for the root.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns this keypath extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns the enclosing keypath, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Appends `other` to this keypath.
    #[must_use]
    pub fn join(&self, other: &Keypath) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + other.0.len());
        segments.extend_from_slice(&self.0);
        segments.extend_from_slice(&other.0);
        Self(segments)
    }

    /// Checks that every segment can be rendered with `delimiter` and parsed
    /// back to the same keypath.
    pub fn check(&self, delimiter: &Delimiter) -> Result<(), Error> {
        self.0
            .iter()
            .try_for_each(|segment| delimiter.check_segment(segment))
    }

    /// Whether `self` is an ancestor of, or equal to, `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Keypath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Rewrites `self` relative to `prefix`. Returns `None` when `prefix` is
    /// not a segment-wise prefix; equal keypaths yield the root.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Keypath) -> Option<Self> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Self(rest.to_vec()))
    }
}

impl fmt::Display for Keypath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(DEFAULT_DELIMITER))
    }
}

impl<S: Into<String>> FromIterator<S> for Keypath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(text: &str) -> Keypath {
        Keypath::parse(text, &Delimiter::default())
    }

    #[test]
    fn substring_is_not_a_prefix() {
        assert!(kp("man").is_prefix_of(&kp("man/name")));
        assert!(!kp("man").is_prefix_of(&kp("manx")));
        assert!(kp("man").strip_prefix(&kp("ma")).is_none());
    }

    #[test]
    fn root_prefixes_everything() {
        assert!(Keypath::root().is_prefix_of(&kp("a/b/c")));
        assert_eq!(kp("a/b").strip_prefix(&Keypath::root()), Some(kp("a/b")));
    }
}
