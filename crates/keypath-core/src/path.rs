//! Dot-path algebra: joining, splitting, and prefix enumeration.
//!
//! A full key is `namespace[.segment]*`. Segments are object keys unless they
//! match the strict decimal-index pattern `0 | [1-9][0-9]*`, in which case
//! they address a sequence element. The empty segment is always an object
//! key, never index zero.
//!
//! # Invariants
//!
//! 1. `join(ns, Some(p))` and `split_namespace` are inverse for non-empty
//!    subpaths.
//! 2. `parse_index` rejects leading zeros ("01"), signs, and the empty
//!    string.
//! 3. `ancestor_prefixes` returns strict prefixes only: never the namespace
//!    root, never the path itself.

use std::fmt;

/// Join a namespace and an optional subpath into a full key.
#[must_use]
pub fn join(namespace: &str, path: Option<&str>) -> String {
    match path {
        Some(p) => format!("{namespace}.{p}"),
        None => namespace.to_owned(),
    }
}

/// Split a full key into its namespace and the remaining subpath.
#[must_use]
pub fn split_namespace(full_key: &str) -> (&str, Option<&str>) {
    match full_key.split_once('.') {
        Some((ns, rest)) => (ns, Some(rest)),
        None => (full_key, None),
    }
}

/// Split a subpath into its segments. Empty segments are preserved: they
/// address the empty-string object key.
#[must_use]
pub fn segments(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Parse a segment as a strict sequence index.
///
/// Accepts exactly `0` or a non-zero digit followed by digits. Everything
/// else — including the empty string — is an object key.
#[must_use]
pub fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    segment.parse().ok()
}

/// Every strict ancestor prefix of `full_key`, deepest last.
///
/// Excludes the namespace root and `full_key` itself; callers that want
/// those add them explicitly. For `"ns.a.b.c"` this returns
/// `["ns.a", "ns.a.b"]`.
#[must_use]
pub fn ancestor_prefixes(full_key: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut dots = full_key
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .map(|(i, _)| i);
    // The first dot closes the namespace root, which is excluded.
    let Some(_) = dots.next() else {
        return out;
    };
    for i in dots {
        out.push(full_key[..i].to_owned());
    }
    out
}

// ---------------------------------------------------------------------------
// KeyPath — explicit typed path builder
// ---------------------------------------------------------------------------

/// An explicit, composable path builder.
///
/// Replaces dynamic property-chain reflection with plain method chaining:
///
/// ```
/// use keypath_core::path::KeyPath;
///
/// let p = KeyPath::root("settings").field("panels").index(0).field("title");
/// assert_eq!(p.as_str(), "settings.panels.0.title");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPath(String);

impl KeyPath {
    /// Start a path at a namespace root.
    #[must_use]
    pub fn root(namespace: impl Into<String>) -> Self {
        KeyPath(namespace.into())
    }

    /// Descend into an object key.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        KeyPath(format!("{}.{name}", self.0))
    }

    /// Descend into a sequence index.
    #[must_use]
    pub fn index(&self, i: usize) -> Self {
        KeyPath(format!("{}.{i}", self.0))
    }

    /// The accumulated full key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<KeyPath> for String {
    fn from(p: KeyPath) -> Self {
        p.0
    }
}
