//! Logical item identifiers.

use crate::{Error, Result};
use percent_encoding::percent_decode_str;
use std::fmt;

/// Absolute, slash-separated logical path of an item.
///
/// Identifiers are backend independent and always normalized:
/// - leading `/`, no trailing `/` except for the root
/// - empty segments collapsed (`/a//b` becomes `/a/b`)
/// - percent-decoded exactly once
/// - case preserved
///
/// `.` and `..` segments are rejected so that no identifier can escape the
/// mount it is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    /// Parses and normalizes a logical path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the path is relative, contains
    /// invalid percent-encoding, a NUL byte, or a `.`/`..` segment.
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.starts_with('/') {
            return Err(Error::InvalidIdentifier(format!(
                "'{raw}' is not an absolute path"
            )));
        }

        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|e| Error::InvalidIdentifier(format!("'{raw}': {e}")))?;
        Self::from_decoded(&decoded)
    }

    /// Normalizes a path that is already percent-decoded.
    ///
    /// Backends use this for paths read back from their own storage, which
    /// must not be decoded a second time.
    ///
    /// # Errors
    ///
    /// Same as [`ItemId::parse`], except that no decoding happens.
    pub fn from_decoded(path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(Error::InvalidIdentifier(format!(
                "'{path}' is not an absolute path"
            )));
        }

        let mut normalized = String::with_capacity(path.len());
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(Error::InvalidIdentifier(format!(
                    "'{path}' contains a relative segment"
                )));
            }
            if segment.contains('\0') {
                return Err(Error::InvalidIdentifier(format!(
                    "'{path}' contains a NUL byte"
                )));
            }
            normalized.push('/');
            normalized.push_str(segment);
        }

        if normalized.is_empty() {
            normalized.push('/');
        }
        Ok(Self(normalized))
    }

    /// Returns the root identifier `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path without its leading slash (empty for the root).
    #[must_use]
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    /// Returns true if this is the root identifier.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns the last path segment (empty for the root).
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Returns the parent identifier, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments (0 for the root).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Appends a single segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the segment is empty or would
    /// not survive normalization unchanged.
    pub fn join(&self, segment: &str) -> Result<Self> {
        if segment.is_empty() || segment.contains('/') {
            return Err(Error::InvalidIdentifier(format!(
                "'{segment}' is not a single path segment"
            )));
        }
        let joined = if self.is_root() {
            format!("/{segment}")
        } else {
            format!("{}/{segment}", self.0)
        };
        Self::from_decoded(&joined)
    }

    /// Returns true if `self` equals `other` or lies below it.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        other.is_root()
            || self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }

    /// Rewrites the `from` prefix of this identifier to `to`.
    ///
    /// Returns `None` if `self` is not below `from`.
    #[must_use]
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        if !self.starts_with(from) {
            return None;
        }
        let rest = if from.is_root() {
            self.relative()
        } else {
            self.0[from.0.len()..].trim_start_matches('/')
        };
        if rest.is_empty() {
            return Some(to.clone());
        }
        if to.is_root() {
            Some(Self(format!("/{rest}")))
        } else {
            Some(Self(format!("{}/{rest}", to.0)))
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Structural kind of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A container of other items.
    Collection,
    /// An item carrying content.
    Leaf,
    /// A reference to another item.
    Link,
}

impl ItemKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Leaf => "leaf",
            Self::Link => "link",
        }
    }

    /// Parses a kind string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collection" => Some(Self::Collection),
            "leaf" => Some(Self::Leaf),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/", "/" ; "root")]
    #[test_case("/a/b.txt", "/a/b.txt" ; "plain")]
    #[test_case("/a/b/", "/a/b" ; "trailing slash")]
    #[test_case("//a///b", "/a/b" ; "empty segments")]
    #[test_case("/Docs/ReadMe", "/Docs/ReadMe" ; "case preserved")]
    #[test_case("/a%20b/c%2Fd", "/a b/c/d" ; "percent decoded")]
    #[test_case("/100%2525", "/100%25" ; "decoded once")]
    fn test_parse_normalizes(raw: &str, expected: &str) {
        assert_eq!(ItemId::parse(raw).unwrap().as_str(), expected);
    }

    #[test_case("a/b" ; "relative")]
    #[test_case("" ; "empty")]
    #[test_case("/a/../b" ; "parent segment")]
    #[test_case("/./a" ; "current segment")]
    #[test_case("/a%FF" ; "invalid utf8")]
    fn test_parse_rejects(raw: &str) {
        assert!(matches!(
            ItemId::parse(raw),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_parent_and_name() {
        let id = ItemId::parse("/a/b/c.txt").unwrap();
        assert_eq!(id.name(), "c.txt");
        assert_eq!(id.parent().unwrap().as_str(), "/a/b");
        assert_eq!(ItemId::parse("/a").unwrap().parent(), Some(ItemId::root()));
        assert_eq!(ItemId::root().parent(), None);
        assert_eq!(ItemId::root().name(), "");
        assert_eq!(id.depth(), 3);
    }

    #[test]
    fn test_join() {
        let root = ItemId::root();
        assert_eq!(root.join("a").unwrap().as_str(), "/a");
        assert_eq!(
            root.join("a").unwrap().join("b").unwrap().as_str(),
            "/a/b"
        );
        assert!(root.join("a/b").is_err());
        assert!(root.join("..").is_err());
        assert_eq!(root.join("50%25").unwrap().as_str(), "/50%25");
    }

    #[test]
    fn test_starts_with_respects_segments() {
        let ab = ItemId::parse("/a/b").unwrap();
        assert!(ItemId::parse("/a/b/c").unwrap().starts_with(&ab));
        assert!(ab.starts_with(&ab));
        assert!(!ItemId::parse("/a/bc").unwrap().starts_with(&ab));
        assert!(ab.starts_with(&ItemId::root()));
    }

    #[test]
    fn test_rebase() {
        let from = ItemId::parse("/a").unwrap();
        let to = ItemId::parse("/x/y").unwrap();
        let id = ItemId::parse("/a/b/c").unwrap();
        assert_eq!(id.rebase(&from, &to).unwrap().as_str(), "/x/y/b/c");
        assert_eq!(from.rebase(&from, &to).unwrap(), to);
        assert!(ItemId::parse("/ab").unwrap().rebase(&from, &to).is_none());
        assert_eq!(
            id.rebase(&from, &ItemId::root()).unwrap().as_str(),
            "/b/c"
        );
    }
}
