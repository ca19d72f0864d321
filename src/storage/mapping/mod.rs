//! Property value mapping.
//!
//! Translates the backend-neutral [`Property`] model into and out of a
//! backend's native metadata representation. Two native forms exist:
//!
//! | Mapper | Native form | Used by |
//! |--------|-------------|---------|
//! | [`JsonBagMapper`] | one JSON document keyed by property id | git notes, WebDAV dead property |
//! | [`AttributeMapper`] | fixed named attributes (tag, text, number) | `SQLite` property table |
//!
//! Both satisfy `from_native(to_native(p)) == p` for every representable
//! property and reject malformed native data with
//! [`Error::MetadataFormat`](crate::Error::MetadataFormat).

mod attributes;
mod json_bag;

pub use attributes::{AttributeMapper, NativeAttribute};
pub use json_bag::{JsonBag, JsonBagMapper};

use crate::models::{ItemId, ItemKind, MetadataSet, Property, PropertyId, PropertyType, system};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};

/// Bidirectional conversion between [`Property`] and a native representation.
pub trait ValueMapper {
    /// The backend's native representation of one property value.
    type Native;

    /// Encodes a property.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFormat`] if the value cannot be represented.
    fn to_native(&self, property: &Property) -> Result<Self::Native>;

    /// Decodes a property.
    ///
    /// `hint` is the declared type the caller expects; a native value of a
    /// different type is rejected rather than coerced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFormat`] for malformed native data.
    fn from_native(
        &self,
        id: &PropertyId,
        native: &Self::Native,
        hint: Option<PropertyType>,
    ) -> Result<Property>;
}

/// Formats a timestamp in the fixed native format (RFC 3339, UTC, `Z`).
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Years a stored timestamp may fall in; RFC 3339 has four year digits.
pub const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Formats a timestamp for storage.
///
/// # Errors
///
/// Returns [`Error::MetadataFormat`] if the year is outside [`STORABLE_YEARS`].
pub fn encode_timestamp(id: &PropertyId, ts: &DateTime<Utc>) -> Result<String> {
    if STORABLE_YEARS.contains(&ts.year()) {
        Ok(format_timestamp(ts))
    } else {
        Err(Error::metadata_format(
            id.as_str(),
            format!("timestamp {ts} is outside the years 0000 to 9999"),
        ))
    }
}

/// Parses a timestamp written by [`format_timestamp`] (any RFC 3339 offset is accepted).
///
/// # Errors
///
/// Returns [`Error::MetadataFormat`] if the text is not RFC 3339.
pub fn parse_timestamp(id: &PropertyId, text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::metadata_format(id.as_str(), format!("invalid timestamp '{text}': {e}")))
}

/// Rejects a decoded value whose type differs from the caller's hint.
pub(crate) fn check_hint(property: Property, hint: Option<PropertyType>) -> Result<Property> {
    match hint {
        Some(expected) if expected != property.declared_type() => Err(Error::metadata_format(
            property.id.as_str(),
            format!(
                "stored type '{}' does not match declared type '{expected}'",
                property.declared_type()
            ),
        )),
        _ => Ok(property),
    }
}

/// Backend facts from which system-managed properties are derived.
#[derive(Debug, Clone, Default)]
pub struct SystemFacts {
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
    /// Content size in bytes.
    pub size: Option<u64>,
    /// Owner name.
    pub owner: Option<String>,
    /// Item kind, reported as the content format.
    pub kind: Option<ItemKind>,
    /// MIME type reported by the backend; guessed from the name when absent.
    pub mime_type: Option<String>,
}

impl SystemFacts {
    /// Turns the known facts of `id` into derived properties.
    #[must_use]
    pub fn into_properties(self, id: &ItemId) -> Vec<Property> {
        let mut out = Vec::with_capacity(system::ALL.len());
        if let Some(ts) = self.created {
            out.push(Property::derived(system::CREATION_DATETIME, ts));
        }
        if let Some(ts) = self.modified {
            out.push(Property::derived(system::MODIFICATION_DATETIME, ts));
        }
        if let Some(size) = self.size {
            out.push(Property::derived(
                system::SIZE,
                i64::try_from(size).unwrap_or(i64::MAX),
            ));
        }
        if let Some(owner) = self.owner {
            out.push(Property::derived(system::OWNER, owner));
        }
        if let Some(kind) = self.kind {
            out.push(Property::derived(system::CONTENT_FORMAT, kind.as_str()));
            if kind == ItemKind::Leaf {
                let mime = self
                    .mime_type
                    .unwrap_or_else(|| guess_mime_type(id.name()).to_string());
                out.push(Property::derived(system::MIME_TYPE, mime));
            }
        }
        out
    }
}

/// Merges derived properties into a stored set.
///
/// Derived values take precedence: a caller-stored value under a
/// system-managed identifier is only visible when the backend cannot derive
/// that value itself.
#[must_use]
pub fn merge_derived(mut stored: MetadataSet, derived: Vec<Property>) -> MetadataSet {
    for property in derived {
        stored.insert(property);
    }
    stored
}

/// Guesses a MIME type from a file name extension.
#[must_use]
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "xml" => "application/xml",
        "json" => "application/json",
        "toml" => "application/toml",
        "yaml" | "yml" => "application/yaml",
        "js" => "text/javascript",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "h5" | "hdf5" => "application/x-hdf5",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyOrigin, PropertyValue};
    use test_case::test_case;

    #[test_case("a.txt", "text/plain")]
    #[test_case("Report.PDF", "application/pdf")]
    #[test_case("archive.tar.gz", "application/gzip")]
    #[test_case("README", "application/octet-stream")]
    fn test_guess_mime_type(name: &str, expected: &str) {
        assert_eq!(guess_mime_type(name), expected);
    }

    #[test]
    fn test_derived_wins_over_stored_override() {
        let stored: MetadataSet = [
            Property::new(system::SIZE, 999_i64),
            Property::new(system::OWNER, "caller"),
            Property::new("format", "TEXT"),
        ]
        .into_iter()
        .collect();
        let id = ItemId::parse("/a/b.txt").unwrap();
        let facts = SystemFacts {
            size: Some(5),
            kind: Some(ItemKind::Leaf),
            ..SystemFacts::default()
        };

        let merged = merge_derived(stored, facts.into_properties(&id));
        let size = merged.get(system::SIZE).unwrap();
        assert_eq!(size.value, PropertyValue::Integer(5));
        assert_eq!(size.origin, PropertyOrigin::Derived);
        // Not derivable here, so the tagged override stays visible.
        let owner = merged.get(system::OWNER).unwrap();
        assert_eq!(owner.origin, PropertyOrigin::Stored);
        assert!(owner.is_system_managed());
        assert_eq!(
            merged.value(system::MIME_TYPE),
            Some(&PropertyValue::from("text/plain"))
        );
    }

    #[test]
    fn test_collections_have_no_mime_type() {
        let id = ItemId::parse("/a").unwrap();
        let facts = SystemFacts {
            kind: Some(ItemKind::Collection),
            ..SystemFacts::default()
        };
        let props = facts.into_properties(&id);
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].id.as_str(), system::CONTENT_FORMAT);
    }

    #[test]
    fn test_timestamp_format_is_fixed() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2023-11-14T22:13:20Z");
        let id = PropertyId::new("t");
        assert_eq!(parse_timestamp(&id, "2023-11-14T23:13:20+01:00").unwrap(), ts);
        assert!(parse_timestamp(&id, "yesterday").is_err());
    }

    #[test]
    fn test_out_of_range_timestamps_are_not_stored() {
        let id = PropertyId::new("t");
        let last = DateTime::from_timestamp(253_402_300_799, 0).unwrap();
        let text = encode_timestamp(&id, &last).unwrap();
        assert_eq!(text, "9999-12-31T23:59:59Z");
        assert_eq!(parse_timestamp(&id, &text).unwrap(), last);

        let first = DateTime::from_timestamp(-62_167_219_200, 0).unwrap();
        let text = encode_timestamp(&id, &first).unwrap();
        assert_eq!(parse_timestamp(&id, &text).unwrap(), first);

        for ts in [last + chrono::Duration::seconds(1), first - chrono::Duration::seconds(1)] {
            let err = encode_timestamp(&id, &ts).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::MetadataFormat);
        }
    }

    #[test]
    fn test_hint_mismatch_rejected() {
        let p = Property::new("n", 1_i64);
        assert!(check_hint(p.clone(), Some(PropertyType::Integer)).is_ok());
        assert!(check_hint(p.clone(), None).is_ok());
        let err = check_hint(p, Some(PropertyType::String)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MetadataFormat);
    }
}
