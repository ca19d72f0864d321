//! Backend-neutral property model.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved identifiers of system-managed properties.
///
/// Their values are derived from backend facts (file size, last-modified
/// header, commit metadata) rather than accepted from callers.
pub mod system {
    /// Creation date and time of the item.
    pub const CREATION_DATETIME: &str = "sys:creation_datetime";
    /// Last modification date and time.
    pub const MODIFICATION_DATETIME: &str = "sys:modification_datetime";
    /// Content size in bytes.
    pub const SIZE: &str = "sys:size";
    /// Owner of the item.
    pub const OWNER: &str = "sys:owner";
    /// Content format (e.g. the item kind or a backend format label).
    pub const CONTENT_FORMAT: &str = "sys:content_format";
    /// MIME type of the content.
    pub const MIME_TYPE: &str = "sys:mime_type";

    /// All system-managed identifiers.
    pub const ALL: [&str; 6] = [
        CREATION_DATETIME,
        MODIFICATION_DATETIME,
        SIZE,
        OWNER,
        CONTENT_FORMAT,
        MIME_TYPE,
    ];

    /// Returns true if `id` names a system-managed property.
    #[must_use]
    pub fn is_system_managed(id: &str) -> bool {
        ALL.contains(&id)
    }
}

/// Identifier of a property, unique per item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(String);

impl PropertyId {
    /// Creates a property identifier. Surrounding whitespace is trimmed.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id: String = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is a reserved system-managed identifier.
    #[must_use]
    pub fn is_system_managed(&self) -> bool {
        system::is_system_managed(&self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropertyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PropertyId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Declared type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// UTF-8 text.
    String,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean flag.
    Boolean,
    /// UTC timestamp.
    Timestamp,
    /// Ordered list of values.
    List,
    /// Native data of unknown shape, preserved verbatim.
    Opaque,
}

impl PropertyType {
    /// Returns the type as its native tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Opaque => "opaque",
        }
    }

    /// Parses a type tag.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "timestamp" => Some(Self::Timestamp),
            "list" => Some(Self::List),
            "opaque" => Some(Self::Opaque),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// UTF-8 text.
    String(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean flag.
    Boolean(bool),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Ordered list of values.
    List(Vec<PropertyValue>),
    /// Backend data of unknown shape.
    ///
    /// Produced only when decoding data written by another tool; it is
    /// written back unchanged so foreign entries survive a round trip.
    Opaque {
        /// Native type label of the backend (e.g. `json`).
        native_type: String,
        /// Raw native text.
        raw: String,
    },
}

impl PropertyValue {
    /// Returns the type of this value.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Integer(_) => PropertyType::Integer,
            Self::Float(_) => PropertyType::Float,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Timestamp(_) => PropertyType::Timestamp,
            Self::List(_) => PropertyType::List,
            Self::Opaque { .. } => PropertyType::Opaque,
        }
    }

    /// Returns the string content if this is a string value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<Vec<Self>> for PropertyValue {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}

/// Where a property value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropertyOrigin {
    /// Stored by a caller (or a foreign tool) in the backend's metadata.
    #[default]
    Stored,
    /// Computed by the adapter from backend facts.
    Derived,
}

/// A property: identifier, value and declared type.
///
/// The declared type is always the type of the value, so the triple cannot
/// become inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property identifier.
    pub id: PropertyId,
    /// Property value.
    pub value: PropertyValue,
    /// Origin of the value.
    pub origin: PropertyOrigin,
}

impl Property {
    /// Creates a caller-supplied property.
    #[must_use]
    pub fn new(id: impl Into<PropertyId>, value: impl Into<PropertyValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            origin: PropertyOrigin::Stored,
        }
    }

    /// Creates a property derived from backend facts.
    #[must_use]
    pub fn derived(id: impl Into<PropertyId>, value: impl Into<PropertyValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            origin: PropertyOrigin::Derived,
        }
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn declared_type(&self) -> PropertyType {
        self.value.property_type()
    }

    /// Returns true if the identifier is reserved for system-managed data.
    ///
    /// A stored property can carry a system-managed identifier when a caller
    /// set it explicitly; the tag lets the repository layer tell it apart.
    #[must_use]
    pub fn is_system_managed(&self) -> bool {
        self.id.is_system_managed()
    }
}

/// Mapping from property identifier to property, as returned by `retrieve`.
///
/// Iteration order is by identifier, so two retrievals of the same state
/// compare and print identically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataSet {
    properties: BTreeMap<PropertyId, Property>,
}

impl MetadataSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            properties: BTreeMap::new(),
        }
    }

    /// Inserts a property, replacing any previous value with the same id.
    pub fn insert(&mut self, property: Property) -> Option<Property> {
        self.properties.insert(property.id.clone(), property)
    }

    /// Returns the property with the given identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Property> {
        self.properties.get(&PropertyId::new(id))
    }

    /// Returns the value of the property with the given identifier.
    #[must_use]
    pub fn value(&self, id: &str) -> Option<&PropertyValue> {
        self.get(id).map(|p| &p.value)
    }

    /// Removes a property.
    pub fn remove(&mut self, id: &PropertyId) -> Option<Property> {
        self.properties.remove(id)
    }

    /// Returns true if a property with this identifier is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.properties.contains_key(&PropertyId::new(id))
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterates over the properties in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Iterates over the identifiers in order.
    pub fn ids(&self) -> impl Iterator<Item = &PropertyId> {
        self.properties.keys()
    }

    /// Keeps only the requested identifiers.
    ///
    /// An empty selection keeps everything. Identifiers that are not present
    /// are silently ignored.
    #[must_use]
    pub fn filtered(mut self, selection: &[PropertyId]) -> Self {
        if selection.is_empty() {
            return self;
        }
        self.properties.retain(|id, _| selection.contains(id));
        self
    }

    /// Inserts every property of `other`, replacing existing entries.
    pub fn extend(&mut self, other: Self) {
        self.properties.extend(other.properties);
    }
}

impl FromIterator<Property> for MetadataSet {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        let mut set = Self::new();
        for property in iter {
            set.insert(property);
        }
        set
    }
}

impl IntoIterator for MetadataSet {
    type Item = Property;
    type IntoIter = std::collections::btree_map::IntoValues<PropertyId, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.into_values()
    }
}
