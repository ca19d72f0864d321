//! JSON property bag.
//!
//! The whole metadata of an item is one JSON object keyed by property
//! identifier. Every value is an envelope carrying its declared type:
//!
//! ```json
//! {
//!   "format": {"type": "string", "value": "TEXT"},
//!   "size": {"type": "integer", "value": 0},
//!   "authors": {"type": "list", "value": [{"type": "string", "value": "a"}]}
//! }
//! ```
//!
//! Entries that are not envelopes were written by another tool; they are
//! surfaced as `Opaque { native_type: "json" }` and written back verbatim.

use super::{ValueMapper, check_hint, encode_timestamp, parse_timestamp};
use crate::models::{MetadataSet, Property, PropertyId, PropertyType, PropertyValue};
use crate::{Error, Result};
use serde_json::{Map, Number, Value};

/// Native type label of foreign JSON entries.
pub const FOREIGN_JSON: &str = "json";

/// Maps properties to JSON envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBagMapper;

impl JsonBagMapper {
    /// Encodes a value as an envelope (or verbatim for foreign JSON).
    pub(crate) fn encode_value(id: &PropertyId, value: &PropertyValue) -> Result<Value> {
        let encoded = match value {
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Integer(i) => Value::from(*i),
            PropertyValue::Float(f) => Number::from_f64(*f).map_or_else(
                || Value::String(non_finite_label(*f).to_string()),
                Value::Number,
            ),
            PropertyValue::Boolean(b) => Value::Bool(*b),
            PropertyValue::Timestamp(ts) => Value::String(encode_timestamp(id, ts)?),
            PropertyValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Self::encode_value(id, item))
                    .collect::<Result<_>>()?,
            ),
            PropertyValue::Opaque { native_type, raw } if native_type == FOREIGN_JSON => {
                if let Some(verbatim) = verbatim_foreign(raw) {
                    return Ok(verbatim);
                }
                opaque_object(native_type, raw)
            },
            PropertyValue::Opaque { native_type, raw } => opaque_object(native_type, raw),
        };

        let mut envelope = Map::new();
        envelope.insert(
            "type".to_string(),
            Value::String(value.property_type().as_str().to_string()),
        );
        envelope.insert("value".to_string(), encoded);
        Ok(Value::Object(envelope))
    }

    /// Decodes an envelope; anything else becomes foreign opaque JSON.
    pub(crate) fn decode_value(id: &PropertyId, native: &Value) -> Result<PropertyValue> {
        let Some((ty, value)) = envelope_parts(native) else {
            return Ok(foreign(native));
        };
        let malformed = |expected: &str| {
            Error::metadata_format(
                id.as_str(),
                format!("expected {expected} for type '{ty}', found {value}"),
            )
        };

        match ty {
            PropertyType::String => value
                .as_str()
                .map(|s| PropertyValue::String(s.to_string()))
                .ok_or_else(|| malformed("a string")),
            PropertyType::Integer => value
                .as_i64()
                .map(PropertyValue::Integer)
                .ok_or_else(|| malformed("an integer")),
            PropertyType::Float => match value {
                Value::Number(n) => n
                    .as_f64()
                    .map(PropertyValue::Float)
                    .ok_or_else(|| malformed("a number")),
                Value::String(s) => parse_non_finite(s)
                    .map(PropertyValue::Float)
                    .ok_or_else(|| malformed("a number")),
                _ => Err(malformed("a number")),
            },
            PropertyType::Boolean => value
                .as_bool()
                .map(PropertyValue::Boolean)
                .ok_or_else(|| malformed("a boolean")),
            PropertyType::Timestamp => {
                let text = value.as_str().ok_or_else(|| malformed("a timestamp string"))?;
                parse_timestamp(id, text).map(PropertyValue::Timestamp)
            },
            PropertyType::List => value
                .as_array()
                .ok_or_else(|| malformed("an array"))?
                .iter()
                .map(|item| Self::decode_value(id, item))
                .collect::<Result<Vec<_>>>()
                .map(PropertyValue::List),
            PropertyType::Opaque => {
                let native_type = value.get("native_type").and_then(Value::as_str);
                let raw = value.get("raw").and_then(Value::as_str);
                match (native_type, raw) {
                    (Some(native_type), Some(raw)) => Ok(PropertyValue::Opaque {
                        native_type: native_type.to_string(),
                        raw: raw.to_string(),
                    }),
                    _ => Err(malformed("an object with 'native_type' and 'raw'")),
                }
            },
        }
    }

    /// Interprets a foreign value as the hinted type, without coercion.
    fn coerce_foreign(id: &PropertyId, native: &Value, hint: PropertyType) -> Result<PropertyValue> {
        let value = match (hint, native) {
            (PropertyType::String, Value::String(s)) => Some(PropertyValue::String(s.clone())),
            (PropertyType::Integer, Value::Number(n)) => n.as_i64().map(PropertyValue::Integer),
            (PropertyType::Float, Value::Number(n)) => n.as_f64().map(PropertyValue::Float),
            (PropertyType::Boolean, Value::Bool(b)) => Some(PropertyValue::Boolean(*b)),
            (PropertyType::Timestamp, Value::String(s)) => {
                return parse_timestamp(id, s).map(PropertyValue::Timestamp);
            },
            (PropertyType::Opaque, other) => Some(foreign(other)),
            _ => None,
        };
        value.ok_or_else(|| {
            Error::metadata_format(
                id.as_str(),
                format!("foreign value {native} is not a valid '{hint}'"),
            )
        })
    }
}

impl ValueMapper for JsonBagMapper {
    type Native = Value;

    fn to_native(&self, property: &Property) -> Result<Value> {
        Self::encode_value(&property.id, &property.value)
    }

    fn from_native(
        &self,
        id: &PropertyId,
        native: &Value,
        hint: Option<PropertyType>,
    ) -> Result<Property> {
        let value = match hint {
            Some(hint) if envelope_parts(native).is_none() => {
                Self::coerce_foreign(id, native, hint)?
            },
            _ => Self::decode_value(id, native)?,
        };
        check_hint(Property::new(id.clone(), value), hint)
    }
}

fn envelope_parts(native: &Value) -> Option<(PropertyType, &Value)> {
    let object = native.as_object()?;
    if object.len() != 2 {
        return None;
    }
    let ty = PropertyType::parse(object.get("type")?.as_str()?)?;
    Some((ty, object.get("value")?))
}

/// Foreign JSON written back as itself, when reading it would give `raw` again.
///
/// Text that is not JSON, is not in canonical form, or looks like an envelope
/// is stored inside an opaque envelope instead.
fn verbatim_foreign(raw: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(raw).ok()?;
    (envelope_parts(&value).is_none() && value.to_string() == raw).then_some(value)
}

fn opaque_object(native_type: &str, raw: &str) -> Value {
    let mut inner = Map::new();
    inner.insert("native_type".to_string(), Value::String(native_type.to_string()));
    inner.insert("raw".to_string(), Value::String(raw.to_string()));
    Value::Object(inner)
}

fn foreign(native: &Value) -> PropertyValue {
    PropertyValue::Opaque {
        native_type: FOREIGN_JSON.to_string(),
        raw: native.to_string(),
    }
}

fn non_finite_label(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "inf"
    } else {
        "-inf"
    }
}

fn parse_non_finite(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// A parsed property-bag document.
///
/// Updates edit the document in place, so entries this crate does not
/// understand survive a read-modify-write cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonBag {
    entries: Map<String, Value>,
}

impl JsonBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a stored document. Blank text is an empty bag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFormat`] if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(entries)) => Ok(Self { entries }),
            Ok(other) => Err(Error::metadata_format(
                "*",
                format!("property bag must be a JSON object, found {other}"),
            )),
            Err(e) => Err(Error::metadata_format("*", format!("invalid property bag: {e}"))),
        }
    }

    /// Returns true if the bag has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decodes the selected entries (all when `selection` is empty).
    ///
    /// Only selected entries are decoded, so a corrupt unrelated entry does
    /// not fail a filtered retrieve.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFormat`] for a malformed selected entry.
    pub fn decode(&self, mapper: &JsonBagMapper, selection: &[PropertyId]) -> Result<MetadataSet> {
        let mut set = MetadataSet::new();
        for (key, native) in &self.entries {
            let id = PropertyId::new(key.as_str());
            if !selection.is_empty() && !selection.contains(&id) {
                continue;
            }
            set.insert(mapper.from_native(&id, native, None)?);
        }
        Ok(set)
    }

    /// Stores or replaces the given properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFormat`] if a value cannot be encoded; the
    /// bag is left unchanged in that case.
    pub fn update(&mut self, mapper: &JsonBagMapper, properties: &[Property]) -> Result<()> {
        let encoded = properties
            .iter()
            .map(|p| Ok((p.id.as_str().to_string(), mapper.to_native(p)?)))
            .collect::<Result<Vec<_>>>()?;
        self.entries.extend(encoded);
        Ok(())
    }

    /// Removes the named entries. Missing identifiers are ignored.
    pub fn remove(&mut self, ids: &[PropertyId]) {
        for id in ids {
            self.entries.remove(id.as_str());
        }
    }

    /// Serializes the document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFormat`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&self.entries)
            .map_err(|e| Error::metadata_format("*", format!("cannot serialize property bag: {e}")))
    }
}
