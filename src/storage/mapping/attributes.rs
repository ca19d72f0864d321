//! Fixed named attributes.
//!
//! Backends with a fixed schema store each property as a row of three
//! attributes: a type tag, a canonical text form and an optional numeric
//! form used for range comparisons.
//!
//! | Type | `text` | `number` |
//! |------|--------|----------|
//! | string | the string | - |
//! | integer | decimal | value |
//! | float | shortest round-trip decimal, `NaN`, `inf`, `-inf` | value if finite |
//! | boolean | `true` / `false` | 1 / 0 |
//! | timestamp | RFC 3339 | epoch milliseconds |
//! | list | JSON array of envelopes | - |
//! | opaque | raw native text, tag = native type | - |

use super::json_bag::JsonBagMapper;
use super::{ValueMapper, check_hint, encode_timestamp, parse_timestamp};
use crate::models::{Property, PropertyId, PropertyType, PropertyValue};
use crate::{Error, Result};

/// Native attribute triple of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeAttribute {
    /// Type tag (a [`PropertyType`] tag, or a foreign native type).
    pub type_tag: String,
    /// Canonical text form.
    pub text: String,
    /// Numeric form for ordering, when the type has one.
    pub number: Option<f64>,
}

/// Maps properties to [`NativeAttribute`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMapper;

impl ValueMapper for AttributeMapper {
    type Native = NativeAttribute;

    #[allow(clippy::cast_precision_loss)]
    fn to_native(&self, property: &Property) -> Result<NativeAttribute> {
        let tag = property.declared_type().as_str().to_string();
        let (type_tag, text, number) = match &property.value {
            PropertyValue::String(s) => (tag, s.clone(), None),
            PropertyValue::Integer(i) => (tag, i.to_string(), Some(*i as f64)),
            PropertyValue::Float(f) => (tag, f.to_string(), f.is_finite().then_some(*f)),
            PropertyValue::Boolean(b) => (tag, b.to_string(), Some(if *b { 1.0 } else { 0.0 })),
            PropertyValue::Timestamp(ts) => (
                tag,
                encode_timestamp(&property.id, ts)?,
                Some(ts.timestamp_millis() as f64),
            ),
            PropertyValue::List(_) => {
                let encoded = JsonBagMapper::encode_value(&property.id, &property.value)?;
                let items = encoded.get("value").cloned().unwrap_or_default();
                (tag, items.to_string(), None)
            },
            PropertyValue::Opaque { native_type, raw } => {
                if native_type.is_empty() || PropertyType::parse(native_type).is_some() {
                    return Err(Error::metadata_format(
                        property.id.as_str(),
                        format!("opaque native type '{native_type}' is reserved"),
                    ));
                }
                (native_type.clone(), raw.clone(), None)
            },
        };
        Ok(NativeAttribute {
            type_tag,
            text,
            number,
        })
    }

    fn from_native(
        &self,
        id: &PropertyId,
        native: &NativeAttribute,
        hint: Option<PropertyType>,
    ) -> Result<Property> {
        let text = native.text.as_str();
        let malformed =
            |what: &str| Error::metadata_format(id.as_str(), format!("invalid {what} '{text}'"));

        let value = match PropertyType::parse(&native.type_tag) {
            Some(PropertyType::String) => PropertyValue::String(text.to_string()),
            Some(PropertyType::Integer) => text
                .parse()
                .map(PropertyValue::Integer)
                .map_err(|_| malformed("integer"))?,
            Some(PropertyType::Float) => text
                .parse()
                .map(PropertyValue::Float)
                .map_err(|_| malformed("float"))?,
            Some(PropertyType::Boolean) => match text {
                "true" => PropertyValue::Boolean(true),
                "false" => PropertyValue::Boolean(false),
                _ => return Err(malformed("boolean")),
            },
            Some(PropertyType::Timestamp) => PropertyValue::Timestamp(parse_timestamp(id, text)?),
            Some(PropertyType::List) => {
                let items: serde_json::Value =
                    serde_json::from_str(text).map_err(|_| malformed("list"))?;
                if !items.is_array() {
                    return Err(malformed("list"));
                }
                let mut envelope = serde_json::Map::new();
                envelope.insert("type".to_string(), "list".into());
                envelope.insert("value".to_string(), items);
                JsonBagMapper::decode_value(id, &serde_json::Value::Object(envelope))?
            },
            Some(PropertyType::Opaque) => return Err(malformed("opaque tag")),
            None if native.type_tag.is_empty() => return Err(malformed("empty type tag")),
            None => PropertyValue::Opaque {
                native_type: native.type_tag.clone(),
                raw: text.to_string(),
            },
        };
        check_hint(Property::new(id.clone(), value), hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use test_case::test_case;

    fn native(tag: &str, text: &str) -> NativeAttribute {
        NativeAttribute {
            type_tag: tag.to_string(),
            text: text.to_string(),
            number: None,
        }
    }

    #[test]
    fn test_integer_has_number() {
        let attr = AttributeMapper
            .to_native(&Property::new("size", 12_i64))
            .unwrap();
        assert_eq!(attr, NativeAttribute {
            type_tag: "integer".to_string(),
            text: "12".to_string(),
            number: Some(12.0),
        });
    }

    #[test]
    fn test_timestamp_number_is_millis() {
        let ts = DateTime::from_timestamp(1_000, 5_000_000).unwrap();
        let attr = AttributeMapper
            .to_native(&Property::new("t", ts))
            .unwrap();
        assert_eq!(attr.number, Some(1_000_005.0));
        let back = AttributeMapper
            .from_native(&PropertyId::new("t"), &attr, None)
            .unwrap();
        assert_eq!(back.value, PropertyValue::Timestamp(ts));
    }

    #[test]
    fn test_float_text_roundtrips() {
        for f in [0.1_f64, -1.5e300, f64::INFINITY, 5e-324] {
            let attr = AttributeMapper.to_native(&Property::new("f", f)).unwrap();
            let back = AttributeMapper
                .from_native(&PropertyId::new("f"), &attr, None)
                .unwrap();
            assert_eq!(back.value, PropertyValue::Float(f));
        }
    }

    #[test]
    fn test_list_roundtrip() {
        let value = PropertyValue::List(vec![
            PropertyValue::from("x"),
            PropertyValue::from(false),
        ]);
        let attr = AttributeMapper
            .to_native(&Property::new("l", value.clone()))
            .unwrap();
        assert_eq!(attr.type_tag, "list");
        let back = AttributeMapper
            .from_native(&PropertyId::new("l"), &attr, Some(PropertyType::List))
            .unwrap();
        assert_eq!(back.value, value);
    }

    #[test_case("integer", "1.5" ; "fractional integer")]
    #[test_case("float", "one" ; "word float")]
    #[test_case("boolean", "yes" ; "yes boolean")]
    #[test_case("timestamp", "2024-13-01" ; "bad month")]
    #[test_case("list", "{}" ; "object list")]
    #[test_case("opaque", "x" ; "bare opaque tag")]
    fn test_malformed_rejected(tag: &str, text: &str) {
        let err = AttributeMapper
            .from_native(&PropertyId::new("p"), &native(tag, text), None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MetadataFormat);
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        let attr = native("x-tool-blob", "AAEC");
        let property = AttributeMapper
            .from_native(&PropertyId::new("blob"), &attr, None)
            .unwrap();
        assert_eq!(
            AttributeMapper.to_native(&property).unwrap(),
            native("x-tool-blob", "AAEC")
        );
    }

    #[test]
    fn test_opaque_cannot_shadow_known_tag() {
        let property = Property::new("p", PropertyValue::Opaque {
            native_type: "integer".to_string(),
            raw: "1".to_string(),
        });
        assert!(AttributeMapper.to_native(&property).is_err());
    }
}
