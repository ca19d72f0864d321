//! Property and search CLI commands.

use super::emit;
use crate::models::{ItemId, Property, PropertyId, PropertyType, PropertyValue, Restriction};
use crate::storage::Mount;
use crate::storage::mapping::format_timestamp;
use crate::{Error, ErrorKind, Result};
use chrono::{DateTime, Utc};
use std::io::Write;

/// Parses command-line text as a value of type `ty`, inferring the type when
/// none is given.
///
/// Inference tries integer, float, boolean and RFC 3339 timestamp, then falls
/// back to string.
///
/// # Errors
///
/// Returns [`Error::MetadataFormat`] if the text is not a valid `ty`.
pub fn parse_value(id: &str, text: &str, ty: Option<PropertyType>) -> Result<PropertyValue> {
    let invalid = |ty: PropertyType| Error::metadata_format(id, format!("'{text}' is not a valid {ty}"));
    match ty {
        None => Ok(infer_value(text)),
        Some(PropertyType::String) => Ok(PropertyValue::String(text.to_string())),
        Some(PropertyType::Integer) => text
            .parse()
            .map(PropertyValue::Integer)
            .map_err(|_| invalid(PropertyType::Integer)),
        Some(PropertyType::Float) => text
            .parse()
            .map(PropertyValue::Float)
            .map_err(|_| invalid(PropertyType::Float)),
        Some(PropertyType::Boolean) => text
            .parse()
            .map(PropertyValue::Boolean)
            .map_err(|_| invalid(PropertyType::Boolean)),
        Some(PropertyType::Timestamp) => parse_timestamp(text)
            .map(PropertyValue::Timestamp)
            .ok_or_else(|| invalid(PropertyType::Timestamp)),
        Some(PropertyType::List) => Ok(PropertyValue::List(
            text.split(',').map(|item| infer_value(item.trim())).collect(),
        )),
        Some(other) => Err(Error::metadata_format(
            id,
            format!("values of type {other} cannot be entered on the command line"),
        )),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn infer_value(text: &str) -> PropertyValue {
    if let Ok(i) = text.parse::<i64>() {
        PropertyValue::Integer(i)
    } else if let Ok(f) = text.parse::<f64>()
        && f.is_finite()
    {
        PropertyValue::Float(f)
    } else if let Ok(b) = text.parse::<bool>() {
        PropertyValue::Boolean(b)
    } else if let Some(ts) = parse_timestamp(text) {
        PropertyValue::Timestamp(ts)
    } else {
        PropertyValue::String(text.to_string())
    }
}

/// Renders a value for display.
#[must_use]
pub fn format_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => s.clone(),
        PropertyValue::Integer(i) => i.to_string(),
        PropertyValue::Float(f) => f.to_string(),
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::Timestamp(ts) => format_timestamp(ts),
        PropertyValue::List(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        },
        PropertyValue::Opaque { raw, .. } => raw.clone(),
    }
}

/// Parses one search condition.
///
/// | Syntax | Restriction |
/// |--------|-------------|
/// | `name=value` | equals |
/// | `name~text` | contains |
/// | `name*=pattern` | wildcard (`*`, `?`) |
/// | `name>=value` | range with lower bound |
/// | `name<=value` | range with upper bound |
///
/// # Errors
///
/// Returns [`Error::QueryUnsupported`] if the text has no operator or no
/// property name.
pub fn parse_condition(expr: &str) -> Result<Restriction> {
    let Some(pos) = expr.find(['=', '~', '<', '>', '*']) else {
        return Err(Error::query_unsupported(format!("'{expr}' has no operator")));
    };
    let name = expr[..pos].trim();
    if name.is_empty() {
        return Err(Error::query_unsupported(format!("'{expr}' has no property name")));
    }
    let rest = &expr[pos..];
    let (op, value) = ["*=", ">=", "<=", "=", "~"]
        .iter()
        .find_map(|op| rest.strip_prefix(op).map(|v| (*op, v.trim())))
        .ok_or_else(|| Error::query_unsupported(format!("'{expr}' has an unknown operator")))?;
    Ok(match op {
        "*=" => Restriction::wildcard(name, value),
        ">=" => Restriction::range(name, Some(infer_value(value)), None),
        "<=" => Restriction::range(name, None, Some(infer_value(value))),
        "~" => Restriction::contains(name, value),
        _ => Restriction::equals(name, infer_value(value)),
    })
}

/// Property and search commands.
pub struct PropsCommand<'a> {
    mount: &'a Mount,
}

impl<'a> PropsCommand<'a> {
    /// Creates the command set for `mount`.
    #[must_use]
    pub const fn new(mount: &'a Mount) -> Self {
        Self { mount }
    }

    /// Prints `name (type) = value` for the selected properties (all when
    /// `selection` is empty).
    pub fn props(&self, id: &ItemId, selection: &[String], out: &mut dyn Write) -> Result<()> {
        let selection: Vec<PropertyId> = selection.iter().map(PropertyId::new).collect();
        let set = self.mount.metadata().retrieve(id, &selection)?;
        let mut properties: Vec<&Property> = set.iter().collect();
        properties.sort_by(|a, b| a.id.cmp(&b.id));
        for property in properties {
            emit(
                out,
                format_args!(
                    "{} ({}) = {}",
                    property.id,
                    property.declared_type(),
                    format_value(&property.value)
                ),
            )?;
        }
        Ok(())
    }

    /// Stores one property.
    pub fn set_prop(&self, id: &ItemId, name: &str, value: &str, ty: Option<PropertyType>) -> Result<()> {
        let value = parse_value(name, value, ty)?;
        self.mount.metadata().update(id, &[Property::new(name, value)])
    }

    /// Removes properties.
    pub fn del_prop(&self, id: &ItemId, names: &[String]) -> Result<()> {
        let ids: Vec<PropertyId> = names.iter().map(PropertyId::new).collect();
        self.mount.metadata().delete(id, &ids)
    }

    /// Prints the items matching every condition (any condition with `any`).
    ///
    /// The search storer is asked first; mounts without one fall back to the
    /// metadata storer's search.
    pub fn search(&self, conditions: &[String], any: bool, out: &mut dyn Write) -> Result<()> {
        let mut parsed = conditions.iter().map(|c| parse_condition(c));
        let first = parsed
            .next()
            .ok_or_else(|| Error::query_unsupported("no search condition given"))??;
        let restriction = parsed.try_fold(first, |acc, next| {
            next.map(|r| if any { acc.or(r) } else { acc.and(r) })
        })?;

        let hits = match self.mount.search().search(&restriction) {
            Err(e) if e.kind() == ErrorKind::CapabilityUnsupported => {
                self.mount.metadata().search(&restriction)?
            },
            other => other?,
        };
        for hit in hits {
            emit(out, hit)?;
        }
        Ok(())
    }
}
