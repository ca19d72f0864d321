//! SQL restriction compiler.
//!
//! Produces a `WHERE` clause over the object-store schema, with numbered
//! parameters (`?1`, `?2`, ...). The clause expects the item table aliased
//! as `i`:
//!
//! ```sql
//! SELECT i.path FROM items i WHERE <clause> ORDER BY i.path
//! ```
//!
//! Ordinary properties match through an `EXISTS` sub-select over the
//! `properties` table. System-managed properties the store keeps as item
//! columns (size, timestamps, owner, kind) compare against those columns.
//! `LIKE` matching is ASCII case-insensitive, as `SQLite` defines it.

use super::{RestrictionMapper, compose};
use crate::models::{
    Condition, Operator, Property, PropertyId, PropertyType, PropertyValue, Restriction, system,
};
use crate::storage::mapping::{AttributeMapper, ValueMapper};
use crate::{Error, Result};

/// Escapes SQL LIKE wildcards in a string to make them literal.
///
/// `%`, `_` and `\` are prefixed with `\`; use with `ESCAPE '\'`.
///
/// # Examples
///
/// ```
/// use mountstore::storage::query::escape_like_wildcards;
///
/// assert_eq!(escape_like_wildcards("100%"), "100\\%");
/// assert_eq!(escape_like_wildcards("user_name"), "user\\_name");
/// assert_eq!(escape_like_wildcards("path\\file"), "path\\\\file");
/// ```
#[must_use]
pub fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// Converts a glob pattern (`*`, `?`) into a LIKE pattern.
///
/// Literal `%`, `_` and `\` are escaped before the glob wildcards are
/// translated, so a pattern can never smuggle in a LIKE wildcard.
///
/// # Examples
///
/// ```
/// use mountstore::storage::query::glob_to_like_pattern;
///
/// assert_eq!(glob_to_like_pattern("src/*.rs"), "src/%.rs");
/// assert_eq!(glob_to_like_pattern("test?.txt"), "test_.txt");
/// assert_eq!(glob_to_like_pattern("foo%*bar"), "foo\\%%bar");
/// ```
#[must_use]
pub fn glob_to_like_pattern(pattern: &str) -> String {
    let mut result = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            '*' => result.push('%'),
            '?' => result.push('_'),
            _ => result.push(c),
        }
    }
    result
}

/// Bound parameter of a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Text parameter.
    Text(String),
    /// Integer parameter.
    Integer(i64),
    /// Real parameter.
    Real(f64),
}

/// A compiled `WHERE` clause and its parameters, in `?N` order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// Boolean SQL expression.
    pub clause: String,
    /// Parameters; `params[0]` binds `?1`.
    pub params: Vec<SqlParam>,
}

/// Compiles restrictions for the `SQLite` object store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlRestrictionMapper;

/// Item column backing a system-managed property.
#[derive(Clone, Copy)]
struct Column {
    expr: &'static str,
    ty: PropertyType,
}

fn system_column(id: &PropertyId) -> Result<Option<Column>> {
    let column = match id.as_str() {
        system::SIZE => Column {
            expr: "length(i.content)",
            ty: PropertyType::Integer,
        },
        system::CREATION_DATETIME => Column {
            expr: "i.created_at",
            ty: PropertyType::Timestamp,
        },
        system::MODIFICATION_DATETIME => Column {
            expr: "i.modified_at",
            ty: PropertyType::Timestamp,
        },
        system::OWNER => Column {
            expr: "i.owner",
            ty: PropertyType::String,
        },
        system::CONTENT_FORMAT => Column {
            expr: "i.kind",
            ty: PropertyType::String,
        },
        other if system::is_system_managed(other) => {
            return Err(Error::query_unsupported(format!(
                "'{other}' is not searchable in this store"
            )));
        },
        _ => return Ok(None),
    };
    Ok(Some(column))
}

struct Builder {
    params: Vec<SqlParam>,
}

impl Builder {
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    fn leaf(&mut self, condition: &Condition) -> Result<String> {
        match system_column(&condition.property)? {
            Some(column) => self.column_leaf(column, condition),
            None => self.property_leaf(condition),
        }
    }

    fn property_leaf(&mut self, condition: &Condition) -> Result<String> {
        let name = self.bind(SqlParam::Text(condition.property.as_str().to_string()));
        let test = match &condition.operator {
            Operator::Equals(value) => {
                let native = AttributeMapper
                    .to_native(&Property::new(condition.property.clone(), value.clone()))
                    .map_err(|e| Error::query_unsupported(e.to_string()))?;
                let tag = self.bind(SqlParam::Text(native.type_tag));
                let text = self.bind(SqlParam::Text(native.text));
                format!("p.type_tag = {tag} AND p.text_value = {text}")
            },
            Operator::Contains(needle) => {
                let pattern = self.bind(SqlParam::Text(format!(
                    "%{}%",
                    escape_like_wildcards(needle)
                )));
                format!("p.type_tag = 'string' AND p.text_value LIKE {pattern} ESCAPE '\\'")
            },
            Operator::Wildcard(glob) => {
                let pattern = self.bind(SqlParam::Text(glob_to_like_pattern(glob)));
                format!("p.type_tag = 'string' AND p.text_value LIKE {pattern} ESCAPE '\\'")
            },
            Operator::Range { lower, upper } => {
                let ty = range_type(&condition.property, lower.as_ref(), upper.as_ref())?;
                let (tags, column) = match ty {
                    PropertyType::Integer | PropertyType::Float => {
                        ("p.type_tag IN ('integer', 'float')", "p.num_value")
                    },
                    PropertyType::Timestamp => ("p.type_tag = 'timestamp'", "p.num_value"),
                    _ => ("p.type_tag = 'string'", "p.text_value"),
                };
                let bounds = self.bounds(column, lower.as_ref(), upper.as_ref())?;
                format!("{tags} AND {bounds}")
            },
        };
        Ok(format!(
            "EXISTS (SELECT 1 FROM properties p WHERE p.item_id = i.id AND p.name = {name} AND {test})"
        ))
    }

    fn column_leaf(&mut self, column: Column, condition: &Condition) -> Result<String> {
        let property = &condition.property;
        match (&condition.operator, column.ty) {
            (Operator::Equals(value), PropertyType::String) => {
                let text = value.as_text().ok_or_else(|| type_mismatch(property, value))?;
                let param = self.bind(SqlParam::Text(text.to_string()));
                Ok(format!("({} = {param})", column.expr))
            },
            (Operator::Equals(value), _) => {
                let param = column_param(property, column.ty, value)?;
                let param = self.bind(param);
                Ok(format!("({} = {param})", column.expr))
            },
            (Operator::Contains(needle), PropertyType::String) => {
                let pattern = self.bind(SqlParam::Text(format!(
                    "%{}%",
                    escape_like_wildcards(needle)
                )));
                Ok(format!("({} LIKE {pattern} ESCAPE '\\')", column.expr))
            },
            (Operator::Wildcard(glob), PropertyType::String) => {
                let pattern = self.bind(SqlParam::Text(glob_to_like_pattern(glob)));
                Ok(format!("({} LIKE {pattern} ESCAPE '\\')", column.expr))
            },
            (Operator::Range { lower, upper }, ty) => {
                let bound_ty = range_type(property, lower.as_ref(), upper.as_ref())?;
                let compatible = bound_ty == ty
                    || (ty == PropertyType::Integer && bound_ty == PropertyType::Float);
                if !compatible {
                    return Err(Error::query_unsupported(format!(
                        "range over '{property}' needs {ty} bounds"
                    )));
                }
                let bounds = self.bounds(column.expr, lower.as_ref(), upper.as_ref())?;
                Ok(format!("({bounds})"))
            },
            (operator, ty) => Err(Error::query_unsupported(format!(
                "operator '{}' is not defined for {ty} property '{property}'",
                operator.as_str()
            ))),
        }
    }

    fn bounds(
        &mut self,
        column: &str,
        lower: Option<&PropertyValue>,
        upper: Option<&PropertyValue>,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(lower) = lower {
            let param = self.bind(bound_param(lower)?);
            parts.push(format!("{column} >= {param}"));
        }
        if let Some(upper) = upper {
            let param = self.bind(bound_param(upper)?);
            parts.push(format!("{column} <= {param}"));
        }
        Ok(parts.join(" AND "))
    }
}

/// Common type of the present range bounds.
fn range_type(
    property: &PropertyId,
    lower: Option<&PropertyValue>,
    upper: Option<&PropertyValue>,
) -> Result<PropertyType> {
    let numeric = |ty: PropertyType| matches!(ty, PropertyType::Integer | PropertyType::Float);
    let ty = match (lower.map(PropertyValue::property_type), upper.map(PropertyValue::property_type)) {
        (None, None) => {
            return Err(Error::query_unsupported(format!(
                "range over '{property}' has no bounds"
            )));
        },
        (Some(a), Some(b)) if a == b => a,
        (Some(a), Some(b)) if numeric(a) && numeric(b) => PropertyType::Float,
        (Some(a), Some(b)) => {
            return Err(Error::query_unsupported(format!(
                "range over '{property}' mixes {a} and {b} bounds"
            )));
        },
        (Some(a), None) | (None, Some(a)) => a,
    };
    match ty {
        PropertyType::String | PropertyType::Integer | PropertyType::Float | PropertyType::Timestamp => {
            if [lower, upper].into_iter().flatten().any(|v| !is_finite_bound(v)) {
                return Err(Error::query_unsupported(format!(
                    "range over '{property}' has a non-finite bound"
                )));
            }
            Ok(ty)
        },
        other => Err(Error::query_unsupported(format!(
            "range is not defined for {other} property '{property}'"
        ))),
    }
}

fn is_finite_bound(value: &PropertyValue) -> bool {
    !matches!(value, PropertyValue::Float(f) if !f.is_finite())
}

#[allow(clippy::cast_precision_loss)]
fn bound_param(value: &PropertyValue) -> Result<SqlParam> {
    match value {
        PropertyValue::String(s) => Ok(SqlParam::Text(s.clone())),
        PropertyValue::Integer(i) => Ok(SqlParam::Integer(*i)),
        PropertyValue::Float(f) => Ok(SqlParam::Real(*f)),
        PropertyValue::Timestamp(ts) => Ok(SqlParam::Integer(ts.timestamp_millis())),
        other => Err(Error::query_unsupported(format!(
            "{} is not a range bound",
            other.property_type()
        ))),
    }
}

fn column_param(property: &PropertyId, ty: PropertyType, value: &PropertyValue) -> Result<SqlParam> {
    match (ty, value) {
        (PropertyType::Integer, PropertyValue::Integer(i)) => Ok(SqlParam::Integer(*i)),
        (PropertyType::Timestamp, PropertyValue::Timestamp(ts)) => {
            Ok(SqlParam::Integer(ts.timestamp_millis()))
        },
        _ => Err(type_mismatch(property, value)),
    }
}

fn type_mismatch(property: &PropertyId, value: &PropertyValue) -> Error {
    Error::query_unsupported(format!(
        "'{property}' cannot be compared with a {} value",
        value.property_type()
    ))
}

impl RestrictionMapper for SqlRestrictionMapper {
    type Query = SqlQuery;

    fn compile(&self, restriction: &Restriction) -> Result<SqlQuery> {
        let mut builder = Builder { params: Vec::new() };
        let clause = compose(restriction, &mut |condition| builder.leaf(condition))?;
        Ok(SqlQuery {
            clause,
            params: builder.params,
        })
    }
}
