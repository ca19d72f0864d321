//! FTS5 restriction compiler.
//!
//! Compiles restrictions into an FTS5 `MATCH` expression over a fixed set of
//! indexed fields. Each field has two FTS5 columns: the tokenized text named
//! by [`fts_column`], and a key column named by [`fts_key_column`] holding the
//! whole value as one token (see [`exact_token`]).
//!
//! | Operator | Expression |
//! |----------|------------|
//! | contains | `f_title : "a phrase"` (token match) |
//! | equals / wildcard `abc` | `k_title : v616263` (whole value) |
//! | wildcard `abc*` | `k_title : v616263*` (value prefix) |
//! | range, inner wildcards | rejected |

use super::{RestrictionMapper, compose};
use crate::models::{Condition, Operator, PropertyId, PropertyValue, Restriction};
use crate::storage::mapping::format_timestamp;
use crate::{Error, Result};

/// Quotes text as an FTS5 string, doubling embedded quotes.
///
/// # Examples
///
/// ```
/// use mountstore::storage::query::quote_phrase;
///
/// assert_eq!(quote_phrase(r#"say "hi""#), r#""say ""hi""""#);
/// ```
#[must_use]
pub fn quote_phrase(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// FTS5 column name of an indexed property.
///
/// Characters outside `[A-Za-z0-9_]` become `_`; the `f_` prefix keeps the
/// name clear of FTS5 keywords and the index's own columns.
#[must_use]
pub fn fts_column(id: &PropertyId) -> String {
    format!("f_{}", sanitize(id))
}

/// FTS5 key column of an indexed property, holding [`exact_token`] values.
#[must_use]
pub fn fts_key_column(id: &PropertyId) -> String {
    format!("k_{}", sanitize(id))
}

fn sanitize(id: &PropertyId) -> String {
    id.as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Encodes a whole value as a single FTS5 token.
///
/// The hex form is made only of token characters and survives case folding,
/// so a token match on it is byte equality, and a prefix query on it is a
/// byte prefix of the value.
///
/// # Examples
///
/// ```
/// use mountstore::storage::query::exact_token;
///
/// assert_eq!(exact_token("Ab"), "v4162");
/// ```
#[must_use]
pub fn exact_token(text: &str) -> String {
    format!("v{}", hex::encode(text))
}

/// Text form of a value as it is written into the index.
///
/// Returns `None` for values that are not indexed (opaque data, non-finite
/// floats).
#[must_use]
pub fn index_text(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::String(s) => Some(s.clone()),
        PropertyValue::Integer(i) => Some(i.to_string()),
        PropertyValue::Float(f) if f.is_finite() => Some(f.to_string()),
        PropertyValue::Float(_) | PropertyValue::Opaque { .. } => None,
        PropertyValue::Boolean(b) => Some(b.to_string()),
        PropertyValue::Timestamp(ts) => Some(format_timestamp(ts)),
        PropertyValue::List(items) => {
            let parts: Vec<String> = items.iter().filter_map(index_text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        },
    }
}

/// Compiles restrictions for a full-text index with the given fields.
#[derive(Debug, Clone, Default)]
pub struct FtsRestrictionMapper {
    fields: Vec<PropertyId>,
}

impl FtsRestrictionMapper {
    /// Creates a mapper over the indexed fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PropertyId>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the indexed fields.
    #[must_use]
    pub fn fields(&self) -> &[PropertyId] {
        &self.fields
    }

    fn column(&self, id: &PropertyId) -> Result<String> {
        if self.fields.contains(id) {
            Ok(fts_column(id))
        } else {
            Err(Error::query_unsupported(format!(
                "'{id}' is not an indexed field"
            )))
        }
    }

    fn leaf(&self, condition: &Condition) -> Result<String> {
        let column = self.column(&condition.property)?;
        let key_column = fts_key_column(&condition.property);
        match &condition.operator {
            Operator::Equals(value @ (PropertyValue::List(_) | PropertyValue::Opaque { .. })) => {
                Err(Error::query_unsupported(format!(
                    "equals on a {} value is not supported by the index",
                    value.property_type()
                )))
            },
            Operator::Equals(value) => {
                let text = index_text(value).ok_or_else(|| {
                    Error::query_unsupported(format!(
                        "'{}' has no indexed form to compare against",
                        condition.property
                    ))
                })?;
                Ok(format!("{key_column} : {}", exact_token(&text)))
            },
            Operator::Contains(text) => {
                if text.trim().is_empty() {
                    return Err(Error::query_unsupported(format!(
                        "empty search term for '{}'",
                        condition.property
                    )));
                }
                Ok(format!("{column} : {}", quote_phrase(text)))
            },
            Operator::Wildcard(pattern) => wildcard(&key_column, pattern),
            Operator::Range { .. } => Err(Error::query_unsupported(
                "range queries are not supported by the index",
            )),
        }
    }
}

fn wildcard(key_column: &str, pattern: &str) -> Result<String> {
    let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
    if prefix.contains(['*', '?']) {
        return Err(Error::query_unsupported(format!(
            "wildcard '{pattern}' is not a trailing prefix pattern"
        )));
    }
    if prefix.is_empty() {
        return Err(Error::query_unsupported("empty wildcard prefix"));
    }
    let star = if prefix.len() < pattern.len() { "*" } else { "" };
    Ok(format!("{key_column} : {}{star}", exact_token(prefix)))
}

impl RestrictionMapper for FtsRestrictionMapper {
    type Query = String;

    fn compile(&self, restriction: &Restriction) -> Result<String> {
        compose(restriction, &mut |condition| self.leaf(condition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn mapper() -> FtsRestrictionMapper {
        FtsRestrictionMapper::new(["title", "dc:author"])
    }

    #[test]
    fn test_equals_matches_the_key_column() {
        let r = Restriction::equals("title", "memo")
            .or(Restriction::contains("dc:author", "o\"brien"));
        assert_eq!(
            mapper().compile(&r).unwrap(),
            r#"(k_title : v6d656d6f OR f_dc_author : "o""brien")"#
        );
        assert_eq!(
            mapper().compile(&Restriction::equals("title", 7_i64)).unwrap(),
            "k_title : v37"
        );
    }

    #[test]
    fn test_trailing_wildcard_is_value_prefix() {
        assert_eq!(
            mapper()
                .compile(&Restriction::wildcard("title", "rep*"))
                .unwrap(),
            "k_title : v726570*"
        );
        assert_eq!(
            mapper()
                .compile(&Restriction::wildcard("title", "exact"))
                .unwrap(),
            "k_title : v6578616374"
        );
    }

    #[test]
    fn test_key_column_names() {
        assert_eq!(fts_key_column(&PropertyId::new("dc:author")), "k_dc_author");
        assert_eq!(exact_token(""), "v");
    }

    #[test_case(Restriction::range("title", Some("a".into()), None) ; "range")]
    #[test_case(Restriction::wildcard("title", "*port") ; "leading star")]
    #[test_case(Restriction::wildcard("title", "re?ort") ; "question mark")]
    #[test_case(Restriction::wildcard("title", "*") ; "bare star")]
    #[test_case(Restriction::contains("body", "x") ; "unknown field")]
    #[test_case(Restriction::contains("title", "  ") ; "blank term")]
    #[test_case(Restriction::wildcard("title", "a*b") ; "inner star")]
    #[test_case(Restriction::equals("title", f64::NAN) ; "non-finite equals")]
    #[test_case(Restriction::equals("title", vec![PropertyValue::from("a")]) ; "list equals")]
    fn test_unsupported(restriction: Restriction) {
        let err = mapper().compile(&restriction).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::QueryUnsupported);
    }

    #[test]
    fn test_index_text() {
        assert_eq!(index_text(&PropertyValue::from(3_i64)).as_deref(), Some("3"));
        assert_eq!(
            index_text(&PropertyValue::List(vec!["a".into(), 1_i64.into()])).as_deref(),
            Some("a 1")
        );
        assert_eq!(index_text(&PropertyValue::Float(f64::NAN)), None);
    }
}
