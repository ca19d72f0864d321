//! Search restriction compilation.
//!
//! A [`RestrictionMapper`] turns a backend-neutral [`Restriction`] into the
//! native query a backend submits. Compilation is pure: it performs no I/O,
//! produces identical output for identical input, and rejects unsupported
//! operator/type combinations with
//! [`Error::QueryUnsupported`](crate::Error::QueryUnsupported) instead of
//! widening the query.

mod fts;
mod sql;

pub use fts::{
    FtsRestrictionMapper, exact_token, fts_column, fts_key_column, index_text, quote_phrase,
};
pub use sql::{SqlParam, SqlQuery, SqlRestrictionMapper, escape_like_wildcards, glob_to_like_pattern};

use crate::models::{Condition, Restriction};
use crate::{Error, Result};

/// Compiles restrictions into a backend-native query.
pub trait RestrictionMapper {
    /// The native query form.
    type Query;

    /// Compiles a restriction tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryUnsupported`] if any part of the tree cannot be
    /// expressed natively.
    fn compile(&self, restriction: &Restriction) -> Result<Self::Query>;
}

/// Walks a restriction tree, joining leaf fragments with `AND` / `OR`.
///
/// Every composite is parenthesized; empty composites are rejected.
pub(crate) fn compose<F>(restriction: &Restriction, leaf: &mut F) -> Result<String>
where
    F: FnMut(&Condition) -> Result<String>,
{
    let (children, joiner) = match restriction {
        Restriction::Condition(condition) => return leaf(condition),
        Restriction::And(children) => (children, " AND "),
        Restriction::Or(children) => (children, " OR "),
    };
    if children.is_empty() {
        return Err(Error::query_unsupported(format!(
            "empty{}composite",
            joiner.to_lowercase()
        )));
    }
    let parts = children
        .iter()
        .map(|child| compose(child, leaf))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(joiner)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_parenthesizes_composites() {
        let r = Restriction::equals("a", 1_i64)
            .or(Restriction::equals("b", 2_i64))
            .and(Restriction::equals("c", 3_i64));
        let out = compose(&r, &mut |c: &Condition| Ok(c.property.to_string())).unwrap();
        assert_eq!(out, "((a OR b) AND c)");
    }

    #[test]
    fn test_compose_rejects_empty() {
        let err = compose(&Restriction::Or(vec![]), &mut |_: &Condition| Ok(String::new()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::QueryUnsupported);
        assert_eq!(err.to_string(), "query not supported: empty or composite");
    }
}
