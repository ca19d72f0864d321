//! Backend-neutral search restrictions.
//!
//! A restriction is a boolean tree of conditions over properties. Callers
//! build it without knowing the backend; `storage::query` compiles it into
//! the backend's native query syntax.

use super::{PropertyId, PropertyValue};

/// Comparison applied to one property.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Value equals the given value (type included).
    Equals(PropertyValue),
    /// Text value contains the given substring or term.
    Contains(String),
    /// Value lies within inclusive bounds. At least one bound must be set.
    Range {
        /// Inclusive lower bound.
        lower: Option<PropertyValue>,
        /// Inclusive upper bound.
        upper: Option<PropertyValue>,
    },
    /// Text value matches a glob pattern (`*` any run, `?` one character).
    Wildcard(String),
}

impl Operator {
    /// Returns the operator name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equals(_) => "equals",
            Self::Contains(_) => "contains",
            Self::Range { .. } => "range",
            Self::Wildcard(_) => "wildcard",
        }
    }
}

/// A leaf condition: `(property, operator)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The property to test.
    pub property: PropertyId,
    /// The comparison.
    pub operator: Operator,
}

/// Boolean restriction tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// A single condition.
    Condition(Condition),
    /// All children must match.
    And(Vec<Restriction>),
    /// At least one child must match.
    Or(Vec<Restriction>),
}

impl Restriction {
    /// `property == value`.
    #[must_use]
    pub fn equals(property: impl Into<PropertyId>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(property, Operator::Equals(value.into()))
    }

    /// `property` contains `text`.
    #[must_use]
    pub fn contains(property: impl Into<PropertyId>, text: impl Into<String>) -> Self {
        Self::condition(property, Operator::Contains(text.into()))
    }

    /// `lower <= property <= upper`.
    #[must_use]
    pub fn range(
        property: impl Into<PropertyId>,
        lower: Option<PropertyValue>,
        upper: Option<PropertyValue>,
    ) -> Self {
        Self::condition(property, Operator::Range { lower, upper })
    }

    /// `property` matches the glob `pattern`.
    #[must_use]
    pub fn wildcard(property: impl Into<PropertyId>, pattern: impl Into<String>) -> Self {
        Self::condition(property, Operator::Wildcard(pattern.into()))
    }

    fn condition(property: impl Into<PropertyId>, operator: Operator) -> Self {
        Self::Condition(Condition {
            property: property.into(),
            operator,
        })
    }

    /// Combines `self` and `other` with AND.
    ///
    /// Nested ANDs are flattened.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut children) => {
                children.push(other);
                Self::And(children)
            },
            first => Self::And(vec![first, other]),
        }
    }

    /// Combines `self` and `other` with OR.
    ///
    /// Nested ORs are flattened.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut children) => {
                children.push(other);
                Self::Or(children)
            },
            first => Self::Or(vec![first, other]),
        }
    }

    /// Iterates over every leaf condition, depth first.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Self::Condition(c) => out.push(c),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            },
        }
    }
}
