//! Filter value shapes and their normalized clause form.
//!
//! Every filter a caller can express (bare text, number, boolean, list, or an
//! explicit `{ operator, value }` pair) routes to a [`FilterClause`]. The
//! query translator and the in-memory view both consume clauses, so routing
//! rules are decided here once.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A primitive filter operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Operand carried by a structured filter or a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Many(Vec<Scalar>),
    One(Scalar),
}

/// Comparison operators understood by the collection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "equals-ci")]
    EqualsInsensitive,
    #[serde(rename = "not-equals")]
    NotEquals,
    #[serde(rename = "less-than")]
    LessThan,
    #[serde(rename = "less-or-equal")]
    LessOrEqual,
    #[serde(rename = "greater-than")]
    GreaterThan,
    #[serde(rename = "greater-or-equal")]
    GreaterOrEqual,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not-in")]
    NotIn,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not-contains")]
    NotContains,
    #[serde(rename = "contains-ci")]
    ContainsInsensitive,
    #[serde(rename = "not-contains-ci")]
    NotContainsInsensitive,
    #[serde(rename = "is-null")]
    IsNull,
    #[serde(rename = "is-not-null")]
    IsNotNull,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "starts-with")]
    StartsWith,
    #[serde(rename = "starts-with-ci")]
    StartsWithInsensitive,
    #[serde(rename = "ends-with")]
    EndsWith,
    #[serde(rename = "ends-with-ci")]
    EndsWithInsensitive,
}

/// How many operand values an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No value (null checks)
    Nullary,
    /// Exactly one scalar
    Unary,
    /// A list of scalars
    Variadic,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 20] = [
        FilterOperator::Equals,
        FilterOperator::EqualsInsensitive,
        FilterOperator::NotEquals,
        FilterOperator::LessThan,
        FilterOperator::LessOrEqual,
        FilterOperator::GreaterThan,
        FilterOperator::GreaterOrEqual,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::Contains,
        FilterOperator::NotContains,
        FilterOperator::ContainsInsensitive,
        FilterOperator::NotContainsInsensitive,
        FilterOperator::IsNull,
        FilterOperator::IsNotNull,
        FilterOperator::Between,
        FilterOperator::StartsWith,
        FilterOperator::StartsWithInsensitive,
        FilterOperator::EndsWith,
        FilterOperator::EndsWithInsensitive,
    ];

    /// Wire token, including the leading `$`.
    pub fn wire(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "$eq",
            FilterOperator::EqualsInsensitive => "$eqi",
            FilterOperator::NotEquals => "$ne",
            FilterOperator::LessThan => "$lt",
            FilterOperator::LessOrEqual => "$lte",
            FilterOperator::GreaterThan => "$gt",
            FilterOperator::GreaterOrEqual => "$gte",
            FilterOperator::In => "$in",
            FilterOperator::NotIn => "$notIn",
            FilterOperator::Contains => "$contains",
            FilterOperator::NotContains => "$notContains",
            FilterOperator::ContainsInsensitive => "$containsi",
            FilterOperator::NotContainsInsensitive => "$notContainsi",
            FilterOperator::IsNull => "$null",
            FilterOperator::IsNotNull => "$notNull",
            FilterOperator::Between => "$between",
            FilterOperator::StartsWith => "$startsWith",
            FilterOperator::StartsWithInsensitive => "$startsWithi",
            FilterOperator::EndsWith => "$endsWith",
            FilterOperator::EndsWithInsensitive => "$endsWithi",
        }
    }

    /// Look up an operator by its wire token.
    pub fn from_wire(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.wire() == token)
    }

    pub fn arity(&self) -> Arity {
        match self {
            FilterOperator::IsNull | FilterOperator::IsNotNull => Arity::Nullary,
            FilterOperator::In | FilterOperator::NotIn | FilterOperator::Between => {
                Arity::Variadic
            }
            _ => Arity::Unary,
        }
    }

    fn accepts_len(&self, len: usize) -> bool {
        match self {
            FilterOperator::Between => len == 2,
            _ => len > 0,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire())
    }
}

/// An explicit `{ operator, value }` filter description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFilter {
    pub operator: FilterOperator,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Operand>,
}

impl StructuredFilter {
    pub fn new(operator: FilterOperator, value: Option<Operand>) -> Self {
        Self { operator, value }
    }

    /// Normalize into a clause, or `None` when the shape is malformed.
    pub fn to_clause(&self) -> Option<FilterClause> {
        let operator = self.operator;
        let operand = match (operator.arity(), &self.value) {
            (Arity::Nullary, _) => None,
            (Arity::Unary, Some(Operand::One(value))) => Some(Operand::One(value.clone())),
            (Arity::Variadic, Some(Operand::Many(items))) if operator.accepts_len(items.len()) => {
                Some(Operand::Many(items.clone()))
            }
            _ => return None,
        };
        Some(FilterClause { operator, operand })
    }
}

/// Any value a caller may attach to a filtered field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// "Value is one of"
    List(Vec<Scalar>),
    Scalar(Scalar),
    Structured(StructuredFilter),
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        FilterValue::Scalar(Scalar::Text(value.into()))
    }

    pub fn one_of<S: Into<Scalar>>(values: impl IntoIterator<Item = S>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }

    pub fn structured(operator: FilterOperator, value: Option<Operand>) -> Self {
        FilterValue::Structured(StructuredFilter::new(operator, value))
    }

    /// Route the value to its clause.
    ///
    /// Blank text and empty lists produce no clause: an unset filter must
    /// not constrain results.
    pub fn to_clause(&self) -> Option<FilterClause> {
        match self {
            FilterValue::Scalar(Scalar::Text(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                Some(FilterClause::one(
                    FilterOperator::ContainsInsensitive,
                    Scalar::Text(trimmed.to_string()),
                ))
            }
            FilterValue::Scalar(scalar) => {
                Some(FilterClause::one(FilterOperator::Equals, scalar.clone()))
            }
            FilterValue::List(items) if items.is_empty() => None,
            FilterValue::List(items) => Some(FilterClause {
                operator: FilterOperator::In,
                operand: Some(Operand::Many(items.clone())),
            }),
            FilterValue::Structured(filter) => filter.to_clause(),
        }
    }
}

/// Normalized filter: one operator and its operand.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub operator: FilterOperator,
    pub operand: Option<Operand>,
}

impl FilterClause {
    pub fn one(operator: FilterOperator, value: Scalar) -> Self {
        Self {
            operator,
            operand: Some(Operand::One(value)),
        }
    }
}
