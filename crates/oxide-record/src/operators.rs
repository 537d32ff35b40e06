//! Comparison operator resolution and where-clause conditions.
//!
//! Callers may spell operators the way they read (`"greater than"`, `"!="`,
//! `"contains"`); [`resolve`] maps them onto the store vocabulary. Unknown
//! tokens pass through untouched and are left for the store to reject.

use std::fmt;

use oxide_rest::RequestBuilder;
use serde_json::Value;

const EQUAL: &[&str] = &["=", "==", "===", "eq", "equals", "equal"];
const INCLUDE: &[&str] = &["in", "include", "includes", "within", "contain", "contains"];
const NOT_EQUAL: &[&str] = &["not", "!=", "!==", "<>", "is not", "not eq", "! eq"];
const GREATER: &[&str] = &[">", "gt", "greater than"];
const LESSER: &[&str] = &["<", "lt", "less than"];
const GREATER_OR_EQUAL: &[&str] = &[">=", "gte", "greater than or equal to"];
const LESSER_OR_EQUAL: &[&str] = &["<=", "lte", "less than or equal to"];

/// A store operator plus negation flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOperator {
    /// Store operator (`eq`, `in`, `gt`, `lt`, `gte`, `lte` or a pass-through token).
    pub operator: String,
    /// Whether the comparison must be negated.
    pub negated: bool,
}

impl fmt::Display for ResolvedOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not.{}", self.operator)
        } else {
            write!(f, "{}", self.operator)
        }
    }
}

/// Resolves a human-friendly operator token. Case-sensitive.
///
/// ```
/// use oxide_record::operators::resolve;
///
/// assert_eq!(resolve("greater than").operator, "gt");
/// let not = resolve("<>");
/// assert_eq!((not.operator.as_str(), not.negated), ("eq", true));
/// assert_eq!(resolve("ilike").operator, "ilike");
/// ```
#[must_use]
pub fn resolve(token: &str) -> ResolvedOperator {
    let groups: [(&[&str], &str, bool); 7] = [
        (EQUAL, "eq", false),
        (INCLUDE, "in", false),
        (NOT_EQUAL, "eq", true),
        (GREATER, "gt", false),
        (LESSER, "lt", false),
        (GREATER_OR_EQUAL, "gte", false),
        (LESSER_OR_EQUAL, "lte", false),
    ];
    groups
        .iter()
        .find(|(tokens, _, _)| tokens.contains(&token))
        .map_or_else(
            || ResolvedOperator {
                operator: token.to_owned(),
                negated: false,
            },
            |(_, operator, negated)| ResolvedOperator {
                operator: (*operator).to_owned(),
                negated: *negated,
            },
        )
}

/// A where-clause entry: `column <operator> value`.
///
/// Without an operator the condition is an equality test.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column name.
    pub column: String,
    /// Right-hand value.
    pub value: Value,
    /// Operator token, resolved at apply time.
    pub operator: Option<String>,
}

impl Condition {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            operator: None,
        }
    }

    /// `column <operator> value` with a human-friendly operator token.
    pub fn op(
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            operator: Some(operator.into()),
        }
    }

    /// Adds this condition to a request.
    #[must_use]
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        let Some(token) = &self.operator else {
            return builder.eq(self.column.clone(), self.value.clone());
        };
        let resolved = resolve(token);
        if resolved.negated {
            builder.not(self.column.clone(), resolved.operator, self.value.clone())
        } else {
            builder.filter(self.column.clone(), resolved.operator, self.value.clone())
        }
    }
}

impl<V: Into<Value>> From<(&str, V)> for Condition {
    fn from((column, value): (&str, V)) -> Self {
        Self::eq(column, value)
    }
}

impl<V: Into<Value>> From<(&str, &str, V)> for Condition {
    fn from((column, operator, value): (&str, &str, V)) -> Self {
        Self::op(column, operator, value)
    }
}

/// Applies every condition in order.
#[must_use]
pub fn apply_all(conditions: &[Condition], builder: RequestBuilder) -> RequestBuilder {
    conditions
        .iter()
        .fold(builder, |builder, condition| condition.apply(builder))
}
