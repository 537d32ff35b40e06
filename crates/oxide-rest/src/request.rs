//! Request model and fluent request builder.
//!
//! A [`Request`] is a plain description of one table operation. Stores
//! interpret it: [`MemoryStore`](crate::MemoryStore) evaluates it against its
//! tables, [`RestClient`](crate::RestClient) renders it as a PostgREST call.

use std::fmt;

use serde_json::Value;

use crate::envelope::{Envelope, Row};
use crate::store::DataStore;

/// Column filter operators understood by the store.
pub const OPERATORS: &[&str] = &["eq", "neq", "gt", "gte", "lt", "lte", "in", "is", "like", "ilike"];

/// A single column filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Column name.
    pub column: String,
    /// Store operator (`eq`, `neq`, `in`, ...).
    pub operator: String,
    /// Right-hand value. `in` expects an array, `is` expects `null` or a bool.
    pub value: Value,
    /// Whether the filter is wrapped in `not`.
    pub negated: bool,
}

impl Filter {
    /// Creates a filter.
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value,
            negated: false,
        }
    }

    /// Negates the filter.
    #[must_use]
    pub const fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "not." } else { "" };
        write!(f, "{}={not}{}.{}", self.column, self.operator, self.value)
    }
}

/// What a request does to its table.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Read rows, projecting the given select expression.
    Select {
        /// Select expression (`*`, `id,name`, `*, tags(*)`).
        columns: String,
    },
    /// Insert new rows.
    Insert {
        /// Rows to insert.
        rows: Vec<Row>,
    },
    /// Insert rows, merging on primary-key conflict.
    Upsert {
        /// Rows to upsert.
        rows: Vec<Row>,
    },
    /// Update matching rows.
    Update {
        /// Column values to set.
        values: Row,
    },
    /// Delete matching rows.
    Delete,
}

impl Action {
    /// `true` for every action other than [`Action::Select`].
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::Select { .. })
    }
}

/// How many rows the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// Any number of rows, returned as an array.
    #[default]
    Many,
    /// Exactly one row, returned as an object. Anything else is a 406.
    Single,
    /// Zero or one row, returned as an object or `null`.
    MaybeSingle,
}

/// Ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to order by.
    pub column: String,
    /// Ascending when `true`.
    pub ascending: bool,
}

/// A complete table request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Target table.
    pub table: String,
    /// Operation.
    pub action: Action,
    /// Filters, all of which must match.
    pub filters: Vec<Filter>,
    /// Optional ordering.
    pub order: Option<Order>,
    /// Optional row limit.
    pub limit: Option<usize>,
    /// Expected result cardinality.
    pub cardinality: Cardinality,
    /// Select expression for rows returned by a mutation. `None` returns
    /// no representation.
    pub returning: Option<String>,
}

impl Request {
    /// Looks up the value of the first filter on `column` using `operator`.
    #[must_use]
    pub fn filter_value(&self, column: &str, operator: &str) -> Option<&Value> {
        self.filters
            .iter()
            .find(|f| f.column == column && f.operator == operator && !f.negated)
            .map(|f| &f.value)
    }
}

/// Fluent builder for [`Request`].
///
/// # Example
///
/// ```
/// use oxide_rest::RequestBuilder;
///
/// let request = RequestBuilder::from("posts")
///     .select("id,title")
///     .eq("author_id", 3)
///     .order("created_at", false)
///     .limit(10)
///     .build();
/// assert_eq!(request.filters.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Starts a select of every column on `table`.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            request: Request {
                table: table.into(),
                action: Action::Select {
                    columns: String::from("*"),
                },
                filters: Vec::new(),
                order: None,
                limit: None,
                cardinality: Cardinality::Many,
                returning: None,
            },
        }
    }

    /// Sets the select expression.
    ///
    /// On a mutation this asks the store to return the affected rows.
    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        let columns = columns.into();
        if self.request.action.is_mutation() {
            self.request.returning = Some(columns);
        } else {
            self.request.action = Action::Select { columns };
        }
        self
    }

    /// Turns the request into an insert.
    #[must_use]
    pub fn insert(mut self, rows: Vec<Row>) -> Self {
        self.request.action = Action::Insert { rows };
        self
    }

    /// Turns the request into an upsert.
    #[must_use]
    pub fn upsert(mut self, rows: Vec<Row>) -> Self {
        self.request.action = Action::Upsert { rows };
        self
    }

    /// Turns the request into an update.
    #[must_use]
    pub fn update(mut self, values: Row) -> Self {
        self.request.action = Action::Update { values };
        self
    }

    /// Turns the request into a delete.
    #[must_use]
    pub fn delete(mut self) -> Self {
        self.request.action = Action::Delete;
        self
    }

    /// Adds a filter with an arbitrary operator.
    #[must_use]
    pub fn filter(
        mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.request
            .filters
            .push(Filter::new(column, operator, value.into()));
        self
    }

    /// Adds a negated filter.
    #[must_use]
    pub fn not(
        mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.request
            .filters
            .push(Filter::new(column, operator, value.into()).negate());
        self
    }

    /// `column = value`.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, "eq", value)
    }

    /// `column <> value`.
    #[must_use]
    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, "neq", value)
    }

    /// `column IS NULL`.
    #[must_use]
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(column, "is", Value::Null)
    }

    /// `column IN (values...)`.
    #[must_use]
    pub fn in_list(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(column, "in", Value::Array(values))
    }

    /// Orders the result.
    #[must_use]
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.request.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    /// Limits the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.request.limit = Some(limit);
        self
    }

    /// Expects exactly one row.
    #[must_use]
    pub const fn single(mut self) -> Self {
        self.request.cardinality = Cardinality::Single;
        self
    }

    /// Expects zero or one row.
    #[must_use]
    pub const fn maybe_single(mut self) -> Self {
        self.request.cardinality = Cardinality::MaybeSingle;
        self
    }

    /// Finishes the request.
    #[must_use]
    pub fn build(self) -> Request {
        self.request
    }

    /// Builds the request and executes it against `store`.
    pub async fn execute(self, store: &dyn DataStore) -> Envelope {
        store.execute(self.build()).await
    }
}
