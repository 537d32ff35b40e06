//! SQL statement builder.
//!
//! A small chainable builder for read statements, for callers that hand SQL
//! to a server-side procedure. Fragments are inserted verbatim; nothing is
//! escaped or validated.

use std::fmt;

use tracing::debug;

/// A chainable `SELECT` builder.
///
/// # Example
///
/// ```
/// use oxide_record::QueryBuilder;
///
/// let sql = QueryBuilder::new("posts")
///     .select(&["id", "title"])
///     .where_clause("views > 10")
///     .order_by("created_at DESC")
///     .limit(5)
///     .build();
/// assert_eq!(
///     sql,
///     "SELECT id, title FROM posts WHERE views > 10 ORDER BY created_at DESC LIMIT 5"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBuilder {
    table: String,
    columns: Vec<String>,
    conditions: Vec<String>,
    order_by: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl QueryBuilder {
    /// Starts a statement over `table`.
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_owned(),
            ..Self::default()
        }
    }

    /// Selects `columns`. With none, every column is selected.
    #[must_use]
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    /// Adds a `WHERE` fragment. Several fragments are joined with `AND`.
    #[must_use]
    pub fn where_clause(mut self, condition: &str) -> Self {
        self.conditions.push(condition.to_owned());
        self
    }

    /// Sets the `ORDER BY` fragment.
    #[must_use]
    pub fn order_by(mut self, order: &str) -> Self {
        self.order_by = Some(order.to_owned());
        self
    }

    /// Sets the `LIMIT`.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the `OFFSET`.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Renders the statement.
    #[must_use]
    pub fn build(&self) -> String {
        let sql = self.to_string();
        debug!(%sql, "built statement");
        sql
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            write!(f, "SELECT * FROM {}", self.table)?;
        } else {
            write!(f, "SELECT {} FROM {}", self.columns.join(", "), self.table)?;
        }
        if !self.conditions.is_empty() {
            write!(f, " WHERE {}", self.conditions.join(" AND "))?;
        }
        if let Some(order) = &self.order_by {
            write!(f, " ORDER BY {order}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_select() {
        assert_eq!(QueryBuilder::new("tags").build(), "SELECT * FROM tags");
    }

    #[test]
    fn test_full_statement() {
        let sql = QueryBuilder::new("posts")
            .select(&["id"])
            .where_clause("views > 10")
            .where_clause("deleted_at IS NULL")
            .order_by("id")
            .limit(10)
            .offset(20)
            .build();
        assert_eq!(
            sql,
            "SELECT id FROM posts WHERE views > 10 AND deleted_at IS NULL ORDER BY id LIMIT 10 OFFSET 20"
        );
    }
}
