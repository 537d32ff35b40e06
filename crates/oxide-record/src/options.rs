//! Per-call options for manager and record operations.

/// Sort direction for [`FetchOptions::order_by`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

impl Direction {
    /// Whether the direction is ascending.
    #[must_use]
    pub const fn is_ascending(self) -> bool {
        matches!(self, Self::Asc)
    }
}

/// Options for reads returning several rows.
///
/// # Example
///
/// ```
/// use oxide_record::{Direction, FetchOptions};
///
/// let options = FetchOptions::new()
///     .order_by("created_at", Direction::Asc)
///     .limit(20)
///     .with_trashed();
/// assert_eq!(options.limit, Some(20));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Column to sort by.
    pub order_by: Option<String>,
    /// Sort direction. Only used together with `order_by`.
    pub direction: Direction,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Include soft-deleted rows.
    pub with_trashed: bool,
    /// Relations to embed in the select expression.
    pub with: Vec<String>,
}

impl FetchOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts by `column`.
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order_by = Some(column.to_owned());
        self.direction = direction;
        self
    }

    /// Limits the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Includes soft-deleted rows.
    #[must_use]
    pub const fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    /// Embeds a relation.
    #[must_use]
    pub fn with(mut self, relation: &str) -> Self {
        self.with.push(relation.to_owned());
        self
    }
}

/// How a record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Set `deleted_at`.
    Soft,
    /// Remove the row.
    Hard,
}

/// Options for [`Record::delete`](crate::Record::delete).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Overrides the model's soft-delete setting.
    pub mode: Option<DeleteMode>,
}

impl DeleteOptions {
    /// Always soft delete.
    #[must_use]
    pub const fn soft() -> Self {
        Self {
            mode: Some(DeleteMode::Soft),
        }
    }

    /// Always remove the row.
    #[must_use]
    pub const fn hard() -> Self {
        Self {
            mode: Some(DeleteMode::Hard),
        }
    }
}

/// Column selection for duplicates. `except` wins over `only`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateOptions {
    /// Columns left out of the copy.
    pub except: Option<Vec<String>>,
    /// The only columns copied.
    pub only: Option<Vec<String>>,
}

impl DuplicateOptions {
    /// Copies everything but `columns`.
    #[must_use]
    pub fn except(columns: &[&str]) -> Self {
        Self {
            except: Some(columns.iter().map(|c| (*c).to_owned()).collect()),
            only: None,
        }
    }

    /// Copies only `columns`.
    #[must_use]
    pub fn only(columns: &[&str]) -> Self {
        Self {
            except: None,
            only: Some(columns.iter().map(|c| (*c).to_owned()).collect()),
        }
    }

    pub(crate) fn keeps(&self, column: &str) -> bool {
        if let Some(except) = &self.except {
            return !except.iter().any(|c| c == column);
        }
        self.only
            .as_ref()
            .is_none_or(|only| only.iter().any(|c| c == column))
    }
}

/// Options for [`Record::reset_has_many`](crate::Record::reset_has_many).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Upsert through this procedure, called with `{"data": rows}`,
    /// instead of a direct upsert.
    pub rpc: Option<String>,
}

impl ResetOptions {
    /// Upserts through `procedure`.
    #[must_use]
    pub fn rpc(procedure: &str) -> Self {
        Self {
            rpc: Some(procedure.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_defaults() {
        let options = FetchOptions::new();
        assert_eq!(options.direction, Direction::Desc);
        assert!(!options.with_trashed);
        assert!(options.order_by.is_none());
    }

    #[test]
    fn test_duplicate_except_wins() {
        let options = DuplicateOptions {
            except: Some(vec!["title".into()]),
            only: Some(vec!["title".into(), "body".into()]),
        };
        assert!(!options.keeps("title"));
        assert!(options.keeps("views"));

        let only = DuplicateOptions::only(&["body"]);
        assert!(only.keeps("body"));
        assert!(!only.keeps("title"));

        assert!(DuplicateOptions::default().keeps("anything"));
    }
}
