//! Model trait and model configuration.
//!
//! A model is a plain serde struct describing one table row, plus a
//! [`ModelOptions`] value describing how the table is stored: identifier
//! column(s), casts, soft deletes, timestamps, default select expression,
//! introspection procedure and relationships.

use std::fmt;

use oxide_rest::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cast::{CastTable, Caster, Formatter};
use crate::error::{RecordError, Result};
use crate::manager::Manager;
use crate::relations::Relationship;

/// Default introspection procedure.
pub const DEFAULT_DESCRIBE_FUNCTION: &str = "describe_table";

/// A table-backed model.
///
/// # Example
///
/// ```ignore
/// use oxide_record::{Model, ModelOptions, Relationship, RelationKind};
/// use oxide_record::cast::casters;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Post {
///     id: Option<i64>,
///     title: String,
///     views: i64,
/// }
///
/// impl Model for Post {
///     const NAME: &'static str = "Post";
///
///     fn options() -> ModelOptions {
///         ModelOptions::new()
///             .soft_deletes(true)
///             .cast("views", casters::integer())
///             .relation(Relationship::named("post_tags", RelationKind::ManyToMany))
///     }
/// }
///
/// // Table name is inferred as `posts`.
/// let post = Post::objects().find(1).await?;
/// let typed: Post = post.model()?;
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Model name. Drives table-name inference and relation naming.
    const NAME: &'static str;

    /// Explicit table name. When `None` the table is the pluralized
    /// snake-case form of [`Model::NAME`].
    const TABLE: Option<&'static str> = None;

    /// Storage configuration. Read once per process.
    fn options() -> ModelOptions {
        ModelOptions::new()
    }

    /// Returns the Manager for this model.
    fn objects() -> Manager<Self> {
        Manager::new()
    }
}

/// Identifier column(s) of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdColumn {
    /// One identifier column.
    Single(String),
    /// Several columns that together identify a row.
    Composite(Vec<String>),
}

impl IdColumn {
    /// The identifier column names.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Single(column) => vec![column.as_str()],
            Self::Composite(columns) => columns.iter().map(String::as_str).collect(),
        }
    }

    /// Whether `column` is part of the identifier.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Pairs each identifier column with its value from `key`.
    ///
    /// # Errors
    ///
    /// [`RecordError::IdentifierArity`] when the key shape does not match,
    /// [`RecordError::MissingIdentifier`] when a composite key lacks a column.
    pub fn filters(&self, model: &str, key: &Key) -> Result<Vec<(String, Value)>> {
        match (self, key) {
            (Self::Single(column), Key::Value(value)) => Ok(vec![(column.clone(), value.clone())]),
            (Self::Composite(columns), Key::Composite(values)) => columns
                .iter()
                .map(|column| {
                    values
                        .get(column)
                        .map(|value| (column.clone(), value.clone()))
                        .ok_or_else(|| RecordError::MissingIdentifier(column.clone()))
                })
                .collect(),
            (Self::Composite(columns), Key::Value(_)) => Err(RecordError::IdentifierArity {
                model: model.to_owned(),
                message: format!(
                    "a scalar key was given but the identifier is composite ({})",
                    columns.join(", ")
                ),
            }),
            (Self::Single(column), Key::Composite(_)) => Err(RecordError::IdentifierArity {
                model: model.to_owned(),
                message: format!("a composite key was given but the identifier is {column}"),
            }),
        }
    }
}

impl Default for IdColumn {
    fn default() -> Self {
        Self::Single(String::from("id"))
    }
}

impl fmt::Display for IdColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(column) => write!(f, "{column}"),
            Self::Composite(columns) => write!(f, "({})", columns.join(", ")),
        }
    }
}

/// A key identifying one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Value of a single identifier column.
    Value(Value),
    /// Values of a composite identifier, by column.
    Composite(Row),
}

impl Key {
    /// Builds a composite key from column/value pairs.
    pub fn composite<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Composite(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

macro_rules! key_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Key {
            fn from(value: $ty) -> Self {
                Self::Value(Value::from(value))
            }
        })*
    };
}

key_from_scalar!(i32, i64, u32, u64, &str, String);

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Composite(map),
            other => Self::Value(other),
        }
    }
}

impl From<Row> for Key {
    fn from(values: Row) -> Self {
        Self::Composite(values)
    }
}

/// Storage configuration of a model.
///
/// Fields are public for reading; use the builder methods to set them.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    /// Identifier column(s). Defaults to `id`.
    pub id: IdColumn,
    /// Attribute casts.
    pub casts: CastTable,
    /// Mark rows deleted through `deleted_at` instead of removing them.
    /// Defaults to `false`.
    pub soft_deletes: bool,
    /// Maintain `created_at` and `updated_at`. Defaults to `true`.
    pub timestamps: bool,
    /// Default select expression. Defaults to `*`.
    pub select: String,
    /// Introspection procedure; `None` disables schema loading.
    pub describe_function: Option<String>,
    /// Declared relationships.
    pub relations: Vec<Relationship>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            id: IdColumn::default(),
            casts: CastTable::new(),
            soft_deletes: false,
            timestamps: true,
            select: String::from("*"),
            describe_function: Some(String::from(DEFAULT_DESCRIBE_FUNCTION)),
            relations: Vec::new(),
        }
    }
}

impl ModelOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `column` as the identifier.
    #[must_use]
    pub fn id(mut self, column: &str) -> Self {
        self.id = IdColumn::Single(column.to_owned());
        self
    }

    /// Uses several columns as a composite identifier.
    #[must_use]
    pub fn composite_id(mut self, columns: &[&str]) -> Self {
        self.id = IdColumn::Composite(columns.iter().map(|c| (*c).to_owned()).collect());
        self
    }

    /// Casts `column` on hydration.
    #[must_use]
    pub fn cast(mut self, column: &str, caster: Caster) -> Self {
        self.casts = self.casts.cast(column, caster);
        self
    }

    /// Casts then formats `column` on hydration.
    #[must_use]
    pub fn cast_formatted(mut self, column: &str, caster: Caster, formatter: Formatter) -> Self {
        self.casts = self.casts.cast_formatted(column, caster, formatter);
        self
    }

    /// Enables or disables soft deletes.
    #[must_use]
    pub const fn soft_deletes(mut self, enabled: bool) -> Self {
        self.soft_deletes = enabled;
        self
    }

    /// Enables or disables timestamp maintenance.
    #[must_use]
    pub const fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Sets the default select expression.
    #[must_use]
    pub fn select(mut self, expression: &str) -> Self {
        self.select = expression.to_owned();
        self
    }

    /// Sets the introspection procedure.
    #[must_use]
    pub fn describe_function(mut self, name: &str) -> Self {
        self.describe_function = Some(name.to_owned());
        self
    }

    /// Disables schema loading.
    #[must_use]
    pub fn without_describe_function(mut self) -> Self {
        self.describe_function = None;
        self
    }

    /// Declares a relationship.
    #[must_use]
    pub fn relation(mut self, relation: Relationship) -> Self {
        self.relations.push(relation);
        self
    }

    /// The relationship named `name`, if declared.
    #[must_use]
    pub fn find_relation(&self, name: &str) -> Option<&Relationship> {
        self.relations.iter().find(|r| r.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = ModelOptions::new();
        assert_eq!(options.id, IdColumn::Single("id".into()));
        assert!(options.timestamps);
        assert!(!options.soft_deletes);
        assert_eq!(options.select, "*");
        assert_eq!(options.describe_function.as_deref(), Some("describe_table"));
    }

    #[test]
    fn test_single_key_filters() {
        let id = IdColumn::default();
        assert_eq!(id.filters("Post", &Key::from(7)).unwrap(), vec![("id".into(), json!(7))]);
        assert!(matches!(
            id.filters("Post", &Key::composite([("a", 1)])),
            Err(RecordError::IdentifierArity { .. })
        ));
    }

    #[test]
    fn test_composite_key_filters() {
        let id = IdColumn::Composite(vec!["post_id".into(), "tag_id".into()]);
        let filters = id
            .filters("PostTag", &Key::composite([("tag_id", 2), ("post_id", 1)]))
            .unwrap();
        assert_eq!(
            filters,
            vec![("post_id".into(), json!(1)), ("tag_id".into(), json!(2))]
        );
        assert!(matches!(
            id.filters("PostTag", &Key::from(1)),
            Err(RecordError::IdentifierArity { .. })
        ));
        assert!(matches!(
            id.filters("PostTag", &Key::composite([("post_id", 1)])),
            Err(RecordError::MissingIdentifier(column)) if column == "tag_id"
        ));
    }

    #[test]
    fn test_key_from_value() {
        assert_eq!(Key::from(json!({"a": 1})), Key::composite([("a", 1)]));
        assert_eq!(Key::from(json!("slug")), Key::Value(json!("slug")));
    }

    #[test]
    fn test_id_column_display() {
        assert_eq!(IdColumn::default().to_string(), "id");
        assert_eq!(
            IdColumn::Composite(vec!["a".into(), "b".into()]).to_string(),
            "(a, b)"
        );
    }
}
