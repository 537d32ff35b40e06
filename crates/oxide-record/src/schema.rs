//! Table introspection.
//!
//! Column metadata comes from a stored procedure on the server (by default
//! `describe_table`) called with `{"tablename": <table>}`. It must return
//! `column_name`, `data_type` and `is_nullable` for each column; see
//! [`describe_table_sql`] for a definition. The parsed [`Schema`] is cached
//! per model for the lifetime of the process.

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use oxide_rest::Row;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::cast::parse_bool;
use crate::error::{RecordError, Result};
use crate::model::Model;
use crate::registry;

static TYPE_ARGUMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.+\)").expect("type argument pattern is valid"));

/// Metadata for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Data type with any parenthesized arguments removed.
    pub data_type: String,
    /// Nullability; `None` when the store reported something unrecognized.
    pub nullable: Option<bool>,
}

/// Ordered column metadata of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: IndexMap<String, ColumnInfo>,
}

impl Schema {
    /// Parses introspection rows.
    ///
    /// Returns `None` for an empty description. Rows without a
    /// `column_name` are skipped.
    #[must_use]
    pub fn from_description(rows: &[Row]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let columns = rows
            .iter()
            .filter_map(|row| {
                let name = row.get("column_name")?.as_str()?.to_owned();
                let data_type = row
                    .get("data_type")
                    .and_then(Value::as_str)
                    .map(|t| TYPE_ARGUMENTS.replace_all(t, "").into_owned())
                    .unwrap_or_default();
                let nullable = row
                    .get("is_nullable")
                    .and_then(Value::as_str)
                    .and_then(parse_bool);
                Some((
                    name.clone(),
                    ColumnInfo {
                        name,
                        data_type,
                        nullable,
                    },
                ))
            })
            .collect();
        Some(Self { columns })
    }

    /// Columns in table order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.values()
    }

    /// Column names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Metadata for `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    /// Whether the table has a column named `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// `true` when no columns are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// SQL that creates an introspection procedure named `function_name`.
#[must_use]
pub fn describe_table_sql(function_name: &str) -> String {
    format!(
        "create or replace function {function_name}(tablename text)\n\
         returns table (column_name text, data_type text, is_nullable text)\n\
         language sql stable security definer as $$\n  \
         select column_name::text, data_type::text, is_nullable::text\n  \
         from information_schema.columns\n  \
         where table_schema = 'public' and table_name = tablename\n  \
         order by ordinal_position;\n\
         $$;"
    )
}

/// Returns the cached schema of `M`, loading it on first use.
///
/// A failed or empty load is logged, leaves the cache empty and yields
/// `Ok(None)`, so the next call tries again.
///
/// # Errors
///
/// [`RecordError::MissingDescribeFunction`] when the model has no
/// introspection procedure, [`RecordError::NotConnected`] when it has no
/// connection.
pub async fn load_schema<M: Model>() -> Result<Option<Arc<Schema>>> {
    if let Some(schema) = registry::cached_schema::<M>() {
        return Ok(Some(schema));
    }
    let options = registry::options::<M>();
    let Some(function) = options.describe_function.clone() else {
        return Err(RecordError::MissingDescribeFunction(M::NAME.to_owned()));
    };
    fetch_schema::<M>(&function).await
}

/// Makes sure a schema load was attempted before an operation runs.
pub(crate) async fn ensure_loaded<M: Model>() -> Result<()> {
    load_schema::<M>().await.map(|_| ())
}

/// Loads the schema through `function`, bypassing and replacing the cache.
pub(crate) async fn fetch_schema<M: Model>(function: &str) -> Result<Option<Arc<Schema>>> {
    let store = registry::connection::<M>()?;
    let table = registry::table::<M>();
    debug!(model = M::NAME, %table, function, "loading schema");

    let envelope = store.rpc(function, json!({ "tablename": table })).await;
    let schema = if envelope.is_success() {
        Schema::from_description(&envelope.rows())
    } else {
        None
    };
    match schema {
        Some(schema) => {
            let schema = Arc::new(schema);
            registry::store_schema::<M>(Arc::clone(&schema));
            Ok(Some(schema))
        }
        None => {
            error!(
                model = M::NAME,
                %table,
                function,
                error = ?envelope.error,
                "could not load schema; check that the describe function exists"
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description() -> Vec<Row> {
        json!([
            {"column_name": "id", "data_type": "bigint", "is_nullable": "NO"},
            {"column_name": "title", "data_type": "character varying(255)", "is_nullable": "YES"},
            {"column_name": "price", "data_type": "numeric(10,2)", "is_nullable": "maybe"},
            {"data_type": "text", "is_nullable": "YES"},
        ])
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
    }

    #[test]
    fn test_from_description() {
        let schema = Schema::from_description(&description()).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["id", "title", "price"]);

        let title = schema.column("title").unwrap();
        assert_eq!(title.data_type, "character varying");
        assert_eq!(title.nullable, Some(true));

        assert_eq!(schema.column("id").unwrap().nullable, Some(false));
        let price = schema.column("price").unwrap();
        assert_eq!(price.data_type, "numeric");
        assert_eq!(price.nullable, None);
    }

    #[test]
    fn test_empty_description() {
        assert!(Schema::from_description(&[]).is_none());
    }

    #[test]
    fn test_describe_table_sql() {
        let sql = describe_table_sql("describe_table");
        assert!(sql.starts_with("create or replace function describe_table(tablename text)"));
        assert!(sql.contains("information_schema.columns"));
        assert!(sql.trim_end().ends_with("$$;"));
    }
}
