//! # oxide-record
//!
//! Active-Record models over a PostgREST-style [`DataStore`].
//!
//! This crate provides:
//! - `Model` trait and `ModelOptions` for declaring a table-backed model
//! - `Manager` for the static operations (`create`, `find`, `all`, `filter`, ...)
//! - `Record` for row-backed instances (`update`, `delete`, `duplicate`,
//!   relationship traversal)
//! - `Collection`, the container every multi-row result comes back in
//! - Attribute casts, operator resolution and schema introspection
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use oxide_record::{Condition, FetchOptions, Model, ModelOptions, Row};
//! use oxide_rest::RestClient;
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Post {
//!     id: Option<i64>,
//!     title: String,
//! }
//!
//! impl Model for Post {
//!     const NAME: &'static str = "Post";
//!
//!     fn options() -> ModelOptions {
//!         ModelOptions::new().soft_deletes(true)
//!     }
//! }
//!
//! async fn example() -> oxide_record::Result<()> {
//!     oxide_record::registry::set_default_connection(Arc::new(RestClient::from_env()?));
//!
//!     let mut data = Row::new();
//!     data.insert("title".into(), json!("Hello"));
//!     let post = Post::objects().create(data).await?;
//!
//!     let recent = Post::objects()
//!         .filter(vec![Condition::op("title", "!=", "Draft")])
//!         .await?;
//!
//!     post.delete(Default::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Only configuration problems are returned as `Err`: a missing describe
//! function, a missing or invalid connection, a key that does not match the
//! identifier shape. Anything the store rejects, including "not found",
//! travels in the [`Envelope`] returned by `response()`:
//!
//! ```ignore
//! let post = Post::objects().find(42).await?;
//! match post.response() {
//!     Some(envelope) if envelope.is_success() => println!("{:?}", post.plain()),
//!     Some(envelope) => println!("lookup failed with {}", envelope.status),
//!     None => {}
//! }
//! ```
//!
//! ## Conventions
//!
//! - The table is the pluralized snake-case model name (`DiaryEntry` is
//!   stored in `diary_entries`) unless `Model::TABLE` says otherwise.
//! - Timestamps (`created_at`, `updated_at`) are maintained by default.
//! - Soft deletes set `deleted_at` and hide the row from every multi-row
//!   read unless `FetchOptions::with_trashed` is used.
//! - The schema is read once per model through the `describe_table`
//!   procedure; see [`schema::describe_table_sql`].
//!
//! [`DataStore`]: oxide_rest::DataStore

pub mod cast;
mod collection;
mod error;
pub mod inflect;
mod manager;
mod model;
pub mod operators;
mod options;
mod query;
mod record;
pub mod registry;
mod relations;
pub mod schema;

pub use collection::{Collection, Item, RemoveOptions, ValueFormatter};
pub use error::{RecordError, Result};
pub use manager::Manager;
pub use model::{IdColumn, Key, Model, ModelOptions, DEFAULT_DESCRIBE_FUNCTION};
pub use operators::{resolve, Condition, ResolvedOperator};
pub use options::{DeleteMode, DeleteOptions, Direction, DuplicateOptions, FetchOptions, ResetOptions};
pub use query::QueryBuilder;
pub use record::{Record, CREATED_AT, DELETED_AT, UPDATED_AT};
pub use registry::Connection;
pub use relations::{EntityDescriptor, RelationKind, RelationTarget, Relationship};
pub use schema::{load_schema, ColumnInfo, Schema};

pub use oxide_rest::{Envelope, Row};
