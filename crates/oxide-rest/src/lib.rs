//! # oxide-rest
//!
//! The DataStore capability used by `oxide-record`: a request model for
//! table operations, the `{data, error, status, count}` response envelope,
//! and two stores implementing [`DataStore`].
//!
//! # How the stores behave
//!
//! - **Errors are in-band**: a store never returns `Err`. Remote failures,
//!   transport failures and constraint violations all come back as an
//!   [`Envelope`] with a non-2xx `status` and an [`StoreError`] payload.
//! - **Statuses follow [PostgREST]**: `200` for reads and updates, `201` for
//!   inserts, `204` when no representation was requested, `406` when a
//!   single row was requested and zero or several matched (`PGRST116`).
//! - **[`MemoryStore`]** keeps tables in memory, assigns `id` values,
//!   resolves upsert conflicts by primary key, exposes a built-in
//!   `describe_table` procedure and records every call.
//! - **[`RestClient`]** renders requests as PostgREST HTTP calls
//!   (`GET/POST/PATCH/DELETE /rest/v1/{table}`, `POST /rest/v1/rpc/{name}`).
//!
//! [PostgREST]: https://postgrest.org/en/stable/references/api.html
//!
//! ## Example
//!
//! ```rust
//! use oxide_rest::{MemoryStore, RequestBuilder, Row, TableDef};
//! use serde_json::json;
//!
//! let store = MemoryStore::new().with_table(
//!     TableDef::new("tags")
//!         .column("id", "bigint", false)
//!         .column("name", "text", false),
//! );
//!
//! let mut row = Row::new();
//! row.insert("name".into(), json!("rust"));
//! let inserted = store.apply(
//!     RequestBuilder::from("tags").insert(vec![row]).select("*").single().build(),
//! );
//! assert_eq!(inserted.status, 201);
//! assert_eq!(inserted.data["id"], json!(1));
//! ```

mod client;
mod config;
mod envelope;
mod error;
mod memory;
mod request;
mod store;

pub use client::RestClient;
pub use config::{RestConfig, KEY_ENV, URL_ENV};
pub use envelope::{Envelope, Row};
pub use error::{ClientError, Result, StoreError};
pub use memory::{Call, ColumnDef, MemoryStore, Procedure, TableDef, DESCRIBE_PROCEDURE};
pub use request::{Action, Cardinality, Filter, Order, Request, RequestBuilder, OPERATORS};
pub use store::DataStore;

pub use async_trait::async_trait;
