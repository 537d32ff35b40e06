#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use oxide_rest::{DataStore, Envelope, MemoryStore, Request, Row, TableDef};
use serde_json::Value;

/// Declares a model type with schemaless attributes.
///
/// Each test declares its own types so registry state is never shared
/// between tests running in parallel.
macro_rules! model {
    ($name:ident, $model:literal) => {
        model!($name, $model, oxide_record::ModelOptions::new());
    };
    ($name:ident, $model:literal, $options:expr) => {
        #[derive(Debug, serde::Serialize, serde::Deserialize)]
        struct $name {
            #[serde(flatten)]
            fields: serde_json::Map<String, serde_json::Value>,
        }

        impl oxide_record::Model for $name {
            const NAME: &'static str = $model;

            fn options() -> oxide_record::ModelOptions {
                $options
            }
        }
    };
}

pub(crate) use model;

pub fn row(value: Value) -> Row {
    value
        .as_object()
        .cloned()
        .unwrap_or_else(|| panic!("expected a JSON object, got {value}"))
}

// ===================================================================
// Tables
// ===================================================================

pub fn posts() -> TableDef {
    TableDef::new("posts")
        .column("id", "bigint", false)
        .column("title", "character varying(255)", false)
        .column("views", "integer", true)
        .column("author_id", "bigint", true)
        .column("created_at", "timestamp with time zone", true)
        .column("updated_at", "timestamp with time zone", true)
        .column("deleted_at", "timestamp with time zone", true)
}

pub fn authors() -> TableDef {
    TableDef::new("authors")
        .column("id", "bigint", false)
        .column("name", "text", false)
}

pub fn tags() -> TableDef {
    TableDef::new("tags")
        .column("id", "bigint", false)
        .column("name", "text", false)
}

pub fn post_tags() -> TableDef {
    TableDef::new("post_tags")
        .column("post_id", "bigint", false)
        .column("tag_id", "bigint", false)
        .column("pinned", "boolean", true)
        .primary_key(&["post_id", "tag_id"])
}

pub fn comments() -> TableDef {
    TableDef::new("comments")
        .column("id", "bigint", false)
        .column("post_id", "bigint", false)
        .column("body", "text", false)
        .column("score", "integer", true)
}

/// A store holding every fixture table, empty.
pub fn store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_table(posts())
            .with_table(authors())
            .with_table(tags())
            .with_table(post_tags())
            .with_table(comments()),
    )
}

// ===================================================================
// Call log helpers
// ===================================================================

/// Table requests received so far, skipping procedure calls.
pub fn requests(store: &MemoryStore) -> Vec<Request> {
    store.requests()
}

/// The last table request received.
pub fn last_request(store: &MemoryStore) -> Request {
    store
        .requests()
        .pop()
        .unwrap_or_else(|| panic!("no request was issued"))
}

/// Number of procedure calls named `procedure`.
pub fn rpc_count(store: &MemoryStore, procedure: &str) -> usize {
    store
        .calls()
        .iter()
        .filter(|call| matches!(call, oxide_rest::Call::Rpc { procedure: p, .. } if p == procedure))
        .count()
}

// ===================================================================
// Scripted store
// ===================================================================

type Handler = dyn Fn(&MemoryStore, Request) -> Envelope + Send + Sync;

/// Routes table requests through a closure that sees the in-memory store.
/// Procedure calls go straight to the store.
pub struct ScriptedStore {
    inner: Arc<MemoryStore>,
    handler: Box<Handler>,
}

impl ScriptedStore {
    pub fn new<F>(inner: Arc<MemoryStore>, handler: F) -> Arc<Self>
    where
        F: Fn(&MemoryStore, Request) -> Envelope + Send + Sync + 'static,
    {
        Arc::new(Self {
            inner,
            handler: Box::new(handler),
        })
    }
}

#[async_trait]
impl DataStore for ScriptedStore {
    async fn execute(&self, request: Request) -> Envelope {
        (self.handler)(&self.inner, request)
    }

    async fn rpc(&self, procedure: &str, params: Value) -> Envelope {
        self.inner.rpc(procedure, params).await
    }
}
