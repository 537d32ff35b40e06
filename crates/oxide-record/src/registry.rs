//! Process-wide model state.
//!
//! Each model type gets one entry holding its options, resolved table name,
//! connection and cached schema. Entries are created on first use and live
//! until [`reset`] or [`clear`]. Locks are never held across an `.await`.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use oxide_rest::{DataStore, RestClient, RestConfig};
use tracing::info;

use crate::error::{RecordError, Result};
use crate::inflect::table_name_for;
use crate::model::{Model, ModelOptions};
use crate::schema::Schema;

/// How a model reaches its data store.
#[derive(Clone)]
pub enum Connection {
    /// An existing store, shared.
    Store(Arc<dyn DataStore>),
    /// A PostgREST endpoint; a [`RestClient`] is built from it.
    Url {
        /// Project URL.
        url: String,
        /// API key.
        key: String,
    },
}

impl Connection {
    /// Resolves the connection to a store.
    ///
    /// # Errors
    ///
    /// [`RecordError::InvalidConnection`] for an empty URL or key,
    /// [`RecordError::Client`] when the client cannot be built.
    pub fn into_store(self) -> Result<Arc<dyn DataStore>> {
        match self {
            Self::Store(store) => Ok(store),
            Self::Url { url, key } => {
                if url.trim().is_empty() || key.trim().is_empty() {
                    return Err(RecordError::InvalidConnection(String::from(
                        "both a URL and a key are required",
                    )));
                }
                Ok(Arc::new(RestClient::new(RestConfig::new(url, key))?))
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(_) => f.write_str("Connection::Store(..)"),
            Self::Url { url, .. } => f.debug_struct("Connection::Url").field("url", url).finish_non_exhaustive(),
        }
    }
}

struct ModelState {
    table: String,
    options: Arc<ModelOptions>,
    connection: Option<Arc<dyn DataStore>>,
    schema: Option<Arc<Schema>>,
}

static MODELS: LazyLock<RwLock<HashMap<TypeId, ModelState>>> = LazyLock::new(RwLock::default);
static DEFAULT_CONNECTION: RwLock<Option<Arc<dyn DataStore>>> = RwLock::new(None);

fn with_state<M: Model, R>(f: impl FnOnce(&mut ModelState) -> R) -> R {
    let key = TypeId::of::<M>();
    let known = MODELS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&key);
    // Options are built outside the lock: `M::options` is user code.
    let fresh = if known { None } else { Some(initial_state::<M>()) };

    let mut models = MODELS.write().unwrap_or_else(PoisonError::into_inner);
    let state = match fresh {
        Some(fresh) => models.entry(key).or_insert(fresh),
        None => models.entry(key).or_insert_with(initial_state::<M>),
    };
    f(state)
}

fn initial_state<M: Model>() -> ModelState {
    let table = M::TABLE.map_or_else(
        || {
            let table = table_name_for(M::NAME);
            info!(
                model = M::NAME,
                %table,
                "table name inferred from model name; set Model::TABLE or call set_table_name to override"
            );
            table
        },
        str::to_owned,
    );
    ModelState {
        table,
        options: Arc::new(M::options()),
        connection: None,
        schema: None,
    }
}

/// The current options of `M`.
pub fn options<M: Model>() -> Arc<ModelOptions> {
    with_state::<M, _>(|state| Arc::clone(&state.options))
}

/// Changes the options of `M` at runtime.
pub fn configure<M: Model>(f: impl FnOnce(&mut ModelOptions)) {
    with_state::<M, _>(|state| f(Arc::make_mut(&mut state.options)));
}

/// The table of `M`.
pub fn table<M: Model>() -> String {
    with_state::<M, _>(|state| state.table.clone())
}

/// Overrides the table of `M`. Drops any cached schema.
pub fn set_table<M: Model>(table: &str) {
    with_state::<M, _>(|state| {
        state.table = table.to_owned();
        state.schema = None;
    });
}

/// Sets the store used by `M`.
pub fn set_connection<M: Model>(store: Arc<dyn DataStore>) {
    with_state::<M, _>(|state| state.connection = Some(store));
}

/// The store used by `M`: its own, else the process default.
///
/// # Errors
///
/// [`RecordError::NotConnected`] when neither exists.
pub fn connection<M: Model>() -> Result<Arc<dyn DataStore>> {
    if let Some(store) = with_state::<M, _>(|state| state.connection.clone()) {
        return Ok(store);
    }
    DEFAULT_CONNECTION
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or_else(|| RecordError::NotConnected(M::NAME.to_owned()))
}

/// Sets the store used by models without their own connection.
pub fn set_default_connection(store: Arc<dyn DataStore>) {
    *DEFAULT_CONNECTION
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(store);
}

/// Removes the process default store.
pub fn clear_default_connection() {
    *DEFAULT_CONNECTION
        .write()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

/// The cached schema of `M`, without loading it.
pub fn cached_schema<M: Model>() -> Option<Arc<Schema>> {
    with_state::<M, _>(|state| state.schema.clone())
}

pub(crate) fn store_schema<M: Model>(schema: Arc<Schema>) {
    with_state::<M, _>(|state| state.schema = Some(schema));
}

/// Drops the cached schema of `M`; the next operation reloads it.
pub fn forget_schema<M: Model>() {
    with_state::<M, _>(|state| state.schema = None);
}

/// Removes every piece of state held for `M`.
pub fn reset<M: Model>() {
    MODELS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&TypeId::of::<M>());
}

/// Removes the state of every model and the default connection.
pub fn clear() {
    MODELS.write().unwrap_or_else(PoisonError::into_inner).clear();
    clear_default_connection();
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_rest::MemoryStore;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct DiaryEntry {}

    impl Model for DiaryEntry {
        const NAME: &'static str = "DiaryEntry";
    }

    #[derive(Serialize, Deserialize)]
    struct Legacy {}

    impl Model for Legacy {
        const NAME: &'static str = "Legacy";
        const TABLE: Option<&'static str> = Some("tbl_legacy");

        fn options() -> ModelOptions {
            ModelOptions::new().soft_deletes(true)
        }
    }

    #[test]
    fn test_table_inference_and_override() {
        assert_eq!(table::<DiaryEntry>(), "diary_entries");
        assert_eq!(table::<Legacy>(), "tbl_legacy");
        set_table::<Legacy>("legacy_rows");
        assert_eq!(table::<Legacy>(), "legacy_rows");
        reset::<Legacy>();
        assert_eq!(table::<Legacy>(), "tbl_legacy");
    }

    #[test]
    fn test_configure_copies_on_write() {
        #[derive(Serialize, Deserialize)]
        struct Note {}
        impl Model for Note {
            const NAME: &'static str = "Note";
            fn options() -> ModelOptions {
                ModelOptions::new().soft_deletes(true)
            }
        }

        let before = options::<Note>();
        configure::<Note>(|options| options.soft_deletes = false);
        assert!(before.soft_deletes);
        assert!(!options::<Note>().soft_deletes);
    }

    #[test]
    fn test_connection_resolution() {
        #[derive(Serialize, Deserialize)]
        struct Orphan {}
        impl Model for Orphan {
            const NAME: &'static str = "Orphan";
        }

        set_connection::<Orphan>(Arc::new(MemoryStore::new()));
        assert!(connection::<Orphan>().is_ok());
        reset::<Orphan>();

        assert!(matches!(
            Connection::Url { url: String::new(), key: "k".into() }.into_store(),
            Err(RecordError::InvalidConnection(_))
        ));
        assert!(Connection::Url {
            url: "https://demo.supabase.co".into(),
            key: "anon".into()
        }
        .into_store()
        .is_ok());
    }
}
