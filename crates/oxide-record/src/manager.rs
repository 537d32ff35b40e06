//! Manager for table access.
//!
//! The Manager provides the static operation surface of a model: creating,
//! finding, filtering, updating and deleting rows, plus runtime
//! configuration of the model's table, identifier and connection.

use std::marker::PhantomData;
use std::sync::Arc;

use oxide_rest::{DataStore, Envelope, RequestBuilder, Row};
use serde_json::Value;
use tracing::debug;

use crate::collection::Collection;
use crate::error::Result;
use crate::model::{IdColumn, Key, Model};
use crate::operators::{apply_all, Condition};
use crate::options::{DeleteMode, DuplicateOptions, FetchOptions};
use crate::query::QueryBuilder;
use crate::record::{delete_request, identify, now, store, Record, CREATED_AT, DELETED_AT, UPDATED_AT};
use crate::registry::{self, Connection};
use crate::schema::{ensure_loaded, fetch_schema, load_schema, Schema};

/// A Manager provides table access for a Model.
///
/// Each Model has a Manager accessible via `Model::objects()`.
/// Managers are zero-sized and can be created freely.
///
/// # Example
///
/// ```ignore
/// use oxide_record::{Condition, FetchOptions, Model};
///
/// // Every post that is not soft-deleted.
/// let posts = Post::objects().all(FetchOptions::new()).await?;
///
/// // A specific post by identifier.
/// let post = Post::objects().find(1).await?;
/// if !post.response().is_some_and(|r| r.is_success()) {
///     // not found
/// }
///
/// // Filtered, with operator tokens.
/// let popular = Post::objects()
///     .filter(vec![Condition::op("views", ">", 100)])
///     .await?;
/// ```
#[derive(Debug)]
pub struct Manager<M: Model> {
    _marker: PhantomData<M>,
}

impl<M: Model> Clone for Manager<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: Model> Copy for Manager<M> {}

impl<M: Model> Default for Manager<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Records from every row of `envelope`; `embedded` names the keys that
/// carry embedded resources.
fn records<M: Model>(envelope: Envelope, embedded: &[String]) -> Collection<Record<M>> {
    let rows = envelope.rows();
    Collection::from(
        rows.into_iter()
            .map(|row| Record::from_embedded_row(row, embedded))
            .collect::<Vec<_>>(),
    )
    .with_response(envelope)
}

impl<M: Model> Manager<M> {
    /// Creates a new Manager.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    fn table(&self) -> RequestBuilder {
        RequestBuilder::from(registry::table::<M>())
    }

    /// Applies the soft-delete filter, ordering and limit of `options`.
    fn read(&self, mut builder: RequestBuilder, options: &FetchOptions) -> RequestBuilder {
        if registry::options::<M>().soft_deletes && !options.with_trashed {
            builder = builder.is_null(DELETED_AT);
        }
        if let Some(column) = &options.order_by {
            builder = builder.order(column.clone(), options.direction.is_ascending());
        }
        if let Some(limit) = options.limit {
            builder = builder.limit(limit);
        }
        builder
    }

    /// The default select expression plus embeds for `options.with`.
    /// Undeclared names embed every column: `name(*)`.
    fn select_expression(&self, options: &FetchOptions) -> String {
        let model = registry::options::<M>();
        if options.with.is_empty() {
            return model.select.clone();
        }
        let embeds = options
            .with
            .iter()
            .map(|name| {
                model
                    .find_relation(name)
                    .map_or_else(|| format!("{name}(*)"), crate::Relationship::embed)
            })
            .collect::<Vec<_>>();
        format!("{}, {}", model.select, embeds.join(","))
    }

    async fn run(&self, builder: RequestBuilder) -> Result<Envelope> {
        Ok(builder.execute(&*store::<M>()?).await)
    }

    /// Inserts a row.
    ///
    /// With timestamps on, `created_at` and `updated_at` are both set to
    /// the same instant.
    ///
    /// # Errors
    ///
    /// Configuration errors only; remote failures are in the record's
    /// response.
    pub async fn create(&self, mut data: Row) -> Result<Record<M>> {
        ensure_loaded::<M>().await?;
        if registry::options::<M>().timestamps {
            let now = now();
            data.insert(CREATED_AT.to_owned(), now.clone());
            data.insert(UPDATED_AT.to_owned(), now);
        }
        let envelope = self
            .run(self.table().insert(vec![data]).select("*").single())
            .await?;
        Record::made(envelope).await
    }

    /// Finds a row by identifier.
    ///
    /// A missing row is not an error: the record is empty and its response
    /// carries the failed envelope.
    ///
    /// # Errors
    ///
    /// [`RecordError::IdentifierArity`](crate::RecordError::IdentifierArity)
    /// when the key shape does not match the identifier.
    pub async fn find(&self, key: impl Into<Key>) -> Result<Record<M>> {
        let options = registry::options::<M>();
        let filters = options.id.filters(M::NAME, &key.into())?;
        ensure_loaded::<M>().await?;
        let builder = identify(self.table().select(options.select.clone()), filters).single();
        Record::made(self.run(builder).await?).await
    }

    /// Every row, minus soft-deleted ones unless `options.with_trashed`.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn all(&self, options: FetchOptions) -> Result<Collection<Record<M>>> {
        Ok(records(self.fetch_all(&options).await?, &options.with))
    }

    /// Like [`Manager::all`], returning the raw rows.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn all_plain(&self, options: FetchOptions) -> Result<Vec<Row>> {
        Ok(self.fetch_all(&options).await?.rows())
    }

    async fn fetch_all(&self, options: &FetchOptions) -> Result<Envelope> {
        ensure_loaded::<M>().await?;
        let select = self.select_expression(options);
        debug!(model = M::NAME, %select, "fetching all rows");
        self.run(self.read(self.table().select(select), options)).await
    }

    /// Rows matching every condition.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn filter(&self, conditions: Vec<Condition>) -> Result<Collection<Record<M>>> {
        self.filter_with(conditions, FetchOptions::new()).await
    }

    /// Rows matching every condition, with fetch options.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn filter_with(
        &self,
        conditions: Vec<Condition>,
        options: FetchOptions,
    ) -> Result<Collection<Record<M>>> {
        ensure_loaded::<M>().await?;
        let builder = apply_all(
            &conditions,
            self.table().select(registry::options::<M>().select.clone()),
        );
        Ok(records(self.run(self.read(builder, &options)).await?, &[]))
    }

    /// The first row matching every condition.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn first(&self, conditions: Vec<Condition>) -> Result<Option<Record<M>>> {
        Ok(self
            .filter_with(conditions, FetchOptions::new().limit(1))
            .await?
            .shift())
    }

    /// Rows where `column` differs from `value`.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn but(
        &self,
        column: &str,
        value: impl Into<Value>,
        options: FetchOptions,
    ) -> Result<Collection<Record<M>>> {
        ensure_loaded::<M>().await?;
        let builder = self
            .table()
            .select(registry::options::<M>().select.clone())
            .neq(column, value);
        Ok(records(self.run(self.read(builder, &options)).await?, &[]))
    }

    /// Rows where `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn only(&self, column: &str, value: impl Into<Value>) -> Result<Collection<Record<M>>> {
        self.filter(vec![Condition::eq(column, value)]).await
    }

    /// Plain rows limited to `columns`, e.g. `"id, title"`.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn select(&self, columns: &str, options: FetchOptions) -> Result<Collection<Value>> {
        ensure_loaded::<M>().await?;
        let envelope = self
            .run(self.read(self.table().select(columns), &options))
            .await?;
        let rows = envelope.rows().into_iter().map(Value::Object).collect::<Vec<_>>();
        Ok(Collection::from(rows).with_response(envelope))
    }

    /// Updates the row identified by `key`.
    ///
    /// `updated_at` is refreshed when present in `data` and timestamps are
    /// on. Soft-deleted rows are not touched.
    ///
    /// # Errors
    ///
    /// [`RecordError::IdentifierArity`](crate::RecordError::IdentifierArity)
    /// when the key shape does not match the identifier.
    pub async fn update(&self, key: impl Into<Key>, mut data: Row) -> Result<Record<M>> {
        let options = registry::options::<M>();
        let filters = options.id.filters(M::NAME, &key.into())?;
        ensure_loaded::<M>().await?;
        if options.timestamps && data.contains_key(UPDATED_AT) {
            data.insert(UPDATED_AT.to_owned(), now());
        }
        let mut builder = self.table().update(data);
        if options.soft_deletes {
            builder = builder.is_null(DELETED_AT);
        }
        let builder = identify(builder, filters).select("*").single();
        Record::made(self.run(builder).await?).await
    }

    /// Deletes the row identified by `key`, softly when the model uses
    /// soft deletes.
    ///
    /// # Errors
    ///
    /// [`RecordError::IdentifierArity`](crate::RecordError::IdentifierArity)
    /// when the key shape does not match the identifier.
    pub async fn delete(&self, key: impl Into<Key>) -> Result<Record<M>> {
        let options = registry::options::<M>();
        let filters = options.id.filters(M::NAME, &key.into())?;
        ensure_loaded::<M>().await?;
        let mode = if options.soft_deletes {
            DeleteMode::Soft
        } else {
            DeleteMode::Hard
        };
        Ok(Record::from_envelope(
            self.run(delete_request::<M>(mode, filters)).await?,
        ))
    }

    /// Finds the row identified by `key` and inserts a copy of it.
    ///
    /// # Errors
    ///
    /// See [`Manager::find`].
    pub async fn duplicate(&self, key: impl Into<Key>, options: DuplicateOptions) -> Result<Record<M>> {
        self.find(key).await?.duplicate(options).await
    }

    /// Builds a record from a row or serialized envelope, attaches
    /// `response`, and loads its many-to-many associations.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn make(&self, data: Value, response: Option<Envelope>) -> Result<Record<M>> {
        ensure_loaded::<M>().await?;
        let mut record = Record::hydrate(data);
        if let Some(response) = response {
            record.set_response(response);
        }
        record.relate().await?;
        Ok(record)
    }

    /// Builds a record from a row and loads its many-to-many associations.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn from_row(&self, row: Row) -> Result<Record<M>> {
        self.make(Value::Object(row), None).await
    }

    /// Wraps rows as records without touching the store.
    #[must_use]
    pub fn collect(&self, rows: Vec<Value>) -> Collection<Record<M>> {
        rows.into_iter().map(Record::hydrate).collect()
    }

    /// An unsaved record with every non-identifier column set to `null`.
    ///
    /// Empty when the schema could not be loaded.
    ///
    /// # Errors
    ///
    /// See [`load_schema`].
    pub async fn blank(&self) -> Result<Record<M>> {
        let id = self.id_column();
        Ok(load_schema::<M>()
            .await?
            .map_or_else(Record::new, |schema| Record::blank(&schema, &id)))
    }

    /// The non-identifier columns reported by the schema.
    ///
    /// # Errors
    ///
    /// See [`load_schema`].
    pub async fn fields(&self) -> Result<Vec<String>> {
        let id = self.id_column();
        Ok(load_schema::<M>().await?.map_or_else(Vec::new, |schema| {
            schema
                .names()
                .filter(|name| !id.contains(name))
                .map(str::to_owned)
                .collect()
        }))
    }

    /// The cached schema, loading it on first use.
    ///
    /// # Errors
    ///
    /// See [`load_schema`].
    pub async fn schema(&self) -> Result<Option<Arc<Schema>>> {
        load_schema::<M>().await
    }

    /// Switches the introspection procedure to `function` and reloads.
    ///
    /// # Errors
    ///
    /// [`RecordError::NotConnected`](crate::RecordError::NotConnected) when
    /// the model has no connection.
    pub async fn retrieve_schema(&self, function: &str) -> Result<Option<Arc<Schema>>> {
        registry::configure::<M>(|options| options.describe_function = Some(function.to_owned()));
        registry::forget_schema::<M>();
        fetch_schema::<M>(function).await
    }

    /// A SQL statement builder over the model's table.
    #[must_use]
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(&registry::table::<M>())
    }

    /// Overrides the table name.
    pub fn set_table_name(&self, name: &str) {
        registry::set_table::<M>(name);
    }

    /// The table name.
    #[must_use]
    pub fn table_name(&self) -> String {
        registry::table::<M>()
    }

    /// The identifier column(s).
    #[must_use]
    pub fn id_column(&self) -> IdColumn {
        registry::options::<M>().id.clone()
    }

    /// Turns soft deletes off for the rest of the process.
    pub fn disable_soft_deletes(&self) {
        registry::configure::<M>(|options| options.soft_deletes = false);
    }

    /// Replaces the default select expression.
    pub fn set_select_query(&self, expression: &str) {
        registry::configure::<M>(|options| options.select = expression.to_owned());
    }

    /// Uses `store` for this model.
    pub fn connect(&self, store: Arc<dyn DataStore>) {
        registry::set_connection::<M>(store);
    }

    /// Uses `connection` for this model.
    ///
    /// # Errors
    ///
    /// [`RecordError::InvalidConnection`](crate::RecordError::InvalidConnection)
    /// for an empty URL or key.
    pub fn set_connection(&self, connection: Connection) -> Result<()> {
        registry::set_connection::<M>(connection.into_store()?);
        Ok(())
    }
}
