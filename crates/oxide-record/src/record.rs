//! Row-backed model instances.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use oxide_rest::{DataStore, Envelope, RequestBuilder, Row};
use serde_json::Value;
use tracing::{debug, error};

use crate::collection::Item;
use crate::error::{RecordError, Result};
use crate::model::{IdColumn, Key, Model, ModelOptions};
use crate::options::{DeleteMode, DeleteOptions, DuplicateOptions};
use crate::registry;
use crate::schema::{ensure_loaded, Schema};

/// Creation timestamp column.
pub const CREATED_AT: &str = "created_at";
/// Update timestamp column.
pub const UPDATED_AT: &str = "updated_at";
/// Soft-delete marker column.
pub const DELETED_AT: &str = "deleted_at";

/// The current time as stored in timestamp columns.
pub(crate) fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Adds one equality filter per identifier column.
pub(crate) fn identify(builder: RequestBuilder, filters: Vec<(String, Value)>) -> RequestBuilder {
    filters
        .into_iter()
        .fold(builder, |builder, (column, value)| builder.eq(column, value))
}

/// One row of `M`'s table.
///
/// Attributes hold the persisted columns only. Relations attached by
/// [`Record::with`] or [`Record::relate`] live beside them and show up in
/// [`Record::plain`]. The envelope of the last operation is kept in
/// [`Record::response`].
pub struct Record<M: Model> {
    attributes: Row,
    relations: Row,
    response: Option<Envelope>,
    persisted: bool,
    _marker: PhantomData<M>,
}

impl<M: Model> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            relations: self.relations.clone(),
            response: self.response.clone(),
            persisted: self.persisted,
            _marker: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &M::NAME)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("persisted", &self.persisted)
            .finish_non_exhaustive()
    }
}

impl<M: Model> PartialEq for Record<M> {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes && self.relations == other.relations
    }
}

impl<M: Model> Default for Record<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Record<M> {
    /// An empty, unsaved record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attributes: Row::new(),
            relations: Row::new(),
            response: None,
            persisted: false,
            _marker: PhantomData,
        }
    }

    /// Builds a record from a row, applying the model's casts.
    ///
    /// Keys named after a declared relationship are kept as relations, not
    /// attributes. The record counts as persisted when every identifier
    /// column holds a non-null value.
    #[must_use]
    pub fn from_row(row: Row) -> Self {
        Self::from_embedded_row(row, &[])
    }

    /// Like [`Record::from_row`], with `embedded` naming further keys that
    /// hold embedded resources.
    pub(crate) fn from_embedded_row(row: Row, embedded: &[String]) -> Self {
        let options = registry::options::<M>();
        let (relations, columns): (Row, Row) = row.into_iter().partition(|(key, _)| {
            embedded.contains(key) || options.find_relation(key).is_some()
        });
        let attributes = options.casts.apply(columns);
        let persisted = options
            .id
            .columns()
            .iter()
            .all(|column| attributes.get(*column).is_some_and(|v| !v.is_null()));
        Self {
            attributes,
            relations,
            persisted,
            ..Self::new()
        }
    }

    /// Builds a record from the first row of `envelope` and keeps the
    /// envelope as its response.
    #[must_use]
    pub fn from_envelope(envelope: Envelope) -> Self {
        let mut record = envelope
            .first_row()
            .map_or_else(Self::new, Self::from_row);
        record.response = Some(envelope);
        record
    }

    /// Builds a record from either a row object or a serialized envelope
    /// (`{data, error, status, count}`). Other values yield an empty record.
    #[must_use]
    pub fn hydrate(value: Value) -> Self {
        if Envelope::is_envelope_shaped(&value) {
            match serde_json::from_value::<Envelope>(value.clone()) {
                Ok(envelope) => return Self::from_envelope(envelope),
                Err(err) => debug!(model = M::NAME, %err, "envelope-shaped value treated as a row"),
            }
        }
        match value {
            Value::Object(row) => Self::from_row(row),
            _ => Self::new(),
        }
    }

    /// A record with every non-identifier column of `schema` set to `null`.
    pub(crate) fn blank(schema: &Schema, id: &IdColumn) -> Self {
        let attributes = schema
            .names()
            .filter(|name| !id.contains(name))
            .map(|name| (name.to_owned(), Value::Null))
            .collect();
        Self {
            attributes,
            ..Self::new()
        }
    }

    /// The value of `field`, looking at attributes then relations.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes
            .get(field)
            .or_else(|| self.relations.get(field))
    }

    /// Sets an attribute locally.
    ///
    /// # Errors
    ///
    /// [`RecordError::ImmutableIdentifier`] when changing an identifier
    /// column of a persisted record.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        self.check_identifier(&registry::options::<M>(), field, &value)?;
        self.attributes.insert(field.to_owned(), value);
        Ok(self)
    }

    fn check_identifier(&self, options: &ModelOptions, field: &str, value: &Value) -> Result<()> {
        if self.persisted
            && options.id.contains(field)
            && self.attributes.get(field) != Some(value)
        {
            return Err(RecordError::ImmutableIdentifier(field.to_owned()));
        }
        Ok(())
    }

    /// Persisted column values.
    #[must_use]
    pub const fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Consumes the record, returning its column values.
    #[must_use]
    pub fn into_attributes(self) -> Row {
        self.attributes
    }

    /// Attached relations, by name.
    #[must_use]
    pub const fn relations(&self) -> &Row {
        &self.relations
    }

    /// The relation attached under `name`.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Value> {
        self.relations.get(name)
    }

    pub(crate) fn attach(&mut self, name: String, value: Value) {
        self.relations.insert(name, value);
    }

    /// The envelope of the last operation.
    #[must_use]
    pub const fn response(&self) -> Option<&Envelope> {
        self.response.as_ref()
    }

    /// Replaces the stored envelope.
    pub fn set_response(&mut self, response: Envelope) {
        self.response = Some(response);
    }

    /// Whether the record was built from a stored row.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// The record's identifier.
    ///
    /// # Errors
    ///
    /// [`RecordError::MissingIdentifier`] when an identifier column is
    /// absent or `null`.
    pub fn key(&self) -> Result<Key> {
        let options = registry::options::<M>();
        self.key_for(&options.id)
    }

    fn key_for(&self, id: &IdColumn) -> Result<Key> {
        let value_of = |column: &str| {
            self.attributes
                .get(column)
                .filter(|v| !v.is_null())
                .cloned()
                .ok_or_else(|| RecordError::MissingIdentifier(column.to_owned()))
        };
        match id {
            IdColumn::Single(column) => value_of(column).map(Key::Value),
            IdColumn::Composite(columns) => columns
                .iter()
                .map(|column| value_of(column).map(|v| (column.clone(), v)))
                .collect::<Result<Row>>()
                .map(Key::Composite),
        }
    }

    /// The value of a single identifier, for relationship lookups.
    pub(crate) fn identifier_value(&self) -> Result<Value> {
        let options = registry::options::<M>();
        match self.key_for(&options.id)? {
            Key::Value(value) => Ok(value),
            Key::Composite(_) => Err(RecordError::IdentifierArity {
                model: M::NAME.to_owned(),
                message: String::from("relationships need a single identifier column"),
            }),
        }
    }

    fn identifier_filters(&self, options: &ModelOptions) -> Result<Vec<(String, Value)>> {
        options.id.filters(M::NAME, &self.key_for(&options.id)?)
    }

    /// The attributes deserialized into the model struct.
    ///
    /// # Errors
    ///
    /// [`RecordError::Serialization`] when the attributes do not fit `M`.
    pub fn model(&self) -> Result<M> {
        Ok(serde_json::from_value(Value::Object(self.attributes.clone()))?)
    }

    /// Attributes and attached relations as one JSON object.
    #[must_use]
    pub fn plain(&self) -> Value {
        let mut out = self.attributes.clone();
        out.extend(self.relations.clone());
        Value::Object(out)
    }

    /// Logs the attributes at debug level.
    pub fn log(&self) {
        debug!(model = M::NAME, attributes = ?self.attributes, "record");
    }

    pub(crate) async fn made(envelope: Envelope) -> Result<Self> {
        let mut record = Self::from_envelope(envelope);
        record.relate().await?;
        Ok(record)
    }

    /// Inserts the attributes, merged with `additional`, as a new row.
    ///
    /// Timestamp columns that are missing or `null` are filled in when the
    /// model maintains timestamps.
    ///
    /// # Errors
    ///
    /// Configuration errors only; remote failures are in the returned
    /// record's response.
    pub async fn save(&self, additional: Option<Row>) -> Result<Self> {
        ensure_loaded::<M>().await?;
        let options = registry::options::<M>();
        let mut row = self.attributes.clone();
        if let Some(additional) = additional {
            row.extend(additional);
        }
        if options.timestamps {
            let now = now();
            for column in [CREATED_AT, UPDATED_AT] {
                if row.get(column).is_none_or(Value::is_null) {
                    row.insert(column.to_owned(), now.clone());
                }
            }
        }
        let envelope = RequestBuilder::from(registry::table::<M>())
            .insert(vec![row])
            .select("*")
            .single()
            .execute(&*store::<M>()?)
            .await;
        Self::made(envelope).await
    }

    /// Applies `data` to the stored row, then takes the attributes from the
    /// row the store returned.
    ///
    /// `updated_at` is refreshed when it is part of `data` and the model
    /// maintains timestamps. With soft deletes on, a soft-deleted row is
    /// left alone. When nothing was updated the attributes stay as they
    /// were.
    ///
    /// # Errors
    ///
    /// [`RecordError::ImmutableIdentifier`] when `data` changes an
    /// identifier, [`RecordError::MissingIdentifier`] when the record has
    /// none.
    pub async fn update(&mut self, mut data: Row) -> Result<&mut Self> {
        ensure_loaded::<M>().await?;
        let options = registry::options::<M>();
        for (field, value) in &data {
            self.check_identifier(&options, field, value)?;
        }
        if options.timestamps && data.contains_key(UPDATED_AT) {
            data.insert(UPDATED_AT.to_owned(), now());
        }
        let filters = self.identifier_filters(&options)?;

        let mut builder = RequestBuilder::from(registry::table::<M>()).update(data);
        if options.soft_deletes {
            builder = builder.is_null(DELETED_AT);
        }
        let envelope = identify(builder, filters)
            .select("*")
            .execute(&*store::<M>()?)
            .await;
        if let Some(err) = &envelope.error {
            error!(model = M::NAME, %err, "update failed");
        } else if let Some(row) = envelope.first_row() {
            self.attributes = Self::from_row(row).into_attributes();
        }
        self.response = Some(envelope);
        Ok(self)
    }

    /// Reloads the row by identifier and re-applies casts.
    ///
    /// On failure the attributes are kept and the envelope is stored.
    ///
    /// # Errors
    ///
    /// [`RecordError::MissingIdentifier`] when the record has no identifier.
    pub async fn refresh(&mut self) -> Result<&mut Self> {
        ensure_loaded::<M>().await?;
        let options = registry::options::<M>();
        let filters = self.identifier_filters(&options)?;
        let envelope = identify(
            RequestBuilder::from(registry::table::<M>()).select(options.select.clone()),
            filters,
        )
        .single()
        .execute(&*store::<M>()?)
        .await;
        if let Some(row) = envelope.first_row().filter(|_| envelope.is_success()) {
            self.attributes = options.casts.apply(row);
            self.persisted = true;
        }
        self.response = Some(envelope);
        Ok(self)
    }

    /// Refreshes, then returns the value of `field`.
    ///
    /// # Errors
    ///
    /// See [`Record::refresh`].
    pub async fn fetch(&mut self, field: &str) -> Result<Option<Value>> {
        self.refresh().await?;
        Ok(self.get(field).cloned())
    }

    /// Stores `field` through [`Record::update`].
    ///
    /// # Errors
    ///
    /// See [`Record::update`].
    pub async fn persist(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let mut data = Row::new();
        data.insert(field.to_owned(), value.into());
        self.update(data).await
    }

    /// Deletes the stored row.
    ///
    /// Without an explicit mode the model's soft-delete setting decides.
    /// Returns a record wrapping the deletion response.
    ///
    /// # Errors
    ///
    /// [`RecordError::MissingIdentifier`] when the record has no identifier.
    pub async fn delete(&self, options: DeleteOptions) -> Result<Self> {
        ensure_loaded::<M>().await?;
        let model_options = registry::options::<M>();
        let filters = self.identifier_filters(&model_options)?;
        let mode = options.mode.unwrap_or(if model_options.soft_deletes {
            DeleteMode::Soft
        } else {
            DeleteMode::Hard
        });
        Ok(Self::from_envelope(
            delete_request::<M>(mode, filters)
                .execute(&*store::<M>()?)
                .await,
        ))
    }

    /// Inserts a copy of this record without its identifier.
    ///
    /// # Errors
    ///
    /// Configuration errors only.
    pub async fn duplicate(&self, options: DuplicateOptions) -> Result<Self> {
        ensure_loaded::<M>().await?;
        let model_options = registry::options::<M>();
        let mut row: Row = self
            .attributes
            .iter()
            .filter(|(column, _)| !model_options.id.contains(column) && options.keeps(column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        if model_options.timestamps {
            let now = now();
            for column in [CREATED_AT, UPDATED_AT] {
                if let Some(value) = row.get_mut(column) {
                    *value = now.clone();
                }
            }
        }
        let envelope = RequestBuilder::from(registry::table::<M>())
            .insert(vec![row])
            .select("*")
            .maybe_single()
            .execute(&*store::<M>()?)
            .await;
        Self::made(envelope).await
    }
}

pub(crate) fn store<M: Model>() -> Result<Arc<dyn DataStore>> {
    registry::connection::<M>()
}

/// A soft or hard delete of the rows matched by `filters`.
pub(crate) fn delete_request<M: Model>(mode: DeleteMode, filters: Vec<(String, Value)>) -> RequestBuilder {
    let builder = RequestBuilder::from(registry::table::<M>());
    let builder = match mode {
        DeleteMode::Soft => {
            let mut values = Row::new();
            values.insert(DELETED_AT.to_owned(), now());
            builder.update(values)
        }
        DeleteMode::Hard => builder.delete(),
    };
    identify(builder, filters).select("*")
}

impl<M: Model> Item for Record<M> {
    fn is_record(&self) -> bool {
        true
    }

    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }

    fn set_field(&mut self, key: &str, value: Value) {
        if self
            .check_identifier(&registry::options::<M>(), key, &value)
            .is_err()
        {
            debug!(model = M::NAME, field = key, "identifier left unchanged");
            return;
        }
        self.attributes.insert(key.to_owned(), value);
    }

    fn to_value(&self) -> Value {
        self.plain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::casters;
    use crate::collection::Collection;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Article {
        id: i64,
        title: String,
        views: i64,
    }

    impl Model for Article {
        const NAME: &'static str = "Article";

        fn options() -> ModelOptions {
            ModelOptions::new().cast("views", casters::integer())
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_row_casts_and_marks_persisted() {
        let record = Record::<Article>::from_row(row(json!({"id": 1, "title": "Hi", "views": "12"})));
        assert!(record.is_persisted());
        assert_eq!(record.get("views"), Some(&json!(12)));
        assert_eq!(
            record.model().unwrap(),
            Article {
                id: 1,
                title: "Hi".into(),
                views: 12
            }
        );

        let fresh = Record::<Article>::from_row(row(json!({"title": "New"})));
        assert!(!fresh.is_persisted());
    }

    #[test]
    fn test_hydrate_envelope_shape() {
        let record = Record::<Article>::hydrate(json!({
            "data": {"id": 3, "title": "Env", "views": 1},
            "error": null,
            "status": 200
        }));
        assert_eq!(record.get("title"), Some(&json!("Env")));
        assert_eq!(record.response().map(|r| r.status), Some(200));
        assert!(!record.attributes().contains_key("status"));

        let plain = Record::<Article>::hydrate(json!({"id": 4, "title": "Row", "views": 2}));
        assert!(plain.response().is_none());
        assert_eq!(plain.get("id"), Some(&json!(4)));

        assert!(Record::<Article>::hydrate(json!(42)).attributes().is_empty());
    }

    #[test]
    fn test_identifier_is_immutable_once_persisted() {
        let mut record = Record::<Article>::from_row(row(json!({"id": 1, "title": "Hi", "views": 0})));
        assert!(matches!(
            record.set("id", 2),
            Err(RecordError::ImmutableIdentifier(field)) if field == "id"
        ));
        assert!(record.set("id", 1).is_ok());
        record.set("title", "Changed").unwrap();
        assert_eq!(record.get("title"), Some(&json!("Changed")));

        let mut draft = Record::<Article>::new();
        assert!(draft.set("id", 9).is_ok());
    }

    #[test]
    fn test_distinct_by_keeps_identifiers() {
        let records = Collection::from(vec![
            Record::<Article>::from_row(row(json!({"id": 1, "title": "a", "views": 0}))),
            Record::<Article>::from_row(row(json!({"id": 2, "title": "b", "views": 0}))),
        ]);
        let constant = |_: &Value| json!(0);
        let distinct = records.distinct_by("id", Some(&constant));
        assert_eq!(distinct.len(), 1);
        assert_eq!(distinct[0].get("id"), Some(&json!(1)));

        let upper = |v: &Value| Value::String(v.as_str().unwrap_or_default().to_uppercase());
        let titled = records.distinct_by("title", Some(&upper));
        assert_eq!(titled[1].get("title"), Some(&json!("B")));
    }

    #[test]
    fn test_embedded_keys_leave_attributes() {
        let record = Record::<Article>::from_embedded_row(
            row(json!({"id": 1, "title": "Hi", "views": 0, "author": {"name": "Ada"}})),
            &[String::from("author")],
        );
        assert!(!record.attributes().contains_key("author"));
        assert_eq!(record.relation("author").unwrap()["name"], json!("Ada"));
        assert_eq!(record.get("author"), record.relation("author"));
    }

    #[test]
    fn test_key_and_plain() {
        let mut record = Record::<Article>::from_row(row(json!({"id": 5, "title": "T", "views": 0})));
        assert_eq!(record.key().unwrap(), Key::from(5));
        record.attach("tags".into(), json!([1, 2]));
        assert_eq!(record.plain()["tags"], json!([1, 2]));
        assert!(!record.attributes().contains_key("tags"));

        assert!(matches!(
            Record::<Article>::new().key(),
            Err(RecordError::MissingIdentifier(_))
        ));
    }
}
