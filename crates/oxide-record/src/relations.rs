//! Relationship descriptors and traversal.
//!
//! Relationships are declared on [`ModelOptions`](crate::ModelOptions) and
//! point either at a table by name or at another model type. Traversal
//! methods live on [`Record`] and issue secondary requests against the
//! same store as the record's model.

use std::collections::HashSet;

use oxide_rest::{Envelope, RequestBuilder, Row};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::collection::Collection;
use crate::error::{RecordError, Result};
use crate::inflect::{foreign_key_for, table_name_for, to_snake_case};
use crate::model::{Key, Model};
use crate::operators::{apply_all, Condition};
use crate::options::ResetOptions;
use crate::record::{store, Record};
use crate::registry;
use crate::schema::ensure_loaded;

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// One row on each side.
    OneToOne,
    /// This row owns many rows.
    OneToMany,
    /// This row belongs to one row.
    ManyToOne,
    /// Rows are linked through a join table.
    ManyToMany,
}

/// Name and table of a model, captured when a relationship is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Model name.
    pub name: String,
    /// Model table.
    pub table: String,
}

impl EntityDescriptor {
    /// Describes `R` from its constants. Runtime table overrides are not
    /// consulted.
    #[must_use]
    pub fn of<R: Model>() -> Self {
        Self {
            name: R::NAME.to_owned(),
            table: R::TABLE.map_or_else(|| table_name_for(R::NAME), str::to_owned),
        }
    }
}

/// What a relationship points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget {
    /// A table, by name.
    ByName(String),
    /// A model type.
    ByType(EntityDescriptor),
}

impl RelationTarget {
    /// The target table.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::ByName(table) => table,
            Self::ByType(entity) => &entity.table,
        }
    }
}

/// A declared relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    /// Target table or model.
    pub target: RelationTarget,
    /// Cardinality.
    pub kind: RelationKind,
    /// Column on the target holding this model's identifier.
    pub foreign_key: Option<String>,
    /// Column the foreign key refers to.
    pub references: Option<String>,
    /// Columns read from the target. Empty means the default selection.
    pub select_columns: Vec<String>,
    /// Extra conditions applied when reading the target.
    pub conditions: Vec<Condition>,
    /// Reduce the association to the first select column (or `id`).
    pub return_vertical_array: bool,
}

impl Relationship {
    /// A relationship to the table `name`.
    #[must_use]
    pub fn named(name: &str, kind: RelationKind) -> Self {
        Self::new(RelationTarget::ByName(name.to_owned()), kind)
    }

    /// A relationship to the model `R`.
    #[must_use]
    pub fn to<R: Model>(kind: RelationKind) -> Self {
        Self::new(RelationTarget::ByType(EntityDescriptor::of::<R>()), kind)
    }

    const fn new(target: RelationTarget, kind: RelationKind) -> Self {
        Self {
            target,
            kind,
            foreign_key: None,
            references: None,
            select_columns: Vec::new(),
            conditions: Vec::new(),
            return_vertical_array: false,
        }
    }

    /// Sets the column on the target that holds this model's identifier.
    #[must_use]
    pub fn foreign_key(mut self, column: &str) -> Self {
        self.foreign_key = Some(column.to_owned());
        self
    }

    /// Sets the column the foreign key refers to.
    #[must_use]
    pub fn references(mut self, column: &str) -> Self {
        self.references = Some(column.to_owned());
        self
    }

    /// Limits the columns read from the target.
    #[must_use]
    pub fn select_columns(mut self, columns: &[&str]) -> Self {
        self.select_columns = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    /// Adds a condition applied when reading the target.
    #[must_use]
    pub fn condition(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Attach the association as a flat list of one column's values.
    #[must_use]
    pub const fn vertical(mut self) -> Self {
        self.return_vertical_array = true;
        self
    }

    /// The relationship name: its target table.
    #[must_use]
    pub fn name(&self) -> &str {
        self.target.table()
    }

    /// Whether the relationship points at `R`, by type, table or lowercase
    /// model name.
    #[must_use]
    pub fn targets<R: Model>(&self) -> bool {
        let entity = EntityDescriptor::of::<R>();
        match &self.target {
            RelationTarget::ByType(target) => *target == entity,
            RelationTarget::ByName(name) => {
                *name == entity.table || name.eq_ignore_ascii_case(R::NAME)
            }
        }
    }

    /// The embed expression for this relationship, e.g. `tags(id,name)`.
    #[must_use]
    pub fn embed(&self) -> String {
        let columns = if self.select_columns.is_empty() {
            String::from("*")
        } else {
            self.select_columns.join(",")
        };
        format!("{}({columns})", self.name())
    }
}

fn rows_of(envelope: &Envelope) -> Vec<Value> {
    envelope.rows().into_iter().map(Value::Object).collect()
}

/// A comparable form of a key value, so `1` and `"1"` match.
fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl<M: Model> Record<M> {
    fn relationship(&self, name: &str) -> Result<Relationship> {
        registry::options::<M>()
            .find_relation(name)
            .cloned()
            .ok_or_else(|| RecordError::UnknownRelation {
                model: M::NAME.to_owned(),
                relation: name.to_owned(),
            })
    }

    /// Loads the `R` row this record points at and attaches it under
    /// `R::NAME` in lowercase.
    ///
    /// The foreign key column is `foreign_key` when given, else the one
    /// declared on a relationship targeting `R`, else the singular of
    /// `R`'s table followed by `_id`.
    ///
    /// # Errors
    ///
    /// Configuration errors of either model.
    pub async fn with<R: Model>(&mut self, foreign_key: Option<&str>) -> Result<&mut Self> {
        ensure_loaded::<M>().await?;
        let column = foreign_key.map_or_else(
            || {
                registry::options::<M>()
                    .relations
                    .iter()
                    .find(|relation| relation.targets::<R>())
                    .and_then(|relation| relation.foreign_key.clone())
                    .unwrap_or_else(|| foreign_key_for(&registry::table::<R>()))
            },
            str::to_owned,
        );
        let value = self.get(&column).cloned().unwrap_or(Value::Null);
        debug!(model = M::NAME, related = R::NAME, %column, "loading related record");
        let related = R::objects().find(Key::Value(value)).await?;
        self.attach(R::NAME.to_lowercase(), related.plain());
        Ok(self)
    }

    /// Reads the join table of the many-to-many relationship `relation`
    /// for this record.
    ///
    /// Columns come from the relationship when it declares some, else from
    /// `select_columns`, else the model's default selection.
    ///
    /// # Errors
    ///
    /// [`RecordError::UnknownRelation`] when `relation` is not declared.
    pub async fn get_many_to_many(
        &self,
        relation: &str,
        select_columns: Option<&[&str]>,
    ) -> Result<Collection<Value>> {
        ensure_loaded::<M>().await?;
        let relationship = self.relationship(relation)?;
        let columns = if !relationship.select_columns.is_empty() {
            relationship.select_columns.join(", ")
        } else if let Some(columns) = select_columns {
            columns.join(", ")
        } else {
            registry::options::<M>().select.clone()
        };
        let foreign_key = relationship
            .foreign_key
            .clone()
            .unwrap_or_else(|| foreign_key_for(&registry::table::<M>()));

        let builder = RequestBuilder::from(relationship.name())
            .select(columns)
            .eq(foreign_key, self.identifier_value()?);
        let envelope = apply_all(&relationship.conditions, builder)
            .execute(&*store::<M>()?)
            .await;
        Ok(Collection::from(rows_of(&envelope)).with_response(envelope))
    }

    /// Rows of the `relation` table linked to this record that also match
    /// `column <operator> value`, read as records of `M`.
    ///
    /// # Errors
    ///
    /// [`RecordError::UnknownRelation`] when `relation` is not declared.
    pub async fn where_has(
        &self,
        relation: &str,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> Result<Collection<Self>> {
        ensure_loaded::<M>().await?;
        let relationship = self.relationship(relation)?;
        let foreign_key = relationship
            .foreign_key
            .clone()
            .unwrap_or_else(|| foreign_key_for(&registry::table::<M>()));

        let builder = RequestBuilder::from(relationship.name())
            .select("*")
            .eq(foreign_key, self.identifier_value()?);
        let envelope = Condition::op(column, operator, value)
            .apply(builder)
            .execute(&*store::<M>()?)
            .await;
        let records = envelope.rows().into_iter().map(Self::from_row).collect::<Vec<_>>();
        Ok(Collection::from(records).with_response(envelope))
    }

    /// Records of `R` whose `<model>_id` column points at this record,
    /// filtered by `conditions`. This model's row is embedded under its
    /// snake-case name.
    ///
    /// # Errors
    ///
    /// Configuration errors of either model.
    pub async fn get_related<R: Model>(&self, conditions: Vec<Condition>) -> Result<Collection<Record<R>>> {
        ensure_loaded::<M>().await?;
        ensure_loaded::<R>().await?;
        let own = to_snake_case(M::NAME);
        let builder = RequestBuilder::from(registry::table::<R>())
            .select(format!("*, {own}:{}(*)", registry::table::<M>()))
            .eq(format!("{own}_id"), self.identifier_value()?);
        let envelope = apply_all(&conditions, builder)
            .execute(&*store::<M>()?)
            .await;
        let records = envelope
            .rows()
            .into_iter()
            .map(|row| Record::<R>::from_embedded_row(row, std::slice::from_ref(&own)))
            .collect::<Vec<_>>();
        Ok(Collection::from(records).with_response(envelope))
    }

    /// Makes the set of `distant_id` values linked to this record in
    /// `relation` equal to `data`.
    ///
    /// Rows `{distant_id: item, foreign_id_column: <own id>}` are upserted
    /// (or passed as `{"data": rows}` to `options.rpc`). Linked rows whose
    /// distant id was not returned are then deleted. An empty `data`
    /// removes every link. The response is that of the upsert, or of the
    /// first later step that failed. The steps are not atomic; use a
    /// procedure when that matters.
    ///
    /// # Errors
    ///
    /// [`RecordError::MissingIdentifier`] when the record has no identifier.
    pub async fn reset_has_many(
        &mut self,
        relation: &str,
        foreign_id_column: &str,
        distant_id: &str,
        data: Vec<Value>,
        options: ResetOptions,
    ) -> Result<&mut Self> {
        ensure_loaded::<M>().await?;
        let own_id = self.identifier_value()?;
        let store = store::<M>()?;
        let rows: Vec<Row> = data
            .into_iter()
            .map(|item| {
                let mut row = Row::new();
                row.insert(distant_id.to_owned(), item);
                row.insert(foreign_id_column.to_owned(), own_id.clone());
                row
            })
            .collect();
        let wanted_nothing = rows.is_empty();

        let envelope = match &options.rpc {
            Some(procedure) => store.rpc(procedure, json!({ "data": rows })).await,
            None if wanted_nothing => Envelope::ok(Value::Array(Vec::new()), 200),
            None => {
                RequestBuilder::from(relation)
                    .upsert(rows)
                    .select("*")
                    .execute(&*store)
                    .await
            }
        };
        if !envelope.is_success() {
            warn!(model = M::NAME, relation, error = ?envelope.error, "association upsert failed");
            self.set_response(envelope);
            return Ok(self);
        }

        let kept: HashSet<String> = envelope
            .rows()
            .iter()
            .filter_map(|row| row.get(distant_id))
            .map(key_text)
            .collect();
        if kept.is_empty() && !wanted_nothing {
            debug!(model = M::NAME, relation, "no rows reported back; stale links kept");
            self.set_response(envelope);
            return Ok(self);
        }

        let existing = RequestBuilder::from(relation)
            .select(distant_id)
            .eq(foreign_id_column, own_id.clone())
            .execute(&*store)
            .await;
        if !existing.is_success() {
            error!(model = M::NAME, relation, error = ?existing.error, "could not read current links");
            self.set_response(existing);
            return Ok(self);
        }
        let stale: Vec<Value> = existing
            .rows()
            .into_iter()
            .filter_map(|mut row| row.remove(distant_id))
            .filter(|value| !kept.contains(&key_text(value)))
            .collect();
        if !stale.is_empty() {
            debug!(model = M::NAME, relation, removed = stale.len(), "removing stale links");
            let removed = RequestBuilder::from(relation)
                .delete()
                .eq(foreign_id_column, own_id)
                .in_list(distant_id, stale)
                .execute(&*store)
                .await;
            if !removed.is_success() {
                error!(model = M::NAME, relation, error = ?removed.error, "could not remove stale links");
                self.set_response(removed);
                return Ok(self);
            }
        }
        self.set_response(envelope);
        Ok(self)
    }

    /// Attaches every declared many-to-many association. Unsaved records
    /// are left as they are.
    ///
    /// # Errors
    ///
    /// Configuration errors from [`Record::get_many_to_many`].
    pub async fn relate(&mut self) -> Result<&mut Self> {
        if !self.is_persisted() {
            return Ok(self);
        }
        let options = registry::options::<M>();
        for relationship in options
            .relations
            .iter()
            .filter(|r| r.kind == RelationKind::ManyToMany)
        {
            let association = self.get_many_to_many(relationship.name(), None).await?;
            let value = if relationship.return_vertical_array {
                let key = relationship
                    .select_columns
                    .first()
                    .map_or("id", String::as_str);
                association.vertical(key).into_vec()
            } else {
                association.plain().into_vec()
            };
            self.attach(relationship.name().to_owned(), Value::Array(value));
        }
        Ok(self)
    }
}
