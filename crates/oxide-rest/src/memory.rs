//! In-memory DataStore.
//!
//! [`MemoryStore`] keeps tables in process memory and answers requests with
//! the same statuses and error codes PostgREST uses, so code written against
//! it behaves the same way against a hosted database. Every request and RPC
//! is recorded in a call log that tests can inspect.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::envelope::{Envelope, Row};
use crate::error::StoreError;
use crate::request::{Action, Cardinality, Filter, Order, Request};
use crate::store::DataStore;

/// Name of the built-in introspection procedure.
pub const DESCRIBE_PROCEDURE: &str = "describe_table";

/// A stored procedure registered on a [`MemoryStore`].
pub type Procedure = Arc<dyn Fn(&MemoryStore, Value) -> Envelope + Send + Sync>;

/// Column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Postgres data type as reported by introspection.
    pub data_type: String,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
}

/// Table declaration.
///
/// A table without columns accepts any keys. The primary key defaults to
/// `id`, which is auto-assigned on insert when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
}

impl TableDef {
    /// Declares a table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: vec![String::from("id")],
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, name: &str, data_type: &str, nullable: bool) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_owned(),
            data_type: data_type.to_owned(),
            nullable,
        });
        self
    }

    /// Replaces the primary key columns.
    #[must_use]
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c.name == name)
    }

    fn auto_increment(&self) -> bool {
        self.primary_key.len() == 1 && self.primary_key[0] == "id"
    }
}

/// One entry of the call log.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// A table request.
    Request(Request),
    /// A stored procedure invocation.
    Rpc {
        /// Procedure name.
        procedure: String,
        /// Parameters passed.
        params: Value,
    },
}

impl Call {
    /// The request, if this call was a table request.
    #[must_use]
    pub const fn as_request(&self) -> Option<&Request> {
        match self {
            Self::Request(request) => Some(request),
            Self::Rpc { .. } => None,
        }
    }
}

struct Table {
    def: TableDef,
    rows: Vec<Row>,
    next_id: i64,
}

impl Table {
    fn new(def: TableDef) -> Self {
        Self {
            def,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn key_of(&self, row: &Row) -> Option<Vec<Value>> {
        self.def
            .primary_key
            .iter()
            .map(|column| row.get(column).filter(|v| !v.is_null()).cloned())
            .collect()
    }

    fn position_of_key(&self, key: &[Value]) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| self.key_of(row).as_deref() == Some(key))
    }

    /// Validates columns, fills declared columns with `NULL` and assigns ids.
    fn prepare(&mut self, mut row: Row) -> Result<Row, (StoreError, u16)> {
        self.check_columns(&row)?;
        if self.def.auto_increment() {
            match row.get("id") {
                None | Some(Value::Null) => {
                    row.insert(String::from("id"), json!(self.next_id));
                    self.next_id += 1;
                }
                Some(id) => {
                    if let Some(id) = id.as_i64() {
                        self.next_id = self.next_id.max(id + 1);
                    }
                }
            }
        }
        let mut full = Row::new();
        for column in &self.def.columns {
            full.insert(
                column.name.clone(),
                row.remove(&column.name).unwrap_or(Value::Null),
            );
        }
        full.extend(row);
        Ok(full)
    }

    fn check_columns(&self, row: &Row) -> Result<(), (StoreError, u16)> {
        match row.keys().find(|key| !self.def.has_column(key)) {
            Some(unknown) => Err((
                StoreError::new(
                    "PGRST204",
                    format!(
                        "Could not find the '{unknown}' column of '{}' in the schema cache",
                        self.def.name
                    ),
                ),
                400,
            )),
            None => Ok(()),
        }
    }

    fn conflict(&self) -> (StoreError, u16) {
        (
            StoreError::new(
                "23505",
                format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    self.def.name
                ),
            ),
            409,
        )
    }
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Table>,
    calls: Vec<Call>,
}

/// A DataStore backed by process memory.
///
/// # Example
///
/// ```
/// use oxide_rest::{MemoryStore, RequestBuilder, TableDef};
/// use serde_json::json;
///
/// let store = MemoryStore::new().with_table(
///     TableDef::new("posts")
///         .column("id", "bigint", false)
///         .column("title", "text", true),
/// );
/// store.seed("posts", vec![json!({"title": "Hello"})]);
///
/// let envelope = store.apply(RequestBuilder::from("posts").eq("id", 1).single().build());
/// assert_eq!(envelope.data["title"], json!("Hello"));
/// ```
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    procedures: RwLock<HashMap<String, Procedure>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryStore")
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, builder style.
    #[must_use]
    pub fn with_table(self, def: TableDef) -> Self {
        self.define_table(def);
        self
    }

    /// Adds or replaces a table.
    pub fn define_table(&self, def: TableDef) {
        let name = def.name.clone();
        self.state().tables.insert(name, Table::new(def));
    }

    /// Inserts rows directly, bypassing the call log.
    ///
    /// Non-object values are ignored. Unknown tables are created schemaless.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut state = self.state();
        let table = state
            .tables
            .entry(table.to_owned())
            .or_insert_with(|| Table::new(TableDef::new(table)));
        for row in rows.into_iter().filter_map(|v| match v {
            Value::Object(row) => Some(row),
            _ => None,
        }) {
            match table.prepare(row) {
                Ok(row) => table.rows.push(row),
                Err((error, _)) => warn!(table = %table.def.name, %error, "seed row rejected"),
            }
        }
    }

    /// Snapshot of a table's rows.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Registers a stored procedure.
    pub fn register_procedure<F>(&self, name: &str, procedure: F)
    where
        F: Fn(&Self, Value) -> Envelope + Send + Sync + 'static,
    {
        self.procedures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), Arc::new(procedure));
    }

    /// Every call received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Only the table requests from the call log.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| call.as_request().cloned())
            .collect()
    }

    /// Empties the call log.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Executes a request synchronously.
    pub fn apply(&self, request: Request) -> Envelope {
        debug!(table = %request.table, action = ?request.action, "memory store request");
        let mut state = self.state();
        state.calls.push(Call::Request(request.clone()));
        let Some(table) = state.tables.get_mut(&request.table) else {
            return Envelope::failure(
                StoreError::new(
                    "42P01",
                    format!("relation \"public.{}\" does not exist", request.table),
                ),
                404,
            );
        };
        match run(table, request) {
            Ok(envelope) => envelope,
            Err((error, status)) => Envelope::failure(error, status),
        }
    }

    /// Invokes a procedure synchronously.
    pub fn call(&self, procedure: &str, params: Value) -> Envelope {
        debug!(procedure, "memory store rpc");
        self.state().calls.push(Call::Rpc {
            procedure: procedure.to_owned(),
            params: params.clone(),
        });
        let registered = self
            .procedures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(procedure)
            .cloned();
        if let Some(registered) = registered {
            return registered(self, params);
        }
        if procedure == DESCRIBE_PROCEDURE {
            return self.describe(&params);
        }
        Envelope::failure(
            StoreError::new(
                "PGRST202",
                format!("Could not find the function public.{procedure} in the schema cache"),
            ),
            404,
        )
    }

    fn describe(&self, params: &Value) -> Envelope {
        let name = params.get("tablename").and_then(Value::as_str).unwrap_or("");
        let state = self.state();
        let rows = state
            .tables
            .get(name)
            .map(|table| {
                table
                    .def
                    .columns
                    .iter()
                    .map(|c| {
                        json!({
                            "column_name": c.name,
                            "data_type": c.data_type,
                            "is_nullable": if c.nullable { "YES" } else { "NO" },
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Envelope::ok(Value::Array(rows), 200)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn execute(&self, request: Request) -> Envelope {
        self.apply(request)
    }

    async fn rpc(&self, procedure: &str, params: Value) -> Envelope {
        self.call(procedure, params)
    }
}

type Outcome = Result<Envelope, (StoreError, u16)>;

fn run(table: &mut Table, request: Request) -> Outcome {
    let Request {
        action,
        filters,
        order,
        limit,
        cardinality,
        returning,
        ..
    } = request;

    match action {
        Action::Select { columns } => {
            let mut rows = matching(&table.rows, &filters)?
                .into_iter()
                .map(|i| table.rows[i].clone())
                .collect::<Vec<_>>();
            sort(&mut rows, order.as_ref());
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
            let count = u64::try_from(rows.len()).unwrap_or(u64::MAX);
            let rows = project_all(&table.def, rows, &columns)?;
            shape(rows, cardinality, 200).map(|env| env.with_count(count))
        }
        Action::Insert { rows } => {
            let mut prepared = Vec::with_capacity(rows.len());
            for row in rows {
                let row = table.prepare(row)?;
                let key = table.key_of(&row);
                let clash = key.as_ref().is_some_and(|key| {
                    table.position_of_key(key).is_some()
                        || prepared.iter().any(|p| table.key_of(p).as_ref() == Some(key))
                });
                if clash {
                    return Err(table.conflict());
                }
                prepared.push(row);
            }
            table.rows.extend(prepared.iter().cloned());
            respond(&table.def, prepared, returning, cardinality, 201)
        }
        Action::Upsert { rows } => {
            let mut affected = Vec::with_capacity(rows.len());
            for row in rows {
                let existing = table
                    .key_of(&row)
                    .and_then(|key| table.position_of_key(&key));
                if let Some(index) = existing {
                    table.check_columns(&row)?;
                    table.rows[index].extend(row);
                    affected.push(table.rows[index].clone());
                } else {
                    let row = table.prepare(row)?;
                    table.rows.push(row.clone());
                    affected.push(row);
                }
            }
            respond(&table.def, affected, returning, cardinality, 201)
        }
        Action::Update { values } => {
            table.check_columns(&values)?;
            let indexes = matching(&table.rows, &filters)?;
            let mut affected = Vec::with_capacity(indexes.len());
            for index in indexes {
                table.rows[index].extend(values.clone());
                affected.push(table.rows[index].clone());
            }
            respond(&table.def, affected, returning, cardinality, 200)
        }
        Action::Delete => {
            let indexes = matching(&table.rows, &filters)?;
            let mut affected = Vec::with_capacity(indexes.len());
            for index in indexes.into_iter().rev() {
                affected.push(table.rows.remove(index));
            }
            affected.reverse();
            respond(&table.def, affected, returning, cardinality, 200)
        }
    }
}

fn respond(
    def: &TableDef,
    rows: Vec<Row>,
    returning: Option<String>,
    cardinality: Cardinality,
    status: u16,
) -> Outcome {
    match returning {
        Some(columns) => shape(project_all(def, rows, &columns)?, cardinality, status),
        None if status == 201 => Ok(Envelope::ok(Value::Null, 201)),
        None => Ok(Envelope::ok(Value::Null, 204)),
    }
}

fn shape(rows: Vec<Row>, cardinality: Cardinality, status: u16) -> Outcome {
    let single_violation = |n: usize| {
        (
            StoreError::new(
                "PGRST116",
                "JSON object requested, multiple (or no) rows returned",
            )
            .with_details(format!("The result contains {n} rows")),
            406,
        )
    };
    match cardinality {
        Cardinality::Many => Ok(Envelope::ok(
            Value::Array(rows.into_iter().map(Value::Object).collect()),
            status,
        )),
        Cardinality::Single if rows.len() == 1 => {
            Ok(Envelope::ok(Value::Object(rows.into_iter().next().unwrap_or_default()), status))
        }
        Cardinality::MaybeSingle if rows.is_empty() => Ok(Envelope::ok(Value::Null, status)),
        Cardinality::MaybeSingle if rows.len() == 1 => {
            Ok(Envelope::ok(Value::Object(rows.into_iter().next().unwrap_or_default()), status))
        }
        Cardinality::Single | Cardinality::MaybeSingle => Err(single_violation(rows.len())),
    }
}

fn matching(rows: &[Row], filters: &[Filter]) -> Result<Vec<usize>, (StoreError, u16)> {
    let mut indexes = Vec::new();
    'rows: for (index, row) in rows.iter().enumerate() {
        for filter in filters {
            if !matches(row, filter)? {
                continue 'rows;
            }
        }
        indexes.push(index);
    }
    Ok(indexes)
}

fn matches(row: &Row, filter: &Filter) -> Result<bool, (StoreError, u16)> {
    let cell = row.get(&filter.column).unwrap_or(&Value::Null);
    let value = &filter.value;
    if filter.operator == "is" {
        let hit = match value {
            Value::Null => cell.is_null(),
            Value::Bool(_) => cell == value,
            _ => false,
        };
        return Ok(hit != filter.negated);
    }
    // SQL three-valued logic: any comparison against NULL is never true.
    if cell.is_null() {
        return Ok(false);
    }
    let hit = match filter.operator.as_str() {
        "eq" => loose_eq(cell, value),
        "neq" => !loose_eq(cell, value),
        "gt" => compare(cell, value) == Some(Ordering::Greater),
        "gte" => matches!(compare(cell, value), Some(Ordering::Greater | Ordering::Equal)),
        "lt" => compare(cell, value) == Some(Ordering::Less),
        "lte" => matches!(compare(cell, value), Some(Ordering::Less | Ordering::Equal)),
        "in" => value
            .as_array()
            .is_some_and(|items| items.iter().any(|item| loose_eq(cell, item))),
        "like" => like(&text(cell), &text(value), false),
        "ilike" => like(&text(cell), &text(value), true),
        other => {
            return Err((
                StoreError::new("PGRST100", format!("\"failed to parse filter ({other})\""))
                    .with_hint(format!("unknown operator for column {}", filter.column)),
                400,
            ))
        }
    };
    Ok(hit != filter.negated)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((number(left), number(right)), (Some(a), Some(b)) if (a - b).abs() < f64::EPSILON)
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s == if *b { "true" } else { "false" }
        }
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => number(left)?.partial_cmp(&number(right)?),
    }
}

fn like(value: &str, pattern: &str, insensitive: bool) -> bool {
    fn walk(value: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => value.is_empty(),
            Some(('%', rest)) => (0..=value.len()).any(|skip| walk(&value[skip..], rest)),
            Some(('_', rest)) => !value.is_empty() && walk(&value[1..], rest),
            Some((c, rest)) => value.first() == Some(c) && walk(&value[1..], rest),
        }
    }
    let fold = |s: &str| -> Vec<char> {
        if insensitive {
            s.to_lowercase().chars().collect()
        } else {
            s.chars().collect()
        }
    };
    walk(&fold(value), &fold(pattern))
}

fn sort(rows: &mut [Row], order: Option<&Order>) {
    let Some(order) = order else { return };
    rows.sort_by(|a, b| {
        let left = a.get(&order.column).unwrap_or(&Value::Null);
        let right = b.get(&order.column).unwrap_or(&Value::Null);
        // Postgres puts NULLs last when ascending, first when descending.
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
        };
        if order.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

/// Splits a select expression on commas outside parentheses.
fn split_columns(columns: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, c) in columns.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(columns[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(columns[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn project_all(def: &TableDef, rows: Vec<Row>, columns: &str) -> Result<Vec<Row>, (StoreError, u16)> {
    let parts = split_columns(columns);
    if parts.iter().all(|p| *p == "*") {
        return Ok(rows);
    }
    for part in &parts {
        let source = part.split_once(':').map_or(*part, |(_, column)| column.trim());
        if *part != "*" && !source.contains('(') && !def.has_column(source) {
            return Err((
                StoreError::new(
                    "42703",
                    format!("column {}.{source} does not exist", def.name),
                ),
                400,
            ));
        }
    }
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut out = Row::new();
            for part in &parts {
                if *part == "*" {
                    out.extend(row.clone());
                    continue;
                }
                // Embedded resources are not resolved in memory.
                if part.contains('(') {
                    continue;
                }
                let (alias, column) = part
                    .split_once(':')
                    .map_or((*part, *part), |(alias, column)| (alias.trim(), column.trim()));
                out.insert(
                    alias.to_owned(),
                    row.get(column).cloned().unwrap_or(Value::Null),
                );
            }
            out
        })
        .collect())
}
