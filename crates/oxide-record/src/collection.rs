//! Ordered result container.
//!
//! Every query result flows through [`Collection`]. Besides the usual
//! sequence operations it offers record-aware helpers (projection, vertical
//! slices, dedup by key, select-box options) and carries the response
//! envelope of the request that produced it.
//!
//! Transforming operations (`select`, `map`, `filter`, `distinct`, ...)
//! return a fresh collection without the envelope. Mutating operations
//! (`push`, `splice`, `sort_by`, `remove`, ...) act in place.

use std::ops::{Index, IndexMut};

use oxide_rest::Envelope;
use serde_json::{Map, Value};
use tracing::warn;

/// An element a [`Collection`] can inspect.
///
/// Keyed elements (JSON objects, records) expose named fields; scalars do
/// not.
pub trait Item: Clone {
    /// Whether the element has named fields.
    fn is_record(&self) -> bool;

    /// The value of a named field.
    fn field(&self, key: &str) -> Option<&Value>;

    /// Overwrites a named field. Scalars ignore this.
    fn set_field(&mut self, key: &str, value: Value);

    /// The element as plain JSON.
    fn to_value(&self) -> Value;
}

impl Item for Value {
    fn is_record(&self) -> bool {
        self.is_object()
    }

    fn field(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    fn set_field(&mut self, key: &str, value: Value) {
        if let Some(map) = self.as_object_mut() {
            map.insert(key.to_owned(), value);
        }
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}

macro_rules! scalar_item {
    ($($ty:ty),*) => {
        $(impl Item for $ty {
            fn is_record(&self) -> bool {
                false
            }

            fn field(&self, _key: &str) -> Option<&Value> {
                None
            }

            fn set_field(&mut self, _key: &str, _value: Value) {}

            fn to_value(&self) -> Value {
                Value::from(self.clone())
            }
        })*
    };
}

scalar_item!(bool, i32, i64, u32, u64, f64, String, &'static str);

/// Options for [`Collection::remove`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove every match instead of the first.
    pub all: bool,
}

impl RemoveOptions {
    /// Remove every match.
    #[must_use]
    pub const fn all() -> Self {
        Self { all: true }
    }
}

/// A post-processing function applied to a field value.
pub type ValueFormatter<'a> = &'a dyn Fn(&Value) -> Value;

/// An ordered sequence with an attached response envelope.
///
/// # Example
///
/// ```
/// use oxide_record::Collection;
/// use serde_json::json;
///
/// let rows = Collection::from(vec![
///     json!({"id": 1, "name": "rust"}),
///     json!({"id": 2, "name": "go"}),
/// ]);
/// let names = rows.vertical("name");
/// assert_eq!(names.to_vec(), vec![json!("rust"), json!("go")]);
/// ```
#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    response: Option<Envelope>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            response: None,
        }
    }
}

impl<T> Collection<T> {
    /// An empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            response: None,
        }
    }

    /// Attaches an envelope, builder style.
    #[must_use]
    pub fn with_response(mut self, response: Envelope) -> Self {
        self.response = Some(response);
        self
    }

    /// The envelope of the request that produced this collection.
    #[must_use]
    pub const fn response(&self) -> Option<&Envelope> {
        self.response.as_ref()
    }

    /// Replaces the envelope.
    pub fn set_response(&mut self, response: Envelope) {
        self.response = Some(response);
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Number of elements.
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// `true` when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Mutable element at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Element at `index`, counting from the end when negative.
    #[must_use]
    pub fn at(&self, index: isize) -> Option<&T> {
        let index = if index < 0 {
            self.items.len().checked_sub(index.unsigned_abs())?
        } else {
            index.unsigned_abs()
        };
        self.items.get(index)
    }

    /// Replaces the element at `index` and returns the old one.
    ///
    /// An index at or past the end appends instead and returns `None`.
    pub fn set(&mut self, index: usize, value: T) -> Option<T> {
        if let Some(slot) = self.items.get_mut(index) {
            Some(std::mem::replace(slot, value))
        } else {
            self.items.push(value);
            None
        }
    }

    /// First element.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    /// Last element.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates mutably over the elements.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Consumes the collection into its elements.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Appends an element and returns the new length.
    pub fn push(&mut self, value: T) -> usize {
        self.items.push(value);
        self.items.len()
    }

    /// Removes the last element.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Removes the first element.
    pub fn shift(&mut self) -> Option<T> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Prepends an element and returns the new length.
    pub fn unshift(&mut self, value: T) -> usize {
        self.items.insert(0, value);
        self.items.len()
    }

    /// Removes `delete_count` elements from `start` (to the end when `None`),
    /// inserts `items` in their place and returns the removed elements.
    pub fn splice(&mut self, start: usize, delete_count: Option<usize>, items: Vec<T>) -> Self {
        let start = start.min(self.items.len());
        let end = delete_count.map_or(self.items.len(), |n| start.saturating_add(n).min(self.items.len()));
        Self::from(self.items.splice(start..end, items).collect::<Vec<_>>())
    }

    /// Sorts in place with a comparator.
    pub fn sort_by<F>(&mut self, compare: F) -> &mut Self
    where
        F: FnMut(&T, &T) -> std::cmp::Ordering,
    {
        self.items.sort_by(compare);
        self
    }

    /// Reverses in place.
    pub fn reverse(&mut self) -> &mut Self {
        self.items.reverse();
        self
    }

    /// Removes the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Index of the first element matching `predicate`.
    pub fn find_index<F: FnMut(&T) -> bool>(&self, predicate: F) -> Option<usize> {
        self.items.iter().position(predicate)
    }

    /// First element matching `predicate`.
    pub fn find<F: FnMut(&&T) -> bool>(&self, predicate: F) -> Option<&T> {
        self.items.iter().find(predicate)
    }

    /// Whether every element matches.
    pub fn every<F: FnMut(&T) -> bool>(&self, predicate: F) -> bool {
        self.items.iter().all(predicate)
    }

    /// Whether any element matches.
    pub fn some<F: FnMut(&T) -> bool>(&self, predicate: F) -> bool {
        self.items.iter().any(predicate)
    }

    /// Calls `f` on each element with its index.
    pub fn for_each<F: FnMut(&T, usize)>(&self, mut f: F) {
        for (index, item) in self.items.iter().enumerate() {
            f(item, index);
        }
    }

    /// Maps each element into a new collection.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Collection<U> {
        Collection::from(self.items.iter().map(f).collect::<Vec<_>>())
    }

    /// Folds from the front.
    pub fn reduce<A, F: FnMut(A, &T, usize) -> A>(&self, init: A, mut f: F) -> A {
        self.items
            .iter()
            .enumerate()
            .fold(init, |acc, (index, item)| f(acc, item, index))
    }

    /// Folds from the back.
    pub fn reduce_right<A, F: FnMut(A, &T, usize) -> A>(&self, init: A, mut f: F) -> A {
        self.items
            .iter()
            .enumerate()
            .rev()
            .fold(init, |acc, (index, item)| f(acc, item, index))
    }
}

impl<T: Clone> Collection<T> {
    /// Copies the elements out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }

    /// Elements in `start..end` (to the end when `None`), clamped.
    #[must_use]
    pub fn slice(&self, start: usize, end: Option<usize>) -> Self {
        let len = self.items.len();
        let end = end.unwrap_or(len).min(len);
        let start = start.min(end);
        Self::from(self.items[start..end].to_vec())
    }

    /// This collection followed by `other`.
    #[must_use]
    pub fn concat<I: IntoIterator<Item = T>>(&self, other: I) -> Self {
        let mut items = self.items.clone();
        items.extend(other);
        Self::from(items)
    }

    /// Elements matching `predicate`.
    pub fn filter<F: FnMut(&T) -> bool>(&self, mut predicate: F) -> Self {
        Self::from(
            self.items
                .iter()
                .filter(|item| predicate(item))
                .cloned()
                .collect::<Vec<_>>(),
        )
    }
}

impl<T: PartialEq> Collection<T> {
    /// Index of the first element equal to `element`.
    pub fn index_of(&self, element: &T) -> Option<usize> {
        self.items.iter().position(|item| item == element)
    }

    /// Index of the last element equal to `element`.
    pub fn last_index_of(&self, element: &T) -> Option<usize> {
        self.items.iter().rposition(|item| item == element)
    }

    /// Whether an element equal to `element` is present.
    pub fn includes(&self, element: &T) -> bool {
        self.items.contains(element)
    }
}

impl<T: Item> Collection<T> {
    fn all_records(&self) -> bool {
        self.items.iter().all(Item::is_record)
    }

    /// The elements as plain JSON.
    #[must_use]
    pub fn plain(&self) -> Collection<Value> {
        self.map(Item::to_value)
    }

    /// Projects keyed elements onto `keys`. Missing fields become `null`.
    ///
    /// Scalar elements are copied unchanged with a warning.
    #[must_use]
    pub fn select(&self, keys: &[&str]) -> Collection<Value> {
        if keys.is_empty() {
            return self.plain();
        }
        if !self.all_records() {
            warn!("Collection::select is only available for collections of records");
            return self.plain();
        }
        self.map(|item| {
            let projected: Map<String, Value> = keys
                .iter()
                .map(|key| ((*key).to_owned(), item.field(key).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(projected)
        })
    }

    /// The value of `key` for each element, `null` where absent.
    #[must_use]
    pub fn vertical(&self, key: &str) -> Collection<Value> {
        self.map(|item| item.field(key).cloned().unwrap_or(Value::Null))
    }

    /// Keeps the first element for each distinct value of `key`.
    ///
    /// When a formatter is given, each kept element's field is rewritten with
    /// the formatted value and comparison uses that value. The receiver is
    /// left untouched. Scalar elements are copied unchanged with a warning.
    #[must_use]
    pub fn distinct_by(&self, key: &str, formatter: Option<ValueFormatter<'_>>) -> Self {
        if !self.all_records() {
            warn!(
                "Collection::distinct_by is only available for collections of records; \
                 use distinct() or unique() for scalars"
            );
            return Self::from(self.items.clone());
        }
        let mut seen: Vec<Value> = Vec::new();
        let mut kept = Vec::new();
        for item in &self.items {
            let mut item = item.clone();
            let mut value = item.field(key).cloned().unwrap_or(Value::Null);
            if let Some(formatter) = formatter {
                value = formatter(&value);
                item.set_field(key, value.clone());
            }
            if !seen.contains(&value) {
                seen.push(value);
                kept.push(item);
            }
        }
        Self::from(kept)
    }

    /// `{value, label}` objects for a select box.
    ///
    /// The label is `label_key`'s value, passed through `formatter` when
    /// given. With `concat = Some((column, prefix))` the label becomes text
    /// and ` (<prefix> <column value>)` is appended whenever that value is
    /// truthy. Scalar elements are copied unchanged with a warning.
    #[must_use]
    pub fn to_select_options(
        &self,
        value_key: &str,
        label_key: &str,
        formatter: Option<ValueFormatter<'_>>,
        concat: Option<(&str, &str)>,
    ) -> Collection<Value> {
        if !self.all_records() {
            warn!("Collection::to_select_options is only available for collections of records");
            return self.plain();
        }
        self.map(|item| {
            let raw = item.field(label_key).cloned().unwrap_or(Value::Null);
            let mut label = formatter.map_or_else(|| raw.clone(), |format| format(&raw));
            if let Some((column, prefix)) = concat {
                let mut text = display(&label);
                if let Some(extra) = item.field(column).filter(|v| truthy(v)) {
                    let extra = display(extra);
                    if prefix.is_empty() {
                        text.push_str(&format!(" ({extra})"));
                    } else {
                        text.push_str(&format!(" ({prefix} {extra})"));
                    }
                }
                label = Value::String(text);
            }
            let mut option = Map::new();
            option.insert(
                String::from("value"),
                item.field(value_key).cloned().unwrap_or(Value::Null),
            );
            option.insert(String::from("label"), label);
            Value::Object(option)
        })
    }
}

impl<T: Item + PartialEq> Collection<T> {
    /// Drops duplicates, keeping first occurrences in order.
    #[must_use]
    pub fn distinct(&self) -> Self {
        let mut kept: Vec<T> = Vec::new();
        for item in &self.items {
            if !kept.contains(item) {
                kept.push(item.clone());
            }
        }
        Self::from(kept)
    }

    /// Like [`distinct`](Self::distinct), for scalar collections only.
    ///
    /// A collection of records is copied unchanged with a warning.
    #[must_use]
    pub fn unique(&self) -> Self {
        if !self.items.is_empty() && self.all_records() {
            warn!("Collection::unique is only available for collections of scalars");
            return Self::from(self.items.clone());
        }
        self.distinct()
    }

    /// Removes `element` in place.
    ///
    /// Records match on `id` when `element` has a non-null `id`, otherwise
    /// on structural equality; only the first match goes unless
    /// `options.all`. Scalars are removed until none is left.
    pub fn remove(&mut self, element: &T, options: RemoveOptions) -> &mut Self {
        if element.is_record() {
            let id = element.field("id").filter(|id| !id.is_null()).cloned();
            let target = element.to_value();
            let matches = |candidate: &T| match &id {
                Some(id) => candidate.field("id") == Some(id),
                None => candidate.to_value() == target,
            };
            while let Some(index) = self.items.iter().position(&matches) {
                self.items.remove(index);
                if !options.all {
                    break;
                }
            }
        } else {
            self.items.retain(|item| item != element);
        }
        self
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > f64::EPSILON),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            items,
            response: None,
        }
    }
}

impl<T> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<T> Extend<T> for Collection<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> Index<usize> for Collection<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for Collection<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.items[index]
    }
}
