//! Response envelope returned by every DataStore call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// One row as returned by the store: an ordered column → value map.
pub type Row = serde_json::Map<String, Value>;

/// The `{data, error, status, count}` result of a store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Payload: an array of rows, a single row object, or `null`.
    #[serde(default)]
    pub data: Value,
    /// Remote error, if the operation failed.
    #[serde(default)]
    pub error: Option<StoreError>,
    /// HTTP-style status code. `0` means the request never reached the store.
    #[serde(default)]
    pub status: u16,
    /// Exact row count, when the store reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl Envelope {
    /// A successful envelope carrying `data`.
    #[must_use]
    pub const fn ok(data: Value, status: u16) -> Self {
        Self {
            data,
            error: None,
            status,
            count: None,
        }
    }

    /// A failed envelope.
    #[must_use]
    pub const fn failure(error: StoreError, status: u16) -> Self {
        Self {
            data: Value::Null,
            error: Some(error),
            status,
            count: None,
        }
    }

    /// Sets the row count.
    #[must_use]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// `true` for a 2xx status without an error payload.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    /// The payload as a list of rows.
    ///
    /// An object payload yields one row, an array yields its object elements,
    /// anything else yields nothing.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        match &self.data {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
            Value::Object(row) => vec![row.clone()],
            _ => Vec::new(),
        }
    }

    /// The first row of the payload, if any.
    #[must_use]
    pub fn first_row(&self) -> Option<Row> {
        match &self.data {
            Value::Array(items) => items.iter().find_map(|item| item.as_object().cloned()),
            Value::Object(row) => Some(row.clone()),
            _ => None,
        }
    }

    /// Returns `true` when `value` has the shape of a serialized envelope.
    ///
    /// The object must contain `data` and no keys outside
    /// `data`, `error`, `status` and `count`.
    #[must_use]
    pub fn is_envelope_shaped(value: &Value) -> bool {
        value.as_object().is_some_and(|map| {
            map.contains_key("data")
                && map
                    .keys()
                    .all(|key| matches!(key.as_str(), "data" | "error" | "status" | "count"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_from_array_and_object() {
        let many = Envelope::ok(json!([{"id": 1}, {"id": 2}, 3]), 200);
        assert_eq!(many.rows().len(), 2);

        let one = Envelope::ok(json!({"id": 7}), 200);
        assert_eq!(one.rows().len(), 1);
        assert_eq!(one.first_row().unwrap()["id"], json!(7));

        let empty = Envelope::ok(Value::Null, 204);
        assert!(empty.rows().is_empty());
        assert!(empty.first_row().is_none());
    }

    #[test]
    fn test_is_success() {
        assert!(Envelope::ok(json!([]), 200).is_success());
        assert!(Envelope::ok(Value::Null, 204).is_success());
        assert!(!Envelope::failure(StoreError::new("PGRST116", "no rows"), 406).is_success());
        assert!(!Envelope::ok(Value::Null, 0).is_success());
    }

    #[test]
    fn test_envelope_shape_detection() {
        assert!(Envelope::is_envelope_shaped(
            &json!({"data": {"id": 1}, "error": null, "status": 200})
        ));
        assert!(!Envelope::is_envelope_shaped(&json!({"data": 1, "name": "x"})));
        assert!(!Envelope::is_envelope_shaped(&json!({"status": 200})));
        assert!(!Envelope::is_envelope_shaped(&json!([1, 2])));
    }

    #[test]
    fn test_deserialize_partial_envelope() {
        let env: Envelope = serde_json::from_value(json!({"data": [1], "status": 201})).unwrap();
        assert_eq!(env.status, 201);
        assert!(env.error.is_none());
        assert!(env.count.is_none());
    }
}
