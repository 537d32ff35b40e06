//! Attribute casting.
//!
//! A model declares a [`CastTable`]: for each listed column, raw values
//! coming from the store pass through a caster and then, optionally, a
//! formatter. Columns without an entry are left untouched.
//!
//! ```
//! use oxide_record::cast::{casters, formatters, CastTable};
//! use oxide_record::Row;
//! use serde_json::json;
//!
//! let casts = CastTable::new()
//!     .cast("views", casters::integer())
//!     .cast_formatted("title", casters::text(), formatters::uppercase());
//!
//! let mut row = Row::new();
//! row.insert("views".into(), json!("42"));
//! row.insert("title".into(), json!("hello"));
//! let row = casts.apply(row);
//! assert_eq!(row["views"], json!(42));
//! assert_eq!(row["title"], json!("HELLO"));
//! ```

use std::fmt;
use std::sync::Arc;

use oxide_rest::Row;
use serde_json::Value;

/// Converts a raw value into its typed representation.
pub type Caster = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Post-processes a cast value.
pub type Formatter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// One cast declaration.
#[derive(Clone)]
pub struct CastEntry {
    /// Column the cast applies to.
    pub column: String,
    caster: Caster,
    formatter: Option<Formatter>,
}

impl CastEntry {
    /// Casts then formats `value`.
    #[must_use]
    pub fn run(&self, value: Value) -> Value {
        let value = (self.caster)(value);
        match &self.formatter {
            Some(formatter) => formatter(value),
            None => value,
        }
    }

    /// Whether a formatter follows the caster.
    #[must_use]
    pub const fn has_formatter(&self) -> bool {
        self.formatter.is_some()
    }
}

impl fmt::Debug for CastEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastEntry")
            .field("column", &self.column)
            .field("formatter", &self.formatter.is_some())
            .finish_non_exhaustive()
    }
}

/// The cast declarations of a model.
#[derive(Debug, Clone, Default)]
pub struct CastTable {
    entries: Vec<CastEntry>,
}

impl CastTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a caster for `column`.
    #[must_use]
    pub fn cast(self, column: &str, caster: Caster) -> Self {
        self.push(column, caster, None)
    }

    /// Declares a caster followed by a formatter for `column`.
    #[must_use]
    pub fn cast_formatted(self, column: &str, caster: Caster, formatter: Formatter) -> Self {
        self.push(column, caster, Some(formatter))
    }

    fn push(mut self, column: &str, caster: Caster, formatter: Option<Formatter>) -> Self {
        self.entries.retain(|e| e.column != column);
        self.entries.push(CastEntry {
            column: column.to_owned(),
            caster,
            formatter,
        });
        self
    }

    /// The entry for `column`, if declared.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CastEntry> {
        self.entries.iter().find(|e| e.column == column)
    }

    /// Declared entries, in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[CastEntry] {
        &self.entries
    }

    /// `true` when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Casts one value of `column`.
    #[must_use]
    pub fn cast_value(&self, column: &str, value: Value) -> Value {
        match self.get(column) {
            Some(entry) => entry.run(value),
            None => value,
        }
    }

    /// Casts every declared column present in `row`.
    #[must_use]
    pub fn apply(&self, mut row: Row) -> Row {
        for entry in &self.entries {
            if let Some(value) = row.get_mut(&entry.column) {
                *value = entry.run(value.take());
            }
        }
        row
    }
}

/// Parses the boolean spellings Postgres and humans use.
///
/// Returns `None` for anything outside the two token sets.
#[must_use]
pub fn parse_bool(token: &str) -> Option<bool> {
    match token {
        "true" | "t" | "yes" | "y" | "1" | "Y" | "YES" | "T" | "True" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "N" | "NO" | "F" | "False" => Some(false),
        _ => None,
    }
}

/// Built-in casters. `null` always stays `null`.
pub mod casters {
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde_json::Value;

    use super::{parse_bool, Caster};

    /// Integers. Floats are truncated, numeric strings parsed, booleans
    /// become 0 or 1.
    #[must_use]
    pub fn integer() -> Caster {
        Arc::new(|value: Value| match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Value::Number(n),
            Value::Number(n) => n.as_f64().map_or(Value::Number(n), truncate),
            Value::String(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .map(Value::from)
                    .or_else(|_| trimmed.parse::<f64>().map(truncate))
                    .unwrap_or(Value::String(s))
            }
            Value::Bool(b) => Value::from(i64::from(b)),
            other => other,
        })
    }

    /// Floating point numbers.
    #[must_use]
    pub fn float() -> Caster {
        Arc::new(|value: Value| match value {
            Value::Number(n) => n.as_f64().map_or(Value::Number(n), Value::from),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_or(Value::String(s), Value::from),
            Value::Bool(b) => Value::from(if b { 1.0 } else { 0.0 }),
            other => other,
        })
    }

    /// Booleans from numbers and the usual string spellings.
    #[must_use]
    pub fn boolean() -> Caster {
        Arc::new(|value: Value| match value {
            Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f.abs() > f64::EPSILON)),
            Value::String(s) => parse_bool(s.trim()).map_or(Value::String(s), Value::Bool),
            other => other,
        })
    }

    /// Strings. Non-string scalars are rendered as JSON text.
    #[must_use]
    pub fn text() -> Caster {
        Arc::new(|value: Value| match value {
            Value::String(_) | Value::Null => value,
            other => Value::String(other.to_string()),
        })
    }

    /// Datetimes, normalized to RFC 3339 UTC.
    ///
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DD` and Unix
    /// seconds. Unparseable values are returned unchanged.
    #[must_use]
    pub fn datetime() -> Caster {
        Arc::new(|value: Value| {
            parse_datetime(&value).map_or(value, |dt| {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            })
        })
    }

    /// JSON stored as text.
    #[must_use]
    pub fn json() -> Caster {
        Arc::new(|value: Value| match value {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            other => other,
        })
    }

    pub(crate) fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => {
                let s = s.trim();
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
                    .or_else(|| {
                        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                            .ok()
                            .map(|naive| naive.and_utc())
                    })
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .ok()
                            .and_then(|date| date.and_hms_opt(0, 0, 0))
                            .map(|naive| naive.and_utc())
                    })
            }
            Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
            _ => None,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn truncate(f: f64) -> Value {
        if f.is_finite() {
            Value::from(f.trunc() as i64)
        } else {
            Value::Null
        }
    }
}

/// Built-in formatters.
pub mod formatters {
    use std::sync::Arc;

    use serde_json::Value;

    use super::casters::parse_datetime;
    use super::Formatter;

    /// Formats a datetime with a chrono `strftime` pattern.
    #[must_use]
    pub fn date_format(pattern: &str) -> Formatter {
        let pattern = pattern.to_owned();
        Arc::new(move |value: Value| {
            parse_datetime(&value).map_or(value, |dt| Value::String(dt.format(&pattern).to_string()))
        })
    }

    /// Uppercases strings.
    #[must_use]
    pub fn uppercase() -> Formatter {
        Arc::new(|value: Value| match value {
            Value::String(s) => Value::String(s.to_uppercase()),
            other => other,
        })
    }

    /// Lowercases strings.
    #[must_use]
    pub fn lowercase() -> Formatter {
        Arc::new(|value: Value| match value {
            Value::String(s) => Value::String(s.to_lowercase()),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_undeclared_columns_untouched() {
        let casts = CastTable::new().cast("n", casters::integer());
        let out = casts.apply(row(json!({"n": "7", "m": "7"})));
        assert_eq!(out["n"], json!(7));
        assert_eq!(out["m"], json!("7"));
    }

    #[test]
    fn test_integer_and_float() {
        let int = casters::integer();
        assert_eq!(int(json!("12")), json!(12));
        assert_eq!(int(json!(" 3.9 ")), json!(3));
        assert_eq!(int(json!(-2.5)), json!(-2));
        assert_eq!(int(json!(true)), json!(1));
        assert_eq!(int(json!("abc")), json!("abc"));
        assert_eq!(int(Value::Null), Value::Null);

        let float = casters::float();
        assert_eq!(float(json!("1.5")), json!(1.5));
        assert_eq!(float(json!(2)), json!(2.0));
    }

    #[test]
    fn test_boolean() {
        let boolean = casters::boolean();
        assert_eq!(boolean(json!("YES")), json!(true));
        assert_eq!(boolean(json!("f")), json!(false));
        assert_eq!(boolean(json!(0)), json!(false));
        assert_eq!(boolean(json!("maybe")), json!("maybe"));
    }

    #[test]
    fn test_text_and_json() {
        assert_eq!(casters::text()(json!(5)), json!("5"));
        assert_eq!(casters::json()(json!("{\"a\":1}")), json!({"a": 1}));
        assert_eq!(casters::json()(json!("not json")), json!("not json"));
    }

    #[test]
    fn test_datetime_normalization() {
        let dt = casters::datetime();
        assert_eq!(dt(json!("2024-03-01 10:20:30")), json!("2024-03-01T10:20:30Z"));
        assert_eq!(dt(json!("2024-03-01T12:00:00+02:00")), json!("2024-03-01T10:00:00Z"));
        assert_eq!(dt(json!("2024-03-01")), json!("2024-03-01T00:00:00Z"));
        assert_eq!(dt(json!(0)), json!("1970-01-01T00:00:00Z"));
        assert_eq!(dt(json!("soon")), json!("soon"));
    }

    #[test]
    fn test_formatter_runs_after_caster() {
        let casts = CastTable::new().cast_formatted(
            "published_at",
            casters::datetime(),
            formatters::date_format("%d/%m/%Y"),
        );
        let out = casts.apply(row(json!({"published_at": "2024-03-01 10:20:30"})));
        assert_eq!(out["published_at"], json!("01/03/2024"));
        assert!(casts.get("published_at").unwrap().has_formatter());
    }

    #[test]
    fn test_redeclaring_replaces_entry() {
        let casts = CastTable::new()
            .cast("n", casters::integer())
            .cast("n", casters::text());
        assert_eq!(casts.entries().len(), 1);
        assert_eq!(casts.cast_value("n", json!(1)), json!("1"));
    }

    #[test]
    fn test_parse_bool_tokens() {
        for token in ["true", "t", "yes", "y", "1", "Y", "YES", "T", "True"] {
            assert_eq!(parse_bool(token), Some(true));
        }
        for token in ["false", "f", "no", "n", "0", "N", "NO", "F", "False"] {
            assert_eq!(parse_bool(token), Some(false));
        }
        assert_eq!(parse_bool("TRUE"), None);
        assert_eq!(parse_bool(""), None);
    }
}
