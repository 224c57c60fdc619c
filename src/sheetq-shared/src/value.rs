//! Cell value types for sheetq tables
//!
//! This module provides the `Value` enum that represents a single spreadsheet
//! cell, along with the comparison, ordering and JSON conversion rules every
//! table operation relies on.

use std::fmt;

use chrono::NaiveDateTime;
use polars::prelude::{AnyValue, TimeUnit};
use serde::{Serialize, Serializer};
use serde_json::{Number as JsonNumber, Value as JsonValue};

use crate::date::{datetime_from_epoch_days, datetime_from_timestamp, format_datetime};

/// A single cell in a table column
#[derive(Debug, Clone)]
pub enum Value {
    /// Missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (i64)
    Int(i64),
    /// Float value (f64)
    Float(f64),
    /// String value
    String(String),
    /// Date and time value
    Date(NaiveDateTime),
}

impl Value {
    /// Create a new string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Check if value is null
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is an integer or a float
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Get the type name of this value
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
        }
    }

    /// Numeric view of the value, if it has one
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of the value, if it is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a polars cell into a value
    ///
    /// Integer widths collapse to `Int`, both date layouts become `Date`.
    /// Types with no cell representation are kept as their display text.
    #[must_use]
    pub fn from_any_value(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => Value::Null,
            AnyValue::Boolean(b) => Value::Bool(b),
            AnyValue::String(s) => Value::string(s),
            AnyValue::StringOwned(s) => Value::string(s.as_str()),
            AnyValue::Int8(i) => Value::Int(i64::from(i)),
            AnyValue::Int16(i) => Value::Int(i64::from(i)),
            AnyValue::Int32(i) => Value::Int(i64::from(i)),
            AnyValue::Int64(i) => Value::Int(i),
            AnyValue::UInt8(i) => Value::Int(i64::from(i)),
            AnyValue::UInt16(i) => Value::Int(i64::from(i)),
            AnyValue::UInt32(i) => Value::Int(i64::from(i)),
            AnyValue::UInt64(i) => i64::try_from(i).map_or(Value::Float(i as f64), Value::Int),
            AnyValue::Float32(f) => Value::Float(f64::from(f)),
            AnyValue::Float64(f) => Value::Float(f),
            AnyValue::Date(days) => datetime_from_epoch_days(days).map_or(Value::Null, Value::Date),
            AnyValue::Datetime(ts, unit, _) | AnyValue::DatetimeOwned(ts, unit, _) => {
                datetime_from_timestamp(ts, unit).map_or(Value::Null, Value::Date)
            }
            other => Value::String(other.to_string()),
        }
    }

    /// Convert to a polars cell
    ///
    /// Dates are stored with microsecond precision.
    #[must_use]
    pub fn to_any_value(&self) -> AnyValue<'_> {
        match self {
            Value::Null => AnyValue::Null,
            Value::Bool(b) => AnyValue::Boolean(*b),
            Value::Int(i) => AnyValue::Int64(*i),
            Value::Float(f) => AnyValue::Float64(*f),
            Value::String(s) => AnyValue::String(s),
            Value::Date(d) => {
                AnyValue::Datetime(d.and_utc().timestamp_micros(), TimeUnit::Microseconds, None)
            }
        }
    }

    /// Convert a JSON value into a cell value
    ///
    /// Nested arrays and objects have no cell representation and are kept as
    /// their JSON text.
    #[must_use]
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            JsonValue::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    /// Convert to a JSON value
    ///
    /// Non-finite floats become `null`, dates become ISO-8601 text.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number(JsonNumber::from(*i)),
            Value::Float(f) => JsonNumber::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(format_datetime(d)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", format_datetime(d)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_none(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&format_datetime(d)),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
