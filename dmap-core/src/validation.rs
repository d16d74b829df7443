/// Declared field types and value coercion
///
/// A [`FieldType`] is what a model declares for each field. Update actions and
/// defaults are checked against it before anything is sent, with the same lax
/// coercions model decoding applies.

use crate::serializer::decode_number;
use crate::value::{fits_i64, FromValue, Number, Value};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Type of a model field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Str,
    Int,
    Float,
    /// Any numeric value, integers and decimals kept exact
    Number,
    Bool,
    Bytes,
    DateTime,
    Date,
    Uuid,
    StrSet,
    NumSet,
    BinSet,
    List(Box<FieldType>),
    Map,
    /// Accepts null in addition to the inner type
    Optional(Box<FieldType>),
    /// Accepts anything
    Any,
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> FieldType {
        FieldType::Optional(Box::new(inner))
    }

    pub fn list(inner: FieldType) -> FieldType {
        FieldType::List(Box::new(inner))
    }

    pub fn enumeration<I, S>(values: I) -> FieldType
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Coerces a value to this type, returning the reason on failure.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (FieldType::Any, value) => Ok(value),
            (FieldType::Optional(_), Value::Null) => Ok(Value::Null),
            (FieldType::Optional(inner), value) => inner.coerce(value),
            (_, Value::Null) => Err("Input should not be None".to_string()),

            (FieldType::Str, value) => String::from_value(value).map(Value::Str),
            (FieldType::Int, Value::Number(Number::Decimal(text))) => integer_from_decimal(&text),
            (FieldType::Int, Value::Number(Number::Float(f))) if f.is_finite() && f.fract() == 0.0 && !fits_i64(f) => {
                Ok(Value::Number(Number::Decimal(format!("{:.0}", f))))
            }
            (FieldType::Int, value) => i64::from_value(value).map(Value::int),
            (FieldType::Float, value) => f64::from_value(value).map(Value::float),
            (FieldType::Number, value) => coerce_number(value).map(Value::Number),
            (FieldType::Bool, value) => bool::from_value(value).map(Value::Bool),
            (FieldType::Bytes, value) => Bytes::from_value(value).map(Value::Bytes),
            (FieldType::DateTime, Value::NaiveDateTime(dt)) => Ok(Value::NaiveDateTime(dt)),
            (FieldType::DateTime, Value::Str(text)) => match DateTime::parse_from_rfc3339(&text) {
                Ok(dt) => Ok(Value::DateTime(dt)),
                Err(_) => NaiveDateTime::from_value(Value::Str(text)).map(Value::NaiveDateTime),
            },
            (FieldType::DateTime, value) => DateTime::<FixedOffset>::from_value(value).map(Value::DateTime),
            (FieldType::Date, value) => NaiveDate::from_value(value).map(Value::Date),
            (FieldType::Uuid, value) => Uuid::from_value(value).map(Value::Uuid),
            (FieldType::StrSet, value) => BTreeSet::<String>::from_value(value).map(Value::StrSet),
            (FieldType::NumSet, Value::NumSet(set)) => Ok(Value::NumSet(set)),
            (FieldType::NumSet, Value::List(items)) => items
                .into_iter()
                .map(coerce_number)
                .collect::<Result<BTreeSet<_>, _>>()
                .map(Value::NumSet),
            (FieldType::BinSet, Value::BinSet(set)) => Ok(Value::BinSet(set)),
            (FieldType::BinSet, Value::List(items)) => items
                .into_iter()
                .map(Bytes::from_value)
                .collect::<Result<BTreeSet<_>, _>>()
                .map(Value::BinSet),
            (FieldType::List(inner), Value::List(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| inner.coerce(item).map_err(|e| format!("item {}: {}", i, e)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (FieldType::Map, value) => BTreeMap::<String, Value>::from_value(value).map(Value::Map),
            (FieldType::Enum(allowed), Value::Str(s)) if allowed.contains(&s) => Ok(Value::Str(s)),
            (FieldType::Enum(allowed), _) => Err(format!(
                "Input should be {}",
                allowed
                    .iter()
                    .map(|a| format!("'{}'", a))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            (expected, value) => Err(format!("expected {}, got {}", expected.label(), value.type_name())),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldType::NumSet => "set of numbers",
            FieldType::BinSet => "set of bytes",
            FieldType::List(_) => "list",
            _ => "value",
        }
    }
}

// Whole decimals narrow to `Int`, or stay exact text beyond 64 bits.
fn integer_from_decimal(text: &str) -> Result<Value, String> {
    match decode_number(text, "<value>") {
        Ok(Number::Int(i)) => Ok(Value::int(i)),
        Ok(Number::Decimal(exact)) => Ok(Value::Number(Number::Decimal(exact))),
        _ => Err(format!("'{}' is not a valid integer", text)),
    }
}

fn coerce_number(value: Value) -> Result<Number, String> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Str(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Number::Int(i))
            } else if trimmed.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
                Ok(Number::Decimal(trimmed.to_string()))
            } else {
                Err(format!("'{}' is not a valid number", s))
            }
        }
        other => Err(format!("expected number, got {}", other.type_name())),
    }
}
