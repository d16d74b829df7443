/// Native typed values
///
/// `Value` is what model code reads and writes. The serializer maps it onto the
/// wire [`AttributeValue`](crate::AttributeValue) and back.

use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use uuid::Uuid;

/// A field-name keyed map of native values, the plain form of an item.
pub type Document = BTreeMap<String, Value>;

/// Numeric value
///
/// `Decimal` holds exact decimal text for numbers that do not fit the other
/// two representations, such as integers wider than 64 bits.
#[derive(Debug, Clone)]
pub enum Number {
    Int(i64),
    Float(f64),
    Decimal(String),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
            Number::Decimal(s) => s.parse().unwrap_or(f64::NAN),
        }
    }

    /// Decimal text for this number, `None` when it has no decimal form (NaN, infinities).
    pub fn to_decimal_text(&self) -> Option<String> {
        match self {
            Number::Int(i) => Some(i.to_string()),
            Number::Float(f) if f.is_finite() => Some(format!("{}", f)),
            Number::Float(_) => None,
            Number::Decimal(s) => Some(s.clone()),
        }
    }

    fn canonical(&self) -> String {
        self.to_decimal_text().unwrap_or_else(|| format!("{}", self.as_f64()))
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            _ => self
                .as_f64()
                .total_cmp(&other.as_f64())
                .then_with(|| self.canonical().cmp(&other.canonical())),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// Native typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    Str(String),
    Bytes(Bytes),
    /// Offset-aware timestamp
    DateTime(DateTime<FixedOffset>),
    /// Timestamp without offset
    NaiveDateTime(NaiveDateTime),
    Date(NaiveDate),
    Uuid(Uuid),
    StrSet(BTreeSet<String>),
    NumSet(BTreeSet<Number>),
    BinSet(BTreeSet<Bytes>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn int(v: i64) -> Self {
        Value::Number(Number::Int(v))
    }

    pub fn float(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }

    pub fn decimal(text: impl Into<String>) -> Self {
        Value::Number(Number::Decimal(text.into()))
    }

    pub fn str_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::StrSet(items.into_iter().map(Into::into).collect())
    }

    pub fn num_set<I, N>(items: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Number>,
    {
        Value::NumSet(items.into_iter().map(Into::into).collect())
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(Number::Int(_)) => "int",
            Value::Number(Number::Float(_)) => "float",
            Value::Number(Number::Decimal(_)) => "decimal",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) | Value::NaiveDateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Uuid(_) => "uuid",
            Value::StrSet(_) | Value::NumSet(_) | Value::BinSet(_) => "set",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Value::StrSet(_) | Value::NumSet(_) | Value::BinSet(_))
    }

    /// True for null and for empty strings, the values a key lookup treats as absent.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(Number::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Converts an untyped JSON value, as received from an external caller.
    ///
    /// Integers that fit 64 bits become `Int`, other numbers become `Float`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::int(i),
                None => Value::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::int(v as i64)
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::int(i),
            Err(_) => Value::decimal(v.to_string()),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        // through text, so 0.1f32 stays 0.1 rather than its f64 widening
        Value::float(format!("{}", v).parse().unwrap_or(v as f64))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Number> for Value {
    fn from(v: Number) -> Self {
        Value::Number(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::NaiveDateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<BTreeSet<String>> for Value {
    fn from(v: BTreeSet<String>) -> Self {
        Value::StrSet(v)
    }
}

impl From<HashSet<String>> for Value {
    fn from(v: HashSet<String>) -> Self {
        Value::StrSet(v.into_iter().collect())
    }
}

impl From<BTreeSet<i64>> for Value {
    fn from(v: BTreeSet<i64>) -> Self {
        Value::NumSet(v.into_iter().map(Number::Int).collect())
    }
}

impl From<BTreeSet<Bytes>> for Value {
    fn from(v: BTreeSet<Bytes>) -> Self {
        Value::BinSet(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Conversion out of a [`Value`], with the lax coercions model fields expect
/// (numeric text to numbers, ISO text to timestamps, lists to sets).
pub trait FromValue: Sized {
    fn from_value(value: Value) -> std::result::Result<Self, String>;
}

fn expected(what: &str, got: &Value) -> String {
    format!("expected {}, got {}", what, got.type_name())
}

impl FromValue for Value {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(expected("str", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Number(Number::Int(0)) => Ok(false),
            Value::Number(Number::Int(1)) => Ok(true),
            Value::Str(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(format!("'{}' is not a valid boolean", s)),
            },
            other => Err(expected("bool", &other)),
        }
    }
}

/// True when `f` converts to `i64` without saturating.
pub(crate) fn fits_i64(f: f64) -> bool {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    (i64::MIN as f64..i64::MAX as f64).contains(&f)
}

impl FromValue for i64 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Number(Number::Int(i)) => Ok(i),
            Value::Number(Number::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                if fits_i64(f) {
                    Ok(f as i64)
                } else {
                    Err(format!("{} is out of range for a 64-bit integer", f))
                }
            }
            Value::Number(Number::Decimal(s)) | Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("'{}' is not a valid integer", s)),
            other => Err(expected("int", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| format!("{} is out of range for a 32-bit integer", wide))
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| format!("{} is out of range for an unsigned integer", wide))
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Number(Number::Decimal(s)) => s
                .parse::<u64>()
                .map_err(|_| format!("'{}' is not a valid unsigned integer", s)),
            other => {
                let wide = i64::from_value(other)?;
                u64::try_from(wide).map_err(|_| format!("{} is negative", wide))
            }
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Number(n) => Ok(n.as_f64()),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a valid number", s)),
            other => Err(expected("float", &other)),
        }
    }
}

impl FromValue for Number {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(expected("number", &other)),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Str(s) => Ok(Bytes::from(s.into_bytes())),
            other => Err(expected("bytes", &other)),
        }
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::Str(s) => DateTime::parse_from_rfc3339(&s)
                .map_err(|e| format!("'{}' is not a valid datetime: {}", s, e)),
            other => Err(expected("datetime", &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        DateTime::<FixedOffset>::from_value(value).map(|dt| dt.with_timezone(&Utc))
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::NaiveDateTime(dt) => Ok(dt),
            Value::Str(s) => NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                .map_err(|e| format!("'{}' is not a valid datetime: {}", s, e)),
            other => Err(expected("datetime", &other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Date(d) => Ok(d),
            Value::Str(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| format!("'{}' is not a valid date: {}", s, e)),
            other => Err(expected("date", &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::Str(s) => Uuid::parse_str(&s).map_err(|e| format!("'{}' is not a valid UUID: {}", s, e)),
            other => Err(expected("uuid", &other)),
        }
    }
}

impl FromValue for BTreeSet<String> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::StrSet(s) => Ok(s),
            Value::List(items) => items.into_iter().map(String::from_value).collect(),
            other => Err(expected("set of str", &other)),
        }
    }
}

impl FromValue for HashSet<String> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        BTreeSet::<String>::from_value(value).map(|s| s.into_iter().collect())
    }
}

impl FromValue for BTreeSet<i64> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::NumSet(s) => s.into_iter().map(|n| i64::from_value(Value::Number(n))).collect(),
            Value::List(items) => items.into_iter().map(i64::from_value).collect(),
            other => Err(expected("set of int", &other)),
        }
    }
}

impl FromValue for BTreeMap<String, Value> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Map(m) => Ok(m),
            other => Err(expected("dict", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(expected("list", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Typed access to the fields of a [`Document`].
pub trait DocumentExt {
    /// Removes and converts a field that must be present.
    fn take<T: FromValue>(&mut self, field: &str) -> Result<T>;

    /// Removes and converts a field that may be absent or null.
    fn take_opt<T: FromValue>(&mut self, field: &str) -> Result<Option<T>>;

    /// Inserts a field, converting the value.
    fn put(&mut self, field: &str, value: impl Into<Value>);
}

impl DocumentExt for Document {
    fn take<T: FromValue>(&mut self, field: &str) -> Result<T> {
        let value = self
            .remove(field)
            .ok_or_else(|| Error::validation(field, format!("Validation failed for field '{}': Field required", field)))?;
        T::from_value(value)
            .map_err(|reason| Error::validation(field, format!("Validation failed for field '{}': {}", field, reason)))
    }

    fn take_opt<T: FromValue>(&mut self, field: &str) -> Result<Option<T>> {
        match self.remove(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some).map_err(|reason| {
                Error::validation(field, format!("Validation failed for field '{}': {}", field, reason))
            }),
        }
    }

    fn put(&mut self, field: &str, value: impl Into<Value>) {
        self.insert(field.to_string(), value.into());
    }
}
