use base64::Engine;
use bytes::Bytes;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Wire value: the store's tagged union of attribute types.
///
/// Numbers are carried as decimal text so no precision is lost in transit.
/// Serde uses the DynamoDB JSON shape, e.g. `{"S": "hello"}`, with binary
/// payloads base64 encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String
    S(String),
    /// Number (decimal text)
    N(String),
    /// Binary
    B(Bytes),
    /// String set
    Ss(Vec<String>),
    /// Number set
    Ns(Vec<String>),
    /// Binary set
    Bs(Vec<Bytes>),
    /// Boolean
    Bool(bool),
    /// Null
    Null(bool),
    /// List
    L(Vec<AttributeValue>),
    /// Map
    M(HashMap<String, AttributeValue>),
}

/// Item - a map of attribute names to wire values
pub type Item = HashMap<String, AttributeValue>;

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        AttributeValue::S(s.into())
    }

    pub fn number(n: impl ToString) -> Self {
        AttributeValue::N(n.to_string())
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        AttributeValue::B(b.into())
    }

    pub fn null() -> Self {
        AttributeValue::Null(true)
    }

    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(true))
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Ss(_) | Self::Ns(_) | Self::Bs(_))
    }

    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{{S: {s}}}"),
            Self::N(n) => write!(f, "{{N: {n}}}"),
            Self::B(b) => write!(f, "{{B: {} bytes}}", b.len()),
            Self::Ss(v) => write!(f, "{{SS: {v:?}}}"),
            Self::Ns(v) => write!(f, "{{NS: {v:?}}}"),
            Self::Bs(v) => write!(f, "{{BS: {} items}}", v.len()),
            Self::Bool(b) => write!(f, "{{BOOL: {b}}}"),
            Self::Null(b) => write!(f, "{{NULL: {b}}}"),
            Self::L(v) => write!(f, "{{L: {} items}}", v.len()),
            Self::M(m) => write!(f, "{{M: {} keys}}", m.len()),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let engine = &base64::engine::general_purpose::STANDARD;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::S(s) => map.serialize_entry("S", s)?,
            Self::N(n) => map.serialize_entry("N", n)?,
            Self::B(b) => map.serialize_entry("B", &engine.encode(b))?,
            Self::Ss(v) => map.serialize_entry("SS", v)?,
            Self::Ns(v) => map.serialize_entry("NS", v)?,
            Self::Bs(v) => {
                let encoded: Vec<String> = v.iter().map(|b| engine.encode(b)).collect();
                map.serialize_entry("BS", &encoded)?;
            }
            Self::Bool(b) => map.serialize_entry("BOOL", b)?,
            Self::Null(b) => map.serialize_entry("NULL", b)?,
            Self::L(list) => map.serialize_entry("L", list)?,
            Self::M(m) => map.serialize_entry("M", m)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributeValueVisitor)
    }
}

struct AttributeValueVisitor;

impl<'de> Visitor<'de> for AttributeValueVisitor {
    type Value = AttributeValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an attribute value object with exactly one type key")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        let engine = &base64::engine::general_purpose::STANDARD;
        let Some(key) = map.next_key::<String>()? else {
            return Err(de::Error::custom("attribute value must have exactly one key"));
        };

        let value = match key.as_str() {
            "S" => AttributeValue::S(map.next_value()?),
            "N" => AttributeValue::N(map.next_value()?),
            "B" => {
                let encoded: String = map.next_value()?;
                let decoded = engine.decode(&encoded).map_err(de::Error::custom)?;
                AttributeValue::B(Bytes::from(decoded))
            }
            "SS" => AttributeValue::Ss(map.next_value()?),
            "NS" => AttributeValue::Ns(map.next_value()?),
            "BS" => {
                let encoded: Vec<String> = map.next_value()?;
                let decoded = encoded
                    .iter()
                    .map(|e| engine.decode(e).map(Bytes::from))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(de::Error::custom)?;
                AttributeValue::Bs(decoded)
            }
            "BOOL" => AttributeValue::Bool(map.next_value()?),
            "NULL" => AttributeValue::Null(map.next_value()?),
            "L" => AttributeValue::L(map.next_value()?),
            "M" => AttributeValue::M(map.next_value()?),
            other => {
                return Err(de::Error::unknown_field(
                    other,
                    &["S", "N", "B", "SS", "NS", "BS", "BOOL", "NULL", "L", "M"],
                ));
            }
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_helpers() {
        assert_eq!(AttributeValue::string("a").as_s(), Some("a"));
        assert_eq!(AttributeValue::number(42).as_n(), Some("42"));
        assert!(AttributeValue::null().is_null());
        assert!(AttributeValue::Ss(vec!["x".into()]).is_set());
        assert_eq!(AttributeValue::Bs(vec![]).type_descriptor(), "BS");
    }

    #[test]
    fn test_serialize_wire_json() {
        let val = AttributeValue::L(vec![
            AttributeValue::S("a".to_owned()),
            AttributeValue::N("1".to_owned()),
        ]);
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, r#"{"L":[{"S":"a"},{"N":"1"}]}"#);
    }

    #[test]
    fn test_binary_is_base64() {
        let val = AttributeValue::B(Bytes::from_static(b"hi"));
        assert_eq!(serde_json::to_string(&val).unwrap(), r#"{"B":"aGk="}"#);
        let back: AttributeValue = serde_json::from_str(r#"{"BS":["aGk="]}"#).unwrap();
        assert_eq!(back, AttributeValue::Bs(vec![Bytes::from_static(b"hi")]));
    }

    #[test]
    fn test_map_roundtrip() {
        let mut m = HashMap::new();
        m.insert("key".to_owned(), AttributeValue::S("value".to_owned()));
        m.insert("n".to_owned(), AttributeValue::Null(true));
        let val = AttributeValue::M(m);
        let json = serde_json::to_string(&val).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(val, back);
    }

    #[test]
    fn test_reject_unknown_type_key() {
        let result: Result<AttributeValue, _> = serde_json::from_str(r#"{"X":"1"}"#);
        assert!(result.is_err());
    }
}
