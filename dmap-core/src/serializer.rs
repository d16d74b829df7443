/// Conversion between native values and wire values
///
/// Encoding rules:
/// - floats go through their shortest decimal text, never through binary expansion
/// - UTC timestamps end in `Z`, other offsets keep `+HH:MM`
/// - sets map to the native set types; an empty set is dropped from its map
/// - numbers decode to `Int` when they have no fractional part, else `Float`

use crate::error::{Error, Result};
use crate::types::{AttributeValue, Item};
use crate::value::{Document, Number, Value};
use base64::Engine;
use chrono::{DateTime, FixedOffset};

/// Encodes a document into a wire item.
///
/// Fields holding an empty set are left out of the result.
pub fn to_wire(doc: &Document) -> Result<Item> {
    let mut item = Item::with_capacity(doc.len());
    for (name, value) in doc {
        if let Some(encoded) = encode(value, name)? {
            item.insert(name.clone(), encoded);
        }
    }
    Ok(item)
}

/// Encodes one value, e.g. for an expression placeholder.
pub fn to_wire_value(value: &Value) -> Result<AttributeValue> {
    match encode(value, "<value>")? {
        Some(encoded) => Ok(encoded),
        None => Err(Error::serialization(
            None,
            format!("Failed to serialize value {:?}. error=empty sets cannot be sent", value),
        )),
    }
}

/// Decodes a wire item into a document.
pub fn from_wire(item: &Item) -> Result<Document> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), decode(value, name)?)))
        .collect()
}

/// Decodes one wire value.
pub fn from_wire_value(value: &AttributeValue) -> Result<Value> {
    decode(value, "<value>")
}

/// Converts a store cursor (last evaluated key) to plain values for hand-off.
pub fn serialize_cursor(last_evaluated_key: &Item) -> Result<Document> {
    from_wire(last_evaluated_key)
}

/// Converts a cursor received from outside back into a store key.
pub fn deserialize_cursor(cursor: &Document) -> Result<Item> {
    to_wire(cursor)
}

/// Packs a cursor into an opaque URL-safe token.
pub fn encode_cursor_token(cursor: &Document) -> Result<String> {
    let key = deserialize_cursor(cursor)?;
    let json = serde_json::to_vec(&key)
        .map_err(|e| Error::serialization(None, format!("Failed to encode cursor: {}", e)))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
}

/// Unpacks a token produced by [`encode_cursor_token`].
pub fn decode_cursor_token(token: &str) -> Result<Document> {
    let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| Error::serialization(None, format!("Invalid cursor token: {}", e)))?;
    let key: Item = serde_json::from_slice(&json)
        .map_err(|e| Error::serialization(None, format!("Invalid cursor token: {}", e)))?;
    serialize_cursor(&key)
}

fn failure(field: &str, value: &Value, reason: &str) -> Error {
    Error::serialization(
        Some(field),
        format!("Failed to serialize field '{}'. value={:?} error={}", field, value, reason),
    )
}

fn number_text(n: &Number, field: &str, value: &Value) -> Result<String> {
    let text = n
        .to_decimal_text()
        .ok_or_else(|| failure(field, value, "non-finite floats have no decimal form"))?;
    if parse_decimal(&text).is_none() {
        return Err(failure(field, value, "not a decimal number"));
    }
    Ok(text)
}

pub(crate) fn format_datetime(dt: &DateTime<FixedOffset>) -> String {
    if dt.offset().local_minus_utc() == 0 {
        format!("{}Z", dt.naive_local().format("%Y-%m-%dT%H:%M:%S%.f"))
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string()
    }
}

// None means "leave this entry out" (empty set)
fn encode(value: &Value, field: &str) -> Result<Option<AttributeValue>> {
    let encoded = match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(number_text(n, field, value)?),
        Value::Str(s) => AttributeValue::S(s.clone()),
        Value::Bytes(b) => AttributeValue::B(b.clone()),
        Value::DateTime(dt) => AttributeValue::S(format_datetime(dt)),
        Value::NaiveDateTime(dt) => AttributeValue::S(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Value::Date(d) => AttributeValue::S(d.format("%Y-%m-%d").to_string()),
        Value::Uuid(u) => AttributeValue::S(u.hyphenated().to_string()),
        Value::StrSet(set) if set.is_empty() => return Ok(None),
        Value::NumSet(set) if set.is_empty() => return Ok(None),
        Value::BinSet(set) if set.is_empty() => return Ok(None),
        Value::StrSet(set) => AttributeValue::Ss(set.iter().cloned().collect()),
        Value::NumSet(set) => AttributeValue::Ns(
            set.iter()
                .map(|n| number_text(n, field, value))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::BinSet(set) => AttributeValue::Bs(set.iter().cloned().collect()),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match encode(item, field)? {
                    Some(encoded) => out.push(encoded),
                    None => return Err(failure(field, value, "a list cannot hold an empty set")),
                }
            }
            AttributeValue::L(out)
        }
        Value::Map(entries) => {
            let mut out = Item::with_capacity(entries.len());
            for (key, entry) in entries {
                if let Some(encoded) = encode(entry, field)? {
                    out.insert(key.clone(), encoded);
                }
            }
            AttributeValue::M(out)
        }
    };
    Ok(Some(encoded))
}

fn decode(value: &AttributeValue, field: &str) -> Result<Value> {
    let decoded = match value {
        AttributeValue::S(s) => Value::Str(s.clone()),
        AttributeValue::N(n) => Value::Number(decode_number(n, field)?),
        AttributeValue::B(b) => Value::Bytes(b.clone()),
        AttributeValue::Ss(items) => Value::StrSet(items.iter().cloned().collect()),
        AttributeValue::Ns(items) => Value::NumSet(
            items
                .iter()
                .map(|n| decode_number(n, field))
                .collect::<Result<_>>()?,
        ),
        AttributeValue::Bs(items) => Value::BinSet(items.iter().cloned().collect()),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::List(
            items
                .iter()
                .map(|item| decode(item, field))
                .collect::<Result<_>>()?,
        ),
        AttributeValue::M(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), decode(v, field)?)))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(decoded)
}

/// Parsed decimal: sign, significant digits, power-of-ten exponent.
struct Decimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    let (negative, rest) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exp) = match rest.find(['e', 'E']) {
        Some(pos) => (&rest[..pos], rest[pos + 1..].parse::<i64>().ok()?),
        None => (rest, 0),
    };
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits = format!("{}{}", int_part, frac_part)
        .trim_start_matches('0')
        .to_string();
    let mut exponent = exp - frac_part.len() as i64;
    while digits.ends_with('0') {
        digits.pop();
        exponent += 1;
    }
    Some(Decimal {
        negative,
        digits,
        exponent,
    })
}

/// Narrows wire decimal text to `Int` when it has no fractional part.
pub(crate) fn decode_number(text: &str, field: &str) -> Result<Number> {
    let parsed = parse_decimal(text).ok_or_else(|| {
        Error::serialization(
            Some(field),
            format!("Failed to deserialize field '{}'. '{}' is not a decimal number", field, text),
        )
    })?;

    if parsed.digits.is_empty() {
        return Ok(Number::Int(0));
    }

    if parsed.exponent >= 0 {
        // bounded so a hostile exponent cannot allocate without limit
        if parsed.exponent > 400 {
            return Ok(Number::Float(text.trim().parse().unwrap_or(f64::INFINITY)));
        }
        let mut integer = String::with_capacity(parsed.digits.len() + parsed.exponent as usize + 1);
        if parsed.negative {
            integer.push('-');
        }
        integer.push_str(&parsed.digits);
        integer.extend(std::iter::repeat('0').take(parsed.exponent as usize));
        return Ok(match integer.parse::<i64>() {
            Ok(i) => Number::Int(i),
            Err(_) => Number::Decimal(integer),
        });
    }

    text.trim().parse::<f64>().map(Number::Float).map_err(|e| {
        Error::serialization(
            Some(field),
            format!("Failed to deserialize field '{}'. '{}': {}", field, text, e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DocumentExt;
    use bytes::Bytes;
    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn roundtrip(value: Value) -> Value {
        from_wire_value(&to_wire_value(&value).unwrap()).unwrap()
    }

    #[test]
    fn test_float_encodes_through_text() {
        assert_eq!(to_wire_value(&Value::float(0.1)).unwrap(), AttributeValue::N("0.1".into()));
        assert_eq!(to_wire_value(&Value::float(10.5)).unwrap(), AttributeValue::N("10.5".into()));
    }

    #[test]
    fn test_integral_float_decodes_as_int() {
        let wire = to_wire_value(&Value::float(10.0)).unwrap();
        assert_eq!(wire, AttributeValue::N("10".into()));
        assert!(matches!(from_wire_value(&wire).unwrap(), Value::Number(Number::Int(10))));
    }

    #[test]
    fn test_decode_number_forms() {
        assert!(matches!(decode_number("10.0", "f").unwrap(), Number::Int(10)));
        assert!(matches!(decode_number("1.5e1", "f").unwrap(), Number::Int(15)));
        assert!(matches!(decode_number("-0.00", "f").unwrap(), Number::Int(0)));
        assert!(matches!(decode_number("2.25", "f").unwrap(), Number::Float(f) if f == 2.25));
        assert!(matches!(
            decode_number("123456789012345678901234567890", "f").unwrap(),
            Number::Decimal(ref s) if s == "123456789012345678901234567890"
        ));
        assert!(decode_number("abc", "f").is_err());
    }

    #[test]
    fn test_non_finite_float_names_field() {
        let mut doc = Document::new();
        doc.put("score", f64::NAN);
        let err = to_wire(&doc).unwrap_err();
        match err {
            Error::Serialization { field, message } => {
                assert_eq!(field.as_deref(), Some("score"));
                assert!(message.contains("'score'"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_utc_datetime_uses_z_suffix() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            to_wire_value(&Value::from(dt)).unwrap(),
            AttributeValue::S("2024-03-01T12:30:00Z".into())
        );
    }

    #[test]
    fn test_offset_datetime_keeps_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = offset.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            to_wire_value(&Value::from(dt)).unwrap(),
            AttributeValue::S("2024-03-01T12:30:00+02:00".into())
        );
    }

    #[test]
    fn test_date_and_uuid_encode_as_text() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(to_wire_value(&Value::from(date)).unwrap(), AttributeValue::S("2023-01-01".into()));
        let id = Uuid::nil();
        assert_eq!(
            to_wire_value(&Value::from(id)).unwrap(),
            AttributeValue::S("00000000-0000-0000-0000-000000000000".into())
        );
    }

    #[test]
    fn test_sets_use_native_set_types() {
        let tags = Value::str_set(["a", "b"]);
        assert_eq!(
            to_wire_value(&tags).unwrap(),
            AttributeValue::Ss(vec!["a".into(), "b".into()])
        );
        let nums = Value::num_set([1i64, 2]);
        assert_eq!(
            to_wire_value(&nums).unwrap(),
            AttributeValue::Ns(vec!["1".into(), "2".into()])
        );
    }

    #[test]
    fn test_empty_set_is_omitted() {
        let mut doc = Document::new();
        doc.put("id", "1");
        doc.put("tags", BTreeSet::<String>::new());
        let item = to_wire(&doc).unwrap();
        assert!(!item.contains_key("tags"));
        assert!(item.contains_key("id"));
    }

    #[test]
    fn test_empty_set_nested_in_map_is_omitted() {
        let mut inner = Document::new();
        inner.put("tags", BTreeSet::<String>::new());
        inner.put("x", 1);
        let wire = to_wire_value(&Value::Map(inner)).unwrap();
        let map = wire.as_m().unwrap();
        assert!(!map.contains_key("tags"));
        assert_eq!(map["x"], AttributeValue::N("1".into()));
    }

    #[test]
    fn test_empty_set_in_list_is_an_error() {
        let value = Value::List(vec![Value::StrSet(BTreeSet::new())]);
        assert!(matches!(to_wire_value(&value), Err(Error::Serialization { .. })));
    }

    #[test]
    fn test_binary_passes_through() {
        let value = Value::Bytes(Bytes::from_static(b"\x00\x01"));
        assert_eq!(
            to_wire_value(&value).unwrap(),
            AttributeValue::B(Bytes::from_static(b"\x00\x01"))
        );
    }

    #[test]
    fn test_collection_roundtrip() {
        let mut inner = Document::new();
        inner.put("n", 3);
        inner.put("s", "x");
        let value = Value::List(vec![
            Value::Map(inner),
            Value::Bool(true),
            Value::Null,
            Value::str_set(["q"]),
            Value::float(2.5),
        ]);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_cursor_roundtrip() {
        let mut key = Item::new();
        key.insert("pk".into(), AttributeValue::S("value".into()));
        key.insert("sk".into(), AttributeValue::N("123".into()));
        let cursor = serialize_cursor(&key).unwrap();
        assert_eq!(cursor["pk"], Value::from("value"));
        assert_eq!(cursor["sk"], Value::int(123));
        assert_eq!(deserialize_cursor(&cursor).unwrap(), key);
    }

    #[test]
    fn test_cursor_token_roundtrip() {
        let mut cursor = Document::new();
        cursor.put("room_id", "r1");
        cursor.put("timestamp", "2023-01-01T10:00:00Z");
        let token = encode_cursor_token(&cursor).unwrap();
        assert_eq!(decode_cursor_token(&token).unwrap(), cursor);
        assert!(decode_cursor_token("not a token!").is_err());
    }

    proptest! {
        #[test]
        fn prop_int_roundtrip(i in any::<i64>()) {
            prop_assert_eq!(roundtrip(Value::int(i)), Value::int(i));
        }

        #[test]
        fn prop_finite_float_roundtrip(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
            let back = roundtrip(Value::float(f));
            let n = back.as_f64().unwrap();
            prop_assert_eq!(n, f);
            if f.fract() != 0.0 {
                prop_assert!(matches!(back, Value::Number(Number::Float(_))), "fractional values stay float");
            }
        }

        #[test]
        fn prop_string_roundtrip(s in ".*") {
            prop_assert_eq!(roundtrip(Value::Str(s.clone())), Value::Str(s));
        }
    }
}
