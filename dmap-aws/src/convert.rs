/// Conversions between dynamap wire values and SDK attribute values

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as SdkValue;
use bytes::Bytes;
use dmap_core::{AttributeValue, Fault, Item};
use std::collections::HashMap;

pub type SdkItem = HashMap<String, SdkValue>;

pub fn to_sdk(value: &AttributeValue) -> SdkValue {
    match value {
        AttributeValue::S(s) => SdkValue::S(s.clone()),
        AttributeValue::N(n) => SdkValue::N(n.clone()),
        AttributeValue::B(b) => SdkValue::B(Blob::new(b.to_vec())),
        AttributeValue::Ss(set) => SdkValue::Ss(set.clone()),
        AttributeValue::Ns(set) => SdkValue::Ns(set.clone()),
        AttributeValue::Bs(set) => SdkValue::Bs(set.iter().map(|b| Blob::new(b.to_vec())).collect()),
        AttributeValue::Bool(b) => SdkValue::Bool(*b),
        AttributeValue::Null(n) => SdkValue::Null(*n),
        AttributeValue::L(items) => SdkValue::L(items.iter().map(to_sdk).collect()),
        AttributeValue::M(map) => SdkValue::M(to_sdk_item(map)),
    }
}

pub fn to_sdk_item(item: &Item) -> SdkItem {
    item.iter().map(|(k, v)| (k.clone(), to_sdk(v))).collect()
}

/// Fails on value kinds this SDK version knows and dynamap does not.
pub fn from_sdk(value: &SdkValue) -> Result<AttributeValue, Fault> {
    Ok(match value {
        SdkValue::S(s) => AttributeValue::S(s.clone()),
        SdkValue::N(n) => AttributeValue::N(n.clone()),
        SdkValue::B(b) => AttributeValue::B(Bytes::copy_from_slice(b.as_ref())),
        SdkValue::Ss(set) => AttributeValue::Ss(set.clone()),
        SdkValue::Ns(set) => AttributeValue::Ns(set.clone()),
        SdkValue::Bs(set) => AttributeValue::Bs(set.iter().map(|b| Bytes::copy_from_slice(b.as_ref())).collect()),
        SdkValue::Bool(b) => AttributeValue::Bool(*b),
        SdkValue::Null(n) => AttributeValue::Null(*n),
        SdkValue::L(items) => AttributeValue::L(items.iter().map(from_sdk).collect::<Result<_, _>>()?),
        SdkValue::M(map) => AttributeValue::M(from_sdk_item(map)?),
        other => {
            return Err(Fault::new(
                "SerializationException",
                format!("Unsupported attribute value in response: {:?}", other),
            ))
        }
    })
}

pub fn from_sdk_item(item: &SdkItem) -> Result<Item, Fault> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), from_sdk(v)?)))
        .collect()
}

/// `None` stays `None`; empty maps are sent as absent.
pub(crate) fn to_sdk_values(values: Option<Item>) -> Option<SdkItem> {
    values.filter(|v| !v.is_empty()).map(|v| to_sdk_item(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_values_survive() {
        let mut inner = Item::new();
        inner.insert("tags".into(), AttributeValue::Ss(vec!["a".into(), "b".into()]));
        inner.insert("blob".into(), AttributeValue::B(Bytes::from_static(b"\x00\x01")));
        let mut item = Item::new();
        item.insert("id".into(), AttributeValue::S("x".into()));
        item.insert("n".into(), AttributeValue::N("10.5".into()));
        item.insert("nested".into(), AttributeValue::M(inner));
        item.insert(
            "list".into(),
            AttributeValue::L(vec![AttributeValue::Null(true), AttributeValue::Bool(false)]),
        );

        let sdk = to_sdk_item(&item);
        assert_eq!(sdk["n"], SdkValue::N("10.5".into()));
        assert_eq!(from_sdk_item(&sdk).unwrap(), item);
    }

    #[test]
    fn test_empty_values_are_omitted() {
        assert!(to_sdk_values(Some(Item::new())).is_none());
        assert!(to_sdk_values(None).is_none());
    }
}
