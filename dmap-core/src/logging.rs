/// Log-safe rendering of item keys
///
/// Key values can hold personal data (emails, user ids). Operations log a
/// short checksum per key attribute instead, which still lets two log lines
/// about the same item be matched up.
use crate::serializer::to_wire;
use crate::types::Item;
use crate::value::Document;

/// Renders `name=crc32` pairs for each key attribute, sorted by name.
pub fn redact_key(key: &Item) -> String {
    let mut parts: Vec<String> = key
        .iter()
        .map(|(name, value)| {
            let text = serde_json::to_string(value).unwrap_or_default();
            format!("{}={:08x}", name, crc32fast::hash(text.as_bytes()))
        })
        .collect();
    parts.sort();
    format!("{{{}}}", parts.join(", "))
}

/// Same as [`redact_key`] for a key still in native form. Digests match the
/// ones logged for the encoded key.
pub fn redact_document(key: &Document) -> String {
    match to_wire(key) {
        Ok(item) => redact_key(&item),
        Err(_) => {
            let names: Vec<String> = key.keys().map(|name| format!("{}=?", name)).collect();
            format!("{{{}}}", names.join(", "))
        }
    }
}
