//! Canonical JSON rendering and SHA-256 helpers

use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a value as canonical JSON: object keys sorted, no whitespace.
/// Two structurally equal values always yield identical bytes.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = sorted(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&value)?)
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Hex encoded SHA-256 of arbitrary bytes
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Hex encoded SHA-256 of the canonical JSON form of a value
pub fn canonical_digest<T: Serialize>(value: &T) -> Result<String> {
    Ok(sha256_hex(canonical_json(value)?))
}
