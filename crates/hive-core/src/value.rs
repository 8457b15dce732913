//! Type-erased channel values (spec §9 "Polymorphism over the channel value
//! set" — erased containers chosen because schemas here are open/user-defined).

use std::fmt;
use std::sync::Arc;

use crate::error::{HiveError, Result};

/// Stable type tag checked at write time (`ChannelTypeMismatch`). Not a Rust
/// type, just a string the schema author picks (`"string"`, `"int"`, ...).
pub type ValueTypeId = String;

/// Encodes/decodes a channel value to bytes for checkpointing and payload
/// hashing. `codecID` identifies wire compatibility across versions.
pub trait Codec: Send + Sync {
    fn codec_id(&self) -> &str;
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value>;
}

impl fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("codec_id", &self.codec_id()).finish()
    }
}

/// Reference codec: plain `serde_json` bytes. Every channel without an
/// explicit codec that needs one (task-local, checkpointed global) gets this.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn codec_id(&self) -> &str {
        "json.v1"
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(HiveError::from)
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        serde_json::from_slice(bytes).map_err(HiveError::from)
    }
}

pub fn json_codec() -> Arc<dyn Codec> {
    Arc::new(JsonCodec)
}

/// Payload hash of a channel value (spec §4.4 "Payload hash"): codec-encoded
/// SHA-256 hex if a codec exists, else canonical-JSON SHA-256, else a
/// deterministic `unhashable:` marker.
pub fn payload_hash(
    value: &serde_json::Value,
    codec: Option<&dyn Codec>,
    value_type_id: &str,
) -> String {
    use sha2::{Digest, Sha256};

    if let Some(codec) = codec {
        if let Ok(bytes) = codec.encode(value) {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            return hex::encode(hasher.finalize());
        }
    }
    if let Ok(text) = canonical_json(value) {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        return hex::encode(hasher.finalize());
    }
    let mut hasher = Sha256::new();
    hasher.update(format!("unhashable:{value_type_id}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks a value against a channel's declared `value_type_id`
/// (`ChannelTypeMismatch`, spec §4.5.2 precedence #3). `"json"` is the
/// schemaless catch-all and always matches; a handful of common primitive
/// tags are checked structurally; anything else is assumed to be a
/// codec-defined type we can't validate here and is let through.
pub fn value_matches_type(value: &serde_json::Value, value_type_id: &str) -> bool {
    use serde_json::Value;
    match value_type_id {
        "json" => true,
        "int" | "integer" => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        "float" | "number" => matches!(value, Value::Number(_)),
        "string" => matches!(value, Value::String(_)),
        "bool" | "boolean" => matches!(value, Value::Bool(_)),
        "array" => matches!(value, Value::Array(_)),
        "object" => matches!(value, Value::Object(_)),
        _ => true,
    }
}

/// Describes the JSON kind of a value for a `ChannelTypeMismatch` message.
pub fn describe_value_kind(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_string()
}

/// Canonical JSON: keys sorted, no escaped forward slashes. Dates/base64 are
/// the caller's responsibility to have already embedded as strings.
fn canonical_json(value: &serde_json::Value) -> Result<String> {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted = serde_json::Map::new();
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for k in keys {
                    sorted.insert(k.clone(), sort(&map[k]));
                }
                serde_json::Value::Object(sorted)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    Ok(serde_json::to_string(&sort(value))?.replace("\\/", "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_type_accepts_anything() {
        assert!(value_matches_type(&json!(42), "json"));
        assert!(value_matches_type(&json!("x"), "json"));
        assert!(value_matches_type(&serde_json::Value::Null, "json"));
    }

    #[test]
    fn int_rejects_non_integers() {
        assert!(value_matches_type(&json!(42), "int"));
        assert!(!value_matches_type(&json!(4.5), "int"));
        assert!(!value_matches_type(&json!("42"), "int"));
    }

    #[test]
    fn unknown_type_id_is_not_structurally_checked() {
        assert!(value_matches_type(&json!({"a": 1}), "custom.v1"));
    }
}
