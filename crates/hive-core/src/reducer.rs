//! Built-in reducers (spec §9, §3.5). A reducer is a total binary function
//! folded left-to-right over a deterministically ordered write sequence; it
//! may fail for malformed inputs but must never panic.

use serde_json::Value;

use crate::error::{HiveError, Result};

/// Bounded capacity for `Reducer::Topic`; exceeding it is a reducer error
/// rather than silent truncation, keeping the channel total.
pub const DEFAULT_TOPIC_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reducer {
    /// Last write wins; `current` is discarded.
    LastWriteWins,
    /// Arrays are concatenated; non-array inputs are wrapped.
    Append,
    /// Arrays are unioned; membership compared by canonical JSON string, and
    /// the result re-sorted by that same key for determinism.
    SetUnion,
    /// Objects are merged key-wise, `update` winning on conflicts; iteration
    /// and emitted key order is the key's UTF-8 byte order.
    DictionaryMerge,
    /// Accepts exactly one non-null write per step; a second write is an
    /// error (use together with `UpdatePolicy::Single` in practice).
    Barrier,
    /// Append-only, bounded to `capacity` entries.
    Topic { capacity: usize },
}

impl Reducer {
    pub fn topic() -> Self {
        Reducer::Topic {
            capacity: DEFAULT_TOPIC_CAPACITY,
        }
    }

    /// Fold `update` into `current`, tagging any failure with `channel` for
    /// the caller (spec §4.5.2 item 5).
    pub fn reduce(&self, channel: &str, current: Value, update: Value) -> Result<Value> {
        match self {
            Reducer::LastWriteWins => Ok(update),
            Reducer::Append => Ok(append(current, update)),
            Reducer::SetUnion => set_union(channel, current, update),
            Reducer::DictionaryMerge => dictionary_merge(channel, current, update),
            Reducer::Barrier => barrier(channel, current, update),
            Reducer::Topic { capacity } => topic(channel, current, update, *capacity),
        }
    }
}

fn as_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => vec![],
        other => vec![other],
    }
}

fn append(current: Value, update: Value) -> Value {
    let mut items = as_array(current);
    items.extend(as_array(update));
    Value::Array(items)
}

fn canonical_key(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn set_union(channel: &str, current: Value, update: Value) -> Result<Value> {
    let mut items = as_array(current);
    items.extend(as_array(update));
    items.sort_by_key(canonical_key);
    items.dedup_by(|a, b| canonical_key(a) == canonical_key(b));
    let _ = channel;
    Ok(Value::Array(items))
}

fn dictionary_merge(channel: &str, current: Value, update: Value) -> Result<Value> {
    let mut base = match current {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        _ => {
            return Err(HiveError::reducer_failed(
                channel.to_string(),
                "dictionaryMerge requires object values",
            ))
        }
    };
    let incoming = match update {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        _ => {
            return Err(HiveError::reducer_failed(
                channel.to_string(),
                "dictionaryMerge requires object values",
            ))
        }
    };
    for (k, v) in incoming {
        base.insert(k, v);
    }
    let mut sorted = serde_json::Map::new();
    let mut keys: Vec<String> = base.keys().cloned().collect();
    keys.sort();
    for k in keys {
        sorted.insert(k.clone(), base[&k].clone());
    }
    Ok(Value::Object(sorted))
}

fn barrier(channel: &str, current: Value, update: Value) -> Result<Value> {
    if !current.is_null() {
        return Err(HiveError::reducer_failed(
            channel.to_string(),
            "barrier channel already has a value this step",
        ));
    }
    Ok(update)
}

fn topic(channel: &str, current: Value, update: Value, capacity: usize) -> Result<Value> {
    let mut items = as_array(current);
    items.extend(as_array(update));
    if items.len() > capacity {
        return Err(HiveError::reducer_failed(
            channel.to_string(),
            format!("topic channel exceeded capacity {capacity}"),
        ));
    }
    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_write_wins_discards_current() {
        let r = Reducer::LastWriteWins;
        assert_eq!(r.reduce("c", json!(1), json!(2)).unwrap(), json!(2));
    }

    #[test]
    fn append_wraps_scalars() {
        let r = Reducer::Append;
        assert_eq!(
            r.reduce("c", json!([1]), json!(2)).unwrap(),
            json!([1, 2])
        );
    }

    #[test]
    fn set_union_dedups_and_sorts() {
        let r = Reducer::SetUnion;
        let result = r.reduce("c", json!(["b", "a"]), json!(["a", "c"])).unwrap();
        assert_eq!(result, json!(["a", "b", "c"]));
    }

    #[test]
    fn dictionary_merge_update_wins_and_sorts_keys() {
        let r = Reducer::DictionaryMerge;
        let result = r
            .reduce("c", json!({"b": 1, "a": 1}), json!({"a": 2, "c": 3}))
            .unwrap();
        assert_eq!(result, json!({"a": 2, "b": 1, "c": 3}));
        let keys: Vec<&String> = result.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn barrier_rejects_second_write() {
        let r = Reducer::Barrier;
        assert!(r.reduce("c", Value::Null, json!(1)).is_ok());
        assert!(r.reduce("c", json!(1), json!(2)).is_err());
    }

    #[test]
    fn topic_rejects_overflow() {
        let r = Reducer::Topic { capacity: 1 };
        assert!(r.reduce("c", Value::Null, json!([1])).is_ok());
        assert!(r.reduce("c", json!([1]), json!([2])).is_err());
    }
}
