//! Channel schema and registry (spec §3.2, §4.1).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{HiveError, Result};
use crate::ids::ChannelId;
use crate::reducer::Reducer;
use crate::value::Codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelScope {
    Global,
    TaskLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Checkpointed,
    Untracked,
}

/// Declares one channel. `initial` is a function rather than a stored value
/// so every reader (frontier seeds, loaded checkpoints) gets a fresh value.
pub struct ChannelSpec {
    pub id: ChannelId,
    pub value_type_id: String,
    pub scope: ChannelScope,
    pub reducer: Reducer,
    pub update_policy: UpdatePolicy,
    pub initial: Arc<dyn Fn() -> Value + Send + Sync>,
    pub codec: Option<Arc<dyn Codec>>,
    pub persistence: Persistence,
}

impl std::fmt::Debug for ChannelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSpec")
            .field("id", &self.id)
            .field("value_type_id", &self.value_type_id)
            .field("scope", &self.scope)
            .field("reducer", &self.reducer)
            .field("update_policy", &self.update_policy)
            .field("persistence", &self.persistence)
            .finish()
    }
}

impl ChannelSpec {
    pub fn initial_value(&self) -> Value {
        (self.initial)()
    }
}

/// Immutable, validated set of channel specs, with lookup and sorted
/// iteration (spec §3.2, §4.1).
#[derive(Debug)]
pub struct ChannelRegistry {
    /// Declared order, as provided to `new`.
    declared: Vec<ChannelSpec>,
    /// Index into `declared`, sorted by channel id (UTF-8 byte order).
    sorted_indices: Vec<usize>,
    by_id: HashMap<ChannelId, usize>,
}

impl ChannelRegistry {
    pub fn new(specs: Vec<ChannelSpec>) -> Result<Self> {
        let mut by_id: HashMap<ChannelId, usize> = HashMap::new();
        let mut duplicate_ids: Vec<ChannelId> = Vec::new();
        for (idx, spec) in specs.iter().enumerate() {
            if by_id.insert(spec.id.clone(), idx).is_some() {
                duplicate_ids.push(spec.id.clone());
            }
        }
        if let Some(smallest) = duplicate_ids.iter().min().cloned() {
            return Err(HiveError::DuplicateChannelId(smallest));
        }

        let mut untracked_task_local: Vec<ChannelId> = specs
            .iter()
            .filter(|s| s.scope == ChannelScope::TaskLocal && s.persistence == Persistence::Untracked)
            .map(|s| s.id.clone())
            .collect();
        untracked_task_local.sort();
        if let Some(smallest) = untracked_task_local.into_iter().next() {
            return Err(HiveError::InvalidTaskLocalUntracked(smallest));
        }

        let mut missing_codec: Vec<ChannelId> = specs
            .iter()
            .filter(|s| {
                s.codec.is_none()
                    && (s.scope == ChannelScope::TaskLocal
                        || (s.scope == ChannelScope::Global && s.persistence == Persistence::Checkpointed))
            })
            .map(|s| s.id.clone())
            .collect();
        missing_codec.sort();
        if let Some(smallest) = missing_codec.into_iter().next() {
            return Err(HiveError::MissingCodec(smallest));
        }

        let mut sorted_indices: Vec<usize> = (0..specs.len()).collect();
        sorted_indices.sort_by(|&a, &b| specs[a].id.cmp(&specs[b].id));

        Ok(Self {
            declared: specs,
            sorted_indices,
            by_id,
        })
    }

    pub fn get(&self, id: &str) -> Option<&ChannelSpec> {
        self.by_id.get(id).map(|&idx| &self.declared[idx])
    }

    pub fn declared_order(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.declared.iter()
    }

    /// Lexicographic-by-id iteration ("registry-sorted order", §4.2, §4.3, §4.5.2).
    pub fn sorted(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.sorted_indices.iter().map(move |&idx| &self.declared[idx])
    }

    pub fn task_local_sorted(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.sorted().filter(|s| s.scope == ChannelScope::TaskLocal)
    }

    pub fn global_sorted(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.sorted().filter(|s| s.scope == ChannelScope::Global)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::json_codec;

    fn spec(id: &str, scope: ChannelScope, persistence: Persistence, codec: bool) -> ChannelSpec {
        ChannelSpec {
            id: id.to_string(),
            value_type_id: "json".to_string(),
            scope,
            reducer: Reducer::LastWriteWins,
            update_policy: UpdatePolicy::Multi,
            initial: Arc::new(|| Value::Null),
            codec: if codec { Some(json_codec()) } else { None },
            persistence,
        }
    }

    #[test]
    fn rejects_duplicate_channel_ids_choosing_smallest() {
        let err = ChannelRegistry::new(vec![
            spec("z", ChannelScope::Global, Persistence::Untracked, false),
            spec("a", ChannelScope::Global, Persistence::Untracked, false),
            spec("a", ChannelScope::Global, Persistence::Untracked, false),
        ])
        .unwrap_err();
        assert!(matches!(err, HiveError::DuplicateChannelId(id) if id == "a"));
    }

    #[test]
    fn rejects_untracked_task_local() {
        let err = ChannelRegistry::new(vec![spec(
            "x",
            ChannelScope::TaskLocal,
            Persistence::Untracked,
            true,
        )])
        .unwrap_err();
        assert!(matches!(err, HiveError::InvalidTaskLocalUntracked(id) if id == "x"));
    }

    #[test]
    fn requires_codec_for_task_local_and_checkpointed_global() {
        let err = ChannelRegistry::new(vec![spec(
            "x",
            ChannelScope::TaskLocal,
            Persistence::Checkpointed,
            false,
        )])
        .unwrap_err();
        assert!(matches!(err, HiveError::MissingCodec(id) if id == "x"));
    }

    #[test]
    fn sorted_iteration_is_lexicographic() {
        let registry = ChannelRegistry::new(vec![
            spec("b", ChannelScope::Global, Persistence::Untracked, false),
            spec("a", ChannelScope::Global, Persistence::Untracked, false),
        ])
        .unwrap();
        let ids: Vec<&str> = registry.sorted().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
