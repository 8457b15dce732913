//! Stores and the read-only composite view (spec §3.3).

use std::collections::HashMap;

use serde_json::Value;

use crate::ids::ChannelId;
use crate::schema::{ChannelRegistry, ChannelScope};

/// Map from `ChannelID` to value, for every global channel. Untracked
/// globals reset to `initial()` on load; checkpointed globals come from
/// persisted bytes via their codec (spec §3.3).
#[derive(Debug, Clone, Default)]
pub struct GlobalStore {
    values: HashMap<ChannelId, Value>,
}

impl GlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(registry: &ChannelRegistry) -> Self {
        let values = registry
            .global_sorted()
            .map(|spec| (spec.id.clone(), spec.initial_value()))
            .collect();
        Self { values }
    }

    pub fn get(&self, channel_id: &str) -> Option<&Value> {
        self.values.get(channel_id)
    }

    pub fn set(&mut self, channel_id: impl Into<ChannelId>, value: Value) {
        self.values.insert(channel_id.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &Value)> {
        self.values.iter()
    }
}

/// Sparse map over task-local channels; a missing entry resolves to
/// `initial()` (spec §3.3, §3.6).
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    values: HashMap<ChannelId, Value>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: &str) -> Option<&Value> {
        self.values.get(channel_id)
    }

    pub fn set(&mut self, channel_id: impl Into<ChannelId>, value: Value) {
        self.values.insert(channel_id.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &Value)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Precomputed per-registry table of `initial()`, used as the fallback tier
/// of a `StoreView` (spec §3.3).
#[derive(Debug, Clone)]
pub struct InitialCache {
    values: HashMap<ChannelId, Value>,
}

impl InitialCache {
    pub fn build(registry: &ChannelRegistry) -> Self {
        let values = registry
            .sorted()
            .map(|spec| (spec.id.clone(), spec.initial_value()))
            .collect();
        Self { values }
    }

    pub fn get(&self, channel_id: &str) -> Option<&Value> {
        self.values.get(channel_id)
    }
}

/// Read-only composite over (global ∪ task-local overlay ∪ initial cache).
/// Intentionally not constructible outside the runtime (spec §3.3): the
/// only public constructor lives behind `pub(crate)`, so tests obtain one by
/// driving a `Runtime` rather than building it by hand.
pub struct StoreView<'a> {
    registry: &'a ChannelRegistry,
    global: &'a GlobalStore,
    overlay: Option<&'a Overlay>,
    initial: &'a InitialCache,
}

impl<'a> StoreView<'a> {
    pub(crate) fn new(
        registry: &'a ChannelRegistry,
        global: &'a GlobalStore,
        overlay: Option<&'a Overlay>,
        initial: &'a InitialCache,
    ) -> Self {
        Self {
            registry,
            global,
            overlay,
            initial,
        }
    }

    pub fn get(&self, channel_id: &str) -> Option<Value> {
        let spec = self.registry.get(channel_id)?;
        match spec.scope {
            ChannelScope::TaskLocal => Some(
                self.overlay
                    .and_then(|o| o.get(channel_id))
                    .cloned()
                    .unwrap_or_else(|| self.initial.get(channel_id).cloned().unwrap_or(Value::Null)),
            ),
            ChannelScope::Global => Some(
                self.global
                    .get(channel_id)
                    .cloned()
                    .unwrap_or_else(|| self.initial.get(channel_id).cloned().unwrap_or(Value::Null)),
            ),
        }
    }
}
