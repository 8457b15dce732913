//! The persisted checkpoint record (spec §6.4) and its debug-only metadata
//! sidecar (`CheckpointMetadata`/`CheckpointSource`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, CheckpointId, JoinId, NodeId, RunId, ThreadId};

/// Format tag for the current on-disk checkpoint layout (spec §4.5.4, §6.4).
pub const CHECKPOINT_FORMAT_VERSION: &str = "HCP2";

/// Prior format tag, decodable by treating missing trigger fields as empty
/// (spec §6.4 "Forward-compat").
pub const CHECKPOINT_FORMAT_VERSION_HCP1: &str = "HCP1";

/// One entry of the frontier captured in a checkpoint (spec §6.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provenance {
    Graph,
    Spawn,
}

/// A frontier task as it appears inside a saved checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub provenance: Provenance,
    pub node_id: NodeId,
    /// 32-byte SHA-256 fingerprint of the task-local overlay.
    pub local_fingerprint: [u8; 32],
    /// Codec-encoded task-local channel values present in the overlay.
    pub local_data_by_channel_id: HashMap<ChannelId, Vec<u8>>,
}

/// A pending interruption recorded in a checkpoint (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interruption {
    pub id: String,
    pub payload: serde_json::Value,
}

/// Where a checkpoint came from — debug/time-travel metadata only; never
/// consulted by version or fingerprint validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Saved because the attempt's step loop reached a checkpoint policy.
    Loop,
    /// Saved because the step selected an interrupt.
    Interrupt,
    /// Saved by `applyExternalWrites` (spec §4.7).
    ExternalWrite,
}

/// Debug-only metadata sidecar attached to a saved checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource) -> Self {
        Self {
            source,
            saved_at: Utc::now(),
        }
    }
}

/// The normative persisted checkpoint record (spec §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub thread_id: ThreadId,
    pub run_id: RunId,
    pub step_index: u32,
    pub schema_version: String,
    pub graph_version: String,
    pub checkpoint_format_version: String,

    /// Only entries with value > 0 (spec §6.4). Absent in `HCP1` records,
    /// which predate triggers — defaults to empty on decode.
    #[serde(default)]
    pub channel_versions: HashMap<ChannelId, u64>,
    #[serde(default)]
    pub versions_seen_by_node: HashMap<NodeId, HashMap<ChannelId, u64>>,
    #[serde(default)]
    pub updated_channels_last_commit: Vec<ChannelId>,

    /// Checkpointed globals only, codec-encoded.
    pub global_data_by_channel_id: HashMap<ChannelId, Vec<u8>>,

    pub frontier: Vec<FrontierEntry>,

    /// Parents sorted lexicographically per join.
    pub join_barrier_seen_by_join_id: HashMap<JoinId, Vec<NodeId>>,

    pub interruption: Option<Interruption>,

    pub metadata: CheckpointMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_round_trips_through_json() {
        let cp = Checkpoint {
            id: "abc".into(),
            thread_id: "t1".into(),
            run_id: RunId::nil(),
            step_index: 3,
            schema_version: "s1".into(),
            graph_version: "g1".into(),
            checkpoint_format_version: CHECKPOINT_FORMAT_VERSION.into(),
            channel_versions: HashMap::new(),
            versions_seen_by_node: HashMap::new(),
            updated_channels_last_commit: vec![],
            global_data_by_channel_id: HashMap::new(),
            frontier: vec![],
            join_barrier_seen_by_join_id: HashMap::new(),
            interruption: None,
            metadata: CheckpointMetadata::new(CheckpointSource::Loop),
        };
        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, cp.id);
        assert_eq!(back.step_index, 3);
    }
}
