//! Encode/decode/validate checkpoints against a compiled graph (spec §4.5.4,
//! §4.5.5, §6.4).

use std::collections::HashMap;

use hive_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource, FrontierEntry, Interruption};

use crate::error::{HiveError, Result};
use crate::fingerprint::{checkpoint_id, task_local_fingerprint};
use crate::graph::CompiledGraph;
use crate::ids::{ChannelId, NodeId, RunId, ThreadId};
use crate::schema::{ChannelRegistry, Persistence};
use crate::store::{GlobalStore, Overlay};
use crate::task::{FrontierTask, Provenance as TaskProvenance};

pub struct EncodeInput<'a> {
    pub run_id: RunId,
    pub thread_id: ThreadId,
    pub step_index: u32,
    pub schema_version: String,
    pub graph_version: String,
    pub global: &'a GlobalStore,
    pub channel_versions: &'a HashMap<ChannelId, u64>,
    pub versions_seen_by_node: &'a HashMap<NodeId, HashMap<ChannelId, u64>>,
    pub updated_channels_last_commit: &'a [ChannelId],
    pub frontier: &'a [FrontierTask],
    pub join_barrier_seen_by_join_id: &'a HashMap<String, Vec<NodeId>>,
    pub interruption: Option<(&'a str, &'a serde_json::Value)>,
    pub source: CheckpointSource,
}

/// Build a normative `Checkpoint` record (spec §4.5.4). Encode failures
/// surface the offending channel id.
pub fn encode(registry: &ChannelRegistry, input: EncodeInput<'_>) -> Result<Checkpoint> {
    let mut channel_versions = HashMap::new();
    for (k, v) in input.channel_versions {
        if *v > 0 {
            channel_versions.insert(k.clone(), *v);
        }
    }

    let mut global_data_by_channel_id = HashMap::new();
    for spec in registry.global_sorted() {
        if spec.persistence != Persistence::Checkpointed {
            continue;
        }
        let codec = spec
            .codec
            .as_deref()
            .ok_or_else(|| HiveError::CheckpointEncodeFailed {
                field: spec.id.clone(),
                reason: "missing codec".to_string(),
            })?;
        let value = input.global.get(&spec.id).cloned().unwrap_or_else(|| spec.initial_value());
        let bytes = codec.encode(&value).map_err(|e| HiveError::CheckpointEncodeFailed {
            field: spec.id.clone(),
            reason: e.to_string(),
        })?;
        global_data_by_channel_id.insert(spec.id.clone(), bytes);
    }

    let mut frontier = Vec::with_capacity(input.frontier.len());
    for task in input.frontier {
        let fingerprint = task_local_fingerprint(registry, &task.seed.overlay)?;
        let mut local_data_by_channel_id = HashMap::new();
        for spec in registry.task_local_sorted() {
            if let Some(value) = task.seed.overlay.get(&spec.id) {
                let codec = spec
                    .codec
                    .as_deref()
                    .ok_or_else(|| HiveError::CheckpointEncodeFailed {
                        field: spec.id.clone(),
                        reason: "missing codec".to_string(),
                    })?;
                let bytes = codec.encode(value).map_err(|e| HiveError::CheckpointEncodeFailed {
                    field: spec.id.clone(),
                    reason: e.to_string(),
                })?;
                local_data_by_channel_id.insert(spec.id.clone(), bytes);
            }
        }
        frontier.push(FrontierEntry {
            provenance: match task.provenance {
                TaskProvenance::Graph => hive_checkpoint::Provenance::Graph,
                TaskProvenance::Spawn => hive_checkpoint::Provenance::Spawn,
            },
            node_id: task.seed.node_id.clone(),
            local_fingerprint: fingerprint,
            local_data_by_channel_id,
        });
    }

    let mut join_barrier_seen_by_join_id = HashMap::new();
    for (join_id, parents) in input.join_barrier_seen_by_join_id {
        let mut sorted = parents.clone();
        sorted.sort();
        join_barrier_seen_by_join_id.insert(join_id.clone(), sorted);
    }

    Ok(Checkpoint {
        id: checkpoint_id(input.run_id, input.step_index),
        thread_id: input.thread_id,
        run_id: input.run_id,
        step_index: input.step_index,
        schema_version: input.schema_version,
        graph_version: input.graph_version,
        checkpoint_format_version: hive_checkpoint::CHECKPOINT_FORMAT_VERSION.to_string(),
        channel_versions,
        versions_seen_by_node: input.versions_seen_by_node.clone(),
        updated_channels_last_commit: input.updated_channels_last_commit.to_vec(),
        global_data_by_channel_id,
        frontier,
        join_barrier_seen_by_join_id,
        interruption: input.interruption.map(|(id, payload)| Interruption {
            id: id.to_string(),
            payload: payload.clone(),
        }),
        metadata: CheckpointMetadata::new(input.source),
    })
}

pub struct DecodedCheckpoint {
    pub global: GlobalStore,
    pub frontier: Vec<FrontierTask>,
    pub channel_versions: HashMap<ChannelId, u64>,
    pub versions_seen_by_node: HashMap<NodeId, HashMap<ChannelId, u64>>,
    pub updated_channels_last_commit: Vec<ChannelId>,
    pub join_barrier_seen_by_join_id: HashMap<String, Vec<NodeId>>,
    pub interruption: Option<Interruption>,
}

/// Validate and decode a checkpoint against the currently compiled graph
/// (spec §4.5.5). `HCP1` records decode with missing trigger-era fields
/// defaulting to empty.
pub fn decode(registry: &ChannelRegistry, graph: &CompiledGraph, checkpoint: &Checkpoint) -> Result<DecodedCheckpoint> {
    if checkpoint.schema_version != graph.schema_version || checkpoint.graph_version != graph.graph_version {
        return Err(HiveError::CheckpointVersionMismatch {
            schema_version: checkpoint.schema_version.clone(),
            graph_version: checkpoint.graph_version.clone(),
        });
    }

    let mut global = GlobalStore::fresh(registry);
    let mut unexpected: Vec<ChannelId> = Vec::new();
    for channel_id in checkpoint.global_data_by_channel_id.keys() {
        if registry.get(channel_id).is_none() {
            unexpected.push(channel_id.clone());
        }
    }
    unexpected.sort();
    if let Some(smallest) = unexpected.into_iter().next() {
        return Err(HiveError::CheckpointCorrupt {
            field: "globalDataByChannelID".to_string(),
            description: format!("unexpected channel id {smallest}"),
        });
    }

    for spec in registry.global_sorted() {
        if spec.persistence != Persistence::Checkpointed {
            continue;
        }
        let bytes = checkpoint
            .global_data_by_channel_id
            .get(&spec.id)
            .ok_or_else(|| HiveError::CheckpointDecodeFailed {
                field: spec.id.clone(),
                reason: "missing entry".to_string(),
            })?;
        let codec = spec.codec.as_deref().ok_or_else(|| HiveError::CheckpointDecodeFailed {
            field: spec.id.clone(),
            reason: "missing codec".to_string(),
        })?;
        let value = codec.decode(bytes).map_err(|e| HiveError::CheckpointDecodeFailed {
            field: spec.id.clone(),
            reason: e.to_string(),
        })?;
        global.set(spec.id.clone(), value);
    }

    let mut frontier = Vec::with_capacity(checkpoint.frontier.len());
    for entry in &checkpoint.frontier {
        let mut overlay = Overlay::new();
        for spec in registry.task_local_sorted() {
            if let Some(bytes) = entry.local_data_by_channel_id.get(&spec.id) {
                let codec = spec.codec.as_deref().ok_or_else(|| HiveError::CheckpointDecodeFailed {
                    field: spec.id.clone(),
                    reason: "missing codec".to_string(),
                })?;
                let value = codec.decode(bytes).map_err(|e| HiveError::CheckpointDecodeFailed {
                    field: spec.id.clone(),
                    reason: e.to_string(),
                })?;
                overlay.set(spec.id.clone(), value);
            }
        }
        let recomputed = task_local_fingerprint(registry, &overlay)?;
        if recomputed != entry.local_fingerprint {
            return Err(HiveError::CheckpointCorrupt {
                field: "frontier".to_string(),
                description: format!("fingerprint mismatch for node {}", entry.node_id),
            });
        }
        frontier.push(FrontierTask {
            seed: crate::task::TaskSeed::new(entry.node_id.clone(), overlay),
            provenance: match entry.provenance {
                hive_checkpoint::Provenance::Graph => TaskProvenance::Graph,
                hive_checkpoint::Provenance::Spawn => TaskProvenance::Spawn,
            },
            is_join_seed: false,
        });
    }

    let known_join_ids: std::collections::HashSet<&str> =
        graph.join_edges.iter().map(|j| j.id.as_str()).collect();
    let mut unknown_join_ids: Vec<String> = checkpoint
        .join_barrier_seen_by_join_id
        .keys()
        .filter(|id| !known_join_ids.contains(id.as_str()))
        .cloned()
        .collect();
    unknown_join_ids.sort();
    if let Some(smallest) = unknown_join_ids.into_iter().next() {
        return Err(HiveError::CheckpointCorrupt {
            field: "joinBarrierSeenByJoinID".to_string(),
            description: format!("unknown join id {smallest}"),
        });
    }
    for (join_id, parents) in &checkpoint.join_barrier_seen_by_join_id {
        let mut sorted = parents.clone();
        sorted.sort();
        sorted.dedup();
        if &sorted != parents {
            return Err(HiveError::CheckpointCorrupt {
                field: "joinBarrierSeenByJoinID".to_string(),
                description: format!("parents for join {join_id} are not strictly sorted"),
            });
        }
        let Some(join) = graph.join_edges.iter().find(|j| &j.id == join_id) else {
            continue;
        };
        for p in parents {
            if !join.parents.contains(p) {
                return Err(HiveError::CheckpointCorrupt {
                    field: "joinBarrierSeenByJoinID".to_string(),
                    description: format!("{p} is not a valid parent of join {join_id}"),
                });
            }
        }
    }

    Ok(DecodedCheckpoint {
        global,
        frontier,
        channel_versions: checkpoint.channel_versions.clone(),
        versions_seen_by_node: checkpoint.versions_seen_by_node.clone(),
        updated_channels_last_commit: checkpoint.updated_channels_last_commit.clone(),
        join_barrier_seen_by_join_id: checkpoint.join_barrier_seen_by_join_id.clone(),
        interruption: checkpoint.interruption.clone(),
    })
}
