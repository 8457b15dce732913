//! Identifier re-exports plus `EventID` (spec §3.1), which is runtime-only
//! and so lives here rather than in `hive-checkpoint`.

pub use hive_checkpoint::{
    AttemptId, ChannelId, CheckpointId, JoinId, NodeId, RunId, TaskId, ThreadId,
};

/// Totally orders events within one attempt (spec §3.1, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventId {
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub event_index: u64,
    pub step_index: Option<u32>,
    pub task_ordinal: Option<u32>,
}

/// Characters reserved for join-edge IDs; node IDs must not contain them
/// (spec §3.1).
pub const RESERVED_NODE_ID_CHARS: [char; 2] = [':', '+'];

pub fn validate_node_id(id: &NodeId) -> Result<(), String> {
    if id.is_empty() {
        return Err("node id must not be empty".to_string());
    }
    if id.chars().any(|c| RESERVED_NODE_ID_CHARS.contains(&c)) {
        return Err(format!(
            "node id {id:?} contains a reserved join character (':' or '+')"
        ));
    }
    Ok(())
}
