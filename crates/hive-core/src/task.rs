//! Frontier, task seeds, and tasks (spec §3.6).

use crate::ids::{NodeId, TaskId};
use crate::store::Overlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Graph,
    Spawn,
}

#[derive(Debug, Clone)]
pub struct TaskSeed {
    pub node_id: NodeId,
    pub overlay: Overlay,
}

impl TaskSeed {
    pub fn new(node_id: impl Into<NodeId>, overlay: Overlay) -> Self {
        Self {
            node_id: node_id.into(),
            overlay,
        }
    }

    pub fn bare(node_id: impl Into<NodeId>) -> Self {
        Self::new(node_id, Overlay::new())
    }
}

#[derive(Debug, Clone)]
pub struct FrontierTask {
    pub seed: TaskSeed,
    pub provenance: Provenance,
    pub is_join_seed: bool,
}

/// A task bound to a specific step and ordinal, with its identity computed
/// (spec §4.3).
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: TaskId,
    pub ordinal: u32,
    pub provenance: Provenance,
    pub node_id: NodeId,
    pub overlay: Overlay,
    pub fingerprint: [u8; 32],
}

/// What a node execution hands back to the scheduler (spec §4.5.1, §4.5.3).
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    pub writes: Vec<crate::write::Write>,
    pub spawn: Vec<TaskSeed>,
    pub next: NextRouting,
    pub interrupt: Option<InterruptRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NextRouting {
    #[default]
    UseGraphEdges,
    End,
    Nodes(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub struct InterruptRequest {
    pub payload: serde_json::Value,
}
