//! Compiled graph structure (spec §3.4) and the `NodeExecutor`/`Router`
//! contracts nodes implement.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{AttemptId, JoinId, NodeId, RunId, ThreadId};
use crate::retry::RetryPolicy;
use crate::store::StoreView;
use crate::task::NodeOutput;

/// Per-node trigger filter (spec §4.5.6, v1.1). `Always` is the default and
/// is ignored by the trigger-filtering pass entirely.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunWhen {
    #[default]
    Always,
    AnyOf(Vec<String>),
    AllOf(Vec<String>),
}

impl RunWhen {
    pub fn is_default(&self) -> bool {
        matches!(self, RunWhen::Always)
    }

    pub fn trigger_channels(&self) -> &[String] {
        match self {
            RunWhen::Always => &[],
            RunWhen::AnyOf(c) | RunWhen::AllOf(c) => c,
        }
    }
}

/// Context handed to a node execution: identity and the one-shot resume
/// payload visible only on the first committed step of a resumed attempt
/// (spec §4.6).
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub thread_id: ThreadId,
    pub step_index: u32,
    pub task_ordinal: u32,
    pub resume: Option<ResumePayload>,
}

#[derive(Debug, Clone)]
pub struct ResumePayload {
    pub interrupt_id: String,
    pub payload: serde_json::Value,
}

/// Node execution contract. Implementors receive a read-only `StoreView`
/// composed of the pre-step global store and the task's local overlay.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn run(&self, view: &StoreView<'_>, ctx: &RunContext) -> Result<NodeOutput>;
}

#[async_trait]
impl<F> NodeExecutor for F
where
    F: Fn(&StoreView<'_>, &RunContext) -> Result<NodeOutput> + Send + Sync,
{
    async fn run(&self, view: &StoreView<'_>, ctx: &RunContext) -> Result<NodeOutput> {
        (self)(view, ctx)
    }
}

/// A router's verdict for where a task's output routes after a node that
/// requested `useGraphEdges` (spec §4.5.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterDecision {
    UseGraphEdges,
    End,
    Nodes(Vec<NodeId>),
}

pub trait Router: Send + Sync {
    fn route(&self, view: &StoreView<'_>) -> RouterDecision;
}

impl<F> Router for F
where
    F: Fn(&StoreView<'_>) -> RouterDecision + Send + Sync,
{
    fn route(&self, view: &StoreView<'_>) -> RouterDecision {
        (self)(view)
    }
}

pub struct NodeSpec {
    pub id: NodeId,
    pub retry_policy: RetryPolicy,
    pub run: Arc<dyn NodeExecutor>,
    pub run_when: RunWhen,
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("id", &self.id)
            .field("retry_policy", &self.retry_policy)
            .field("run_when", &self.run_when)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub id: JoinId,
    pub parents: Vec<NodeId>,
    pub target: NodeId,
}

impl JoinEdge {
    /// `id = "join:" + parents.join("+") + ":" + target` (spec §3.4). Parents
    /// must already be sorted and unique before calling this.
    pub fn derive_id(parents: &[NodeId], target: &NodeId) -> JoinId {
        format!("join:{}:{}", parents.join("+"), target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputProjection {
    FullStore,
    Channels(Vec<String>),
}

/// The validated, immutable structure produced by the compiler (spec §3.4,
/// §4.2). Edges are kept both in insertion order and grouped by source.
pub struct CompiledGraph {
    pub start: Vec<NodeId>,
    pub nodes: HashMap<NodeId, NodeSpec>,
    pub static_edges: Vec<(NodeId, NodeId)>,
    pub edges_by_from: HashMap<NodeId, Vec<NodeId>>,
    pub routers: HashMap<NodeId, Arc<dyn Router>>,
    pub join_edges: Vec<JoinEdge>,
    pub joins_by_target: HashMap<NodeId, Vec<JoinId>>,
    pub output_projection: OutputProjection,
    pub schema_version: String,
    pub graph_version: String,
}

impl CompiledGraph {
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn static_successors(&self, from: &str) -> &[NodeId] {
        self.edges_by_from.get(from).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has_non_default_run_when(&self) -> bool {
        self.nodes.values().any(|n| !n.run_when.is_default())
    }
}
