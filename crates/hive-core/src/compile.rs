//! Graph builder and compiler (spec §4.2). Validation chooses the
//! lexicographically smallest offending id whenever a check has more than
//! one violation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::{HiveError, Result};
use crate::graph::{CompiledGraph, JoinEdge, NodeExecutor, NodeSpec, OutputProjection, Router, RunWhen};
use crate::ids::{validate_node_id, NodeId};
use crate::retry::RetryPolicy;
use crate::schema::{ChannelRegistry, ChannelScope};

pub struct GraphBuilder {
    start: Vec<NodeId>,
    nodes: Vec<NodeSpec>,
    static_edges: Vec<(NodeId, NodeId)>,
    routers: Vec<(NodeId, Arc<dyn Router>)>,
    join_edges: Vec<(Vec<NodeId>, NodeId)>,
    output_projection: OutputProjection,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            start: Vec::new(),
            nodes: Vec::new(),
            static_edges: Vec::new(),
            routers: Vec::new(),
            join_edges: Vec::new(),
            output_projection: OutputProjection::FullStore,
        }
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_start(mut self, node_id: impl Into<NodeId>) -> Self {
        self.start.push(node_id.into());
        self
    }

    pub fn add_node(mut self, id: impl Into<NodeId>, run: Arc<dyn NodeExecutor>) -> Self {
        self.nodes.push(NodeSpec {
            id: id.into(),
            retry_policy: RetryPolicy::default(),
            run,
            run_when: RunWhen::default(),
        });
        self
    }

    pub fn add_node_with(
        mut self,
        id: impl Into<NodeId>,
        run: Arc<dyn NodeExecutor>,
        retry_policy: RetryPolicy,
        run_when: RunWhen,
    ) -> Self {
        self.nodes.push(NodeSpec {
            id: id.into(),
            retry_policy,
            run,
            run_when,
        });
        self
    }

    pub fn add_edge(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        self.static_edges.push((from.into(), to.into()));
        self
    }

    pub fn add_router(mut self, from: impl Into<NodeId>, router: Arc<dyn Router>) -> Self {
        self.routers.push((from.into(), router));
        self
    }

    pub fn add_join_edge(mut self, parents: Vec<NodeId>, target: impl Into<NodeId>) -> Self {
        self.join_edges.push((parents, target.into()));
        self
    }

    pub fn with_output_projection(mut self, projection: OutputProjection) -> Self {
        self.output_projection = projection;
        self
    }

    pub fn compile(self, registry: &ChannelRegistry) -> Result<CompiledGraph> {
        let node_ids: HashMap<NodeId, usize> = {
            let mut m = HashMap::new();
            let mut dup: Vec<NodeId> = Vec::new();
            for (idx, n) in self.nodes.iter().enumerate() {
                if m.insert(n.id.clone(), idx).is_some() {
                    dup.push(n.id.clone());
                }
            }
            dup.sort();
            if let Some(smallest) = dup.into_iter().next() {
                return Err(HiveError::DuplicateNodeId(smallest));
            }
            m
        };

        let mut reserved: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| validate_node_id(&n.id).is_err())
            .map(|n| n.id.clone())
            .collect();
        reserved.sort();
        if let Some(smallest) = reserved.into_iter().next() {
            return Err(HiveError::InvalidNodeIdContainsReservedJoinCharacters(smallest));
        }

        if self.start.is_empty() {
            return Err(HiveError::StartEmpty);
        }
        {
            let mut seen = HashSet::new();
            let mut dup: Vec<NodeId> = Vec::new();
            for s in &self.start {
                if !seen.insert(s.clone()) {
                    dup.push(s.clone());
                }
            }
            dup.sort();
            if let Some(smallest) = dup.into_iter().next() {
                return Err(HiveError::DuplicateStartNode(smallest));
            }
        }
        {
            let mut unknown: Vec<NodeId> = self
                .start
                .iter()
                .filter(|s| !node_ids.contains_key(s.as_str()))
                .cloned()
                .collect();
            unknown.sort();
            if let Some(smallest) = unknown.into_iter().next() {
                return Err(HiveError::UnknownStartNode(smallest));
            }
        }

        {
            let mut unknown: Vec<NodeId> = self
                .static_edges
                .iter()
                .flat_map(|(from, to)| [from.clone(), to.clone()])
                .filter(|id| !node_ids.contains_key(id.as_str()))
                .collect();
            unknown.sort();
            if let Some(smallest) = unknown.into_iter().next() {
                return Err(HiveError::UnknownEdgeEndpoint(smallest));
            }
        }

        {
            let mut seen_from = HashSet::new();
            let mut dup: Vec<NodeId> = Vec::new();
            for (from, _) in &self.routers {
                if !seen_from.insert(from.clone()) {
                    dup.push(from.clone());
                }
            }
            dup.sort();
            if let Some(smallest) = dup.into_iter().next() {
                return Err(HiveError::DuplicateRouter(smallest));
            }
            let mut unknown: Vec<NodeId> = self
                .routers
                .iter()
                .map(|(from, _)| from.clone())
                .filter(|id| !node_ids.contains_key(id.as_str()))
                .collect();
            unknown.sort();
            if let Some(smallest) = unknown.into_iter().next() {
                return Err(HiveError::UnknownRouterFrom(smallest));
            }
        }

        let mut join_edges = Vec::new();
        {
            let mut invalid: Vec<(NodeId, String)> = Vec::new();
            let mut unknown_parent: Vec<NodeId> = Vec::new();
            let mut unknown_target: Vec<NodeId> = Vec::new();
            let mut seen_ids = HashSet::new();
            let mut dup_ids: Vec<String> = Vec::new();

            for (parents, target) in &self.join_edges {
                let mut sorted_parents = parents.clone();
                sorted_parents.sort();
                sorted_parents.dedup();
                let id = JoinEdge::derive_id(&sorted_parents, target);

                if sorted_parents.is_empty() {
                    invalid.push((id.clone(), "parents must be non-empty".to_string()));
                } else if sorted_parents.contains(target) {
                    invalid.push((id.clone(), "parents must not contain the target".to_string()));
                }

                for p in &sorted_parents {
                    if !node_ids.contains_key(p.as_str()) {
                        unknown_parent.push(p.clone());
                    }
                }
                if !node_ids.contains_key(target.as_str()) {
                    unknown_target.push(target.clone());
                }

                if !seen_ids.insert(id.clone()) {
                    dup_ids.push(id.clone());
                }

                join_edges.push(JoinEdge {
                    id,
                    parents: sorted_parents,
                    target: target.clone(),
                });
            }

            invalid.sort();
            if let Some((id, reason)) = invalid.into_iter().next() {
                return Err(HiveError::InvalidJoinEdge(id, reason));
            }
            unknown_parent.sort();
            if let Some(smallest) = unknown_parent.into_iter().next() {
                return Err(HiveError::UnknownJoinParent(smallest));
            }
            unknown_target.sort();
            if let Some(smallest) = unknown_target.into_iter().next() {
                return Err(HiveError::UnknownJoinTarget(smallest));
            }
            dup_ids.sort();
            if let Some(smallest) = dup_ids.into_iter().next() {
                return Err(HiveError::DuplicateJoinEdge(smallest));
            }
        }

        if let OutputProjection::Channels(channels) = &self.output_projection {
            let mut unknown: Vec<String> = Vec::new();
            let mut task_local: Vec<String> = Vec::new();
            for c in channels {
                match registry.get(c) {
                    None => unknown.push(c.clone()),
                    Some(spec) if spec.scope == ChannelScope::TaskLocal => task_local.push(c.clone()),
                    Some(_) => {}
                }
            }
            unknown.sort();
            if let Some(smallest) = unknown.into_iter().next() {
                return Err(HiveError::OutputProjectionUnknownChannel(smallest));
            }
            task_local.sort();
            if let Some(smallest) = task_local.into_iter().next() {
                return Err(HiveError::OutputProjectionIncludesTaskLocal(smallest));
            }
        }

        let mut edges_by_from: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (from, to) in &self.static_edges {
            edges_by_from.entry(from.clone()).or_default().push(to.clone());
        }

        let mut joins_by_target: HashMap<NodeId, Vec<String>> = HashMap::new();
        for j in &join_edges {
            joins_by_target.entry(j.target.clone()).or_default().push(j.id.clone());
        }

        let routers: HashMap<NodeId, Arc<dyn Router>> = self.routers.into_iter().collect();
        let nodes_map: HashMap<NodeId, NodeSpec> =
            self.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let schema_version = compute_schema_version(registry);
        let graph_version = compute_graph_version(
            &nodes_map,
            &self.static_edges,
            &join_edges,
            &routers,
            &self.output_projection,
        );

        Ok(CompiledGraph {
            start: self.start,
            nodes: nodes_map,
            static_edges: self.static_edges,
            edges_by_from,
            routers,
            join_edges,
            joins_by_target,
            output_projection: self.output_projection,
            schema_version,
            graph_version,
        })
    }
}

fn reducer_tag(reducer: &crate::reducer::Reducer) -> &'static str {
    match reducer {
        crate::reducer::Reducer::LastWriteWins => "lastWriteWins",
        crate::reducer::Reducer::Append => "append",
        crate::reducer::Reducer::SetUnion => "setUnion",
        crate::reducer::Reducer::DictionaryMerge => "dictionaryMerge",
        crate::reducer::Reducer::Barrier => "barrier",
        crate::reducer::Reducer::Topic { .. } => "topic",
    }
}

fn compute_schema_version(registry: &ChannelRegistry) -> String {
    let mut hasher = Sha256::new();
    for spec in registry.sorted() {
        hasher.update(spec.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(match spec.scope {
            ChannelScope::Global => b"global".as_slice(),
            ChannelScope::TaskLocal => b"taskLocal".as_slice(),
        });
        hasher.update([0u8]);
        hasher.update(match spec.persistence {
            crate::schema::Persistence::Checkpointed => b"checkpointed".as_slice(),
            crate::schema::Persistence::Untracked => b"untracked".as_slice(),
        });
        hasher.update([0u8]);
        hasher.update(reducer_tag(&spec.reducer).as_bytes());
        hasher.update([0u8]);
        hasher.update(match spec.update_policy {
            crate::schema::UpdatePolicy::Single => b"single".as_slice(),
            crate::schema::UpdatePolicy::Multi => b"multi".as_slice(),
        });
        hasher.update([0u8]);
        hasher.update(spec.codec.as_ref().map(|c| c.codec_id()).unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(spec.value_type_id.as_bytes());
        hasher.update([0u8]);
    }
    format!("H1:{}", hex::encode(hasher.finalize()))
}

fn compute_graph_version(
    nodes: &HashMap<NodeId, NodeSpec>,
    static_edges: &[(NodeId, NodeId)],
    join_edges: &[JoinEdge],
    routers: &HashMap<NodeId, Arc<dyn Router>>,
    output_projection: &OutputProjection,
) -> String {
    let has_triggers = nodes.values().any(|n| !n.run_when.is_default());
    let format_tag = if has_triggers { "HGV2" } else { "HGV1" };

    let mut hasher = Sha256::new();
    hasher.update(format_tag.as_bytes());

    let mut node_ids: Vec<&NodeId> = nodes.keys().collect();
    node_ids.sort();
    for id in &node_ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }

    for (from, to) in static_edges {
        hasher.update(from.as_bytes());
        hasher.update(b"->");
        hasher.update(to.as_bytes());
        hasher.update([0u8]);
    }

    let mut joins: Vec<&JoinEdge> = join_edges.iter().collect();
    joins.sort_by(|a, b| a.id.cmp(&b.id));
    for j in joins {
        hasher.update(j.id.as_bytes());
        hasher.update([0u8]);
    }

    let mut router_froms: Vec<&NodeId> = routers.keys().collect();
    router_froms.sort();
    for from in router_froms {
        hasher.update(from.as_bytes());
        hasher.update([0u8]);
    }

    match output_projection {
        OutputProjection::FullStore => hasher.update(b"fullStore"),
        OutputProjection::Channels(channels) => {
            let mut sorted = channels.clone();
            sorted.sort();
            hasher.update(b"channels:");
            for c in sorted {
                hasher.update(c.as_bytes());
                hasher.update([0u8]);
            }
        }
    }

    if has_triggers {
        for id in &node_ids {
            let spec = &nodes[*id];
            hasher.update(id.as_bytes());
            match &spec.run_when {
                RunWhen::Always => {
                    hasher.update(b":always");
                }
                RunWhen::AnyOf(channels) => {
                    hasher.update(b":anyOf:");
                    let mut sorted = channels.clone();
                    sorted.sort();
                    for c in sorted {
                        hasher.update(c.as_bytes());
                        hasher.update([0u8]);
                    }
                }
                RunWhen::AllOf(channels) => {
                    hasher.update(b":allOf:");
                    let mut sorted = channels.clone();
                    sorted.sort();
                    for c in sorted {
                        hasher.update(c.as_bytes());
                        hasher.update([0u8]);
                    }
                }
            }
        }
    }

    format!("{format_tag}:{}", hex::encode(hasher.finalize()))
}
