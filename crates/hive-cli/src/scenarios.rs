//! Builtin demo graphs, one per end-to-end scenario this crate's tests
//! cover (spec §8.2). The CLI has no surface DSL for loading graphs from a
//! file — `GraphBuilder` is a Rust API — so `hive run`/`hive graph`/
//! `hive checkpoints` all operate on one of these named scenarios.

use std::sync::Arc;

use hive_core::store::Overlay;
use hive_core::{
    json_codec, ChannelRegistry, ChannelScope, ChannelSpec, CompiledGraph, GraphBuilder, NextRouting, NodeOutput,
    Persistence, Reducer, RouterDecision, TaskSeed, UpdatePolicy, Write,
};
use serde_json::json;

pub const SCENARIO_NAMES: &[&str] = &["hello-world", "branch-on-score", "fan-out-join"];

pub struct Scenario {
    pub registry: ChannelRegistry,
    pub graph: CompiledGraph,
}

pub fn build(name: &str) -> Option<Scenario> {
    match name {
        "hello-world" => Some(hello_world()),
        "branch-on-score" => Some(branch_on_score()),
        "fan-out-join" => Some(fan_out_join()),
        _ => None,
    }
}

fn last_write_wins(id: &str, initial: serde_json::Value) -> ChannelSpec {
    ChannelSpec {
        id: id.to_string(),
        value_type_id: "json".to_string(),
        scope: ChannelScope::Global,
        reducer: Reducer::LastWriteWins,
        update_policy: UpdatePolicy::Multi,
        initial: Arc::new(move || initial.clone()),
        codec: Some(json_codec()),
        persistence: Persistence::Checkpointed,
    }
}

/// Scenario 1: one start node writes `message` then ends (spec §8.2.1).
fn hello_world() -> Scenario {
    let registry = ChannelRegistry::new(vec![last_write_wins("message", json!(""))]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("greet")
        .add_node(
            "greet",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput {
                    writes: vec![Write::new("message", json!("Hello from Hive!"))],
                    ..Default::default()
                })
            }),
        )
        .compile(&registry)
        .unwrap();
    Scenario { registry, graph }
}

/// Scenario 2: `check` writes a score, a router sends the attempt down
/// `pass` or `fail` (spec §8.2.2).
fn branch_on_score() -> Scenario {
    let registry =
        ChannelRegistry::new(vec![last_write_wins("score", json!(0)), last_write_wins("result", json!(""))])
            .unwrap();
    let graph = GraphBuilder::new()
        .add_start("check")
        .add_node(
            "check",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput { writes: vec![Write::new("score", json!(85))], ..Default::default() })
            }),
        )
        .add_router(
            "check",
            Arc::new(|view: &hive_core::store::StoreView<'_>| {
                let score = view.get("score").and_then(|v| v.as_i64()).unwrap_or(0);
                if score >= 70 {
                    RouterDecision::Nodes(vec!["pass".into()])
                } else {
                    RouterDecision::Nodes(vec!["fail".into()])
                }
            }),
        )
        .add_node(
            "pass",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput {
                    writes: vec![Write::new("result", json!("passed"))],
                    next: NextRouting::End,
                    ..Default::default()
                })
            }),
        )
        .add_node(
            "fail",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput {
                    writes: vec![Write::new("result", json!("failed"))],
                    next: NextRouting::End,
                    ..Default::default()
                })
            }),
        )
        .compile(&registry)
        .unwrap();
    Scenario { registry, graph }
}

/// Scenario 3: `dispatch` fans out task-local `item` seeds to `worker`,
/// a join edge gates `review`, which interrupts for approval before
/// routing to `done` (spec §8.2.3).
fn fan_out_join() -> Scenario {
    let item_channel = ChannelSpec {
        id: "item".to_string(),
        value_type_id: "json".to_string(),
        scope: ChannelScope::TaskLocal,
        reducer: Reducer::LastWriteWins,
        update_policy: UpdatePolicy::Multi,
        initial: Arc::new(|| json!("")),
        codec: Some(json_codec()),
        persistence: Persistence::Checkpointed,
    };
    let results_channel = ChannelSpec {
        id: "results".to_string(),
        value_type_id: "json".to_string(),
        scope: ChannelScope::Global,
        reducer: Reducer::Append,
        update_policy: UpdatePolicy::Multi,
        initial: Arc::new(|| json!([])),
        codec: Some(json_codec()),
        persistence: Persistence::Checkpointed,
    };
    let registry = ChannelRegistry::new(vec![item_channel, results_channel, last_write_wins("status", json!(""))])
        .unwrap();

    let graph = GraphBuilder::new()
        .add_start("dispatch")
        .add_node(
            "dispatch",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                let spawn = ["a", "b", "c"]
                    .iter()
                    .map(|item| {
                        let mut overlay = Overlay::new();
                        overlay.set("item", json!(item));
                        TaskSeed::new("worker", overlay)
                    })
                    .collect();
                Ok(NodeOutput { spawn, next: NextRouting::End, ..Default::default() })
            }),
        )
        .add_node(
            "worker",
            Arc::new(|view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                let item = view.get("item").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
                Ok(NodeOutput {
                    writes: vec![Write::new("results", json!(item.to_uppercase()))],
                    next: NextRouting::End,
                    ..Default::default()
                })
            }),
        )
        .add_node(
            "review",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, ctx: &hive_core::RunContext| {
                if ctx.resume.is_some() {
                    return Ok(NodeOutput { next: NextRouting::Nodes(vec!["done".into()]), ..Default::default() });
                }
                Ok(NodeOutput {
                    interrupt: Some(hive_core::InterruptRequest { payload: json!("Approve results?") }),
                    ..Default::default()
                })
            }),
        )
        .add_node(
            "done",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput {
                    writes: vec![Write::new("status", json!("completed"))],
                    next: NextRouting::End,
                    ..Default::default()
                })
            }),
        )
        .add_edge("review", "review")
        .add_join_edge(vec!["worker".into()], "review")
        .compile(&registry)
        .unwrap();
    Scenario { registry, graph }
}
