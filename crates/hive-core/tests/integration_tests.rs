//! End-to-end scenarios driving `Runtime` over small hand-built graphs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hive_core::{
    json_codec, ChannelRegistry, ChannelScope, ChannelSpec, CheckpointPolicy, CheckpointStore, EventKind,
    GraphBuilder, HiveError, InMemoryCheckpointStore, NextRouting, NodeOutput, Outcome, Persistence, Reducer,
    RetryPolicy, RunOptions, Runtime, RunWhen, UpdatePolicy, Write,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn counter_channel(id: &str) -> ChannelSpec {
    ChannelSpec {
        id: id.to_string(),
        value_type_id: "int".to_string(),
        scope: ChannelScope::Global,
        reducer: Reducer::LastWriteWins,
        update_policy: UpdatePolicy::Multi,
        initial: Arc::new(|| json!(0)),
        codec: Some(json_codec()),
        persistence: Persistence::Checkpointed,
    }
}

fn task_local_channel(id: &str) -> ChannelSpec {
    ChannelSpec {
        id: id.to_string(),
        value_type_id: "json".to_string(),
        scope: ChannelScope::TaskLocal,
        reducer: Reducer::LastWriteWins,
        update_policy: UpdatePolicy::Multi,
        initial: Arc::new(|| json!(null)),
        codec: Some(json_codec()),
        persistence: Persistence::Checkpointed,
    }
}

fn log_channel(id: &str) -> ChannelSpec {
    ChannelSpec {
        id: id.to_string(),
        value_type_id: "json".to_string(),
        scope: ChannelScope::Global,
        reducer: Reducer::Append,
        update_policy: UpdatePolicy::Multi,
        initial: Arc::new(|| json!([])),
        codec: Some(json_codec()),
        persistence: Persistence::Checkpointed,
    }
}

#[tokio::test]
async fn hello_world_runs_one_node_to_completion() {
    let registry = ChannelRegistry::new(vec![log_channel("messages")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("greet")
        .add_node(
            "greet",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput {
                    writes: vec![Write::new("messages", json!("hello"))],
                    ..Default::default()
                })
            }),
        )
        .compile(&registry)
        .unwrap();

    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph));
    let result = runtime
        .run("thread-1".to_string(), Default::default(), RunOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    match result.outcome {
        Outcome::Finished { output: hive_core::Output::FullStore(map), .. } => {
            assert_eq!(map["messages"], json!(["hello"]));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn router_branches_on_channel_value() {
    let registry = ChannelRegistry::new(vec![counter_channel("score"), log_channel("path")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("score_node")
        .add_node(
            "score_node",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput { writes: vec![Write::new("score", json!(7))], ..Default::default() })
            }),
        )
        .add_node(
            "high",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput { writes: vec![Write::new("path", json!("high"))], ..Default::default() })
            }),
        )
        .add_node(
            "low",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput { writes: vec![Write::new("path", json!("low"))], ..Default::default() })
            }),
        )
        .add_router(
            "score_node",
            Arc::new(|view: &hive_core::store::StoreView<'_>| {
                let score = view.get("score").and_then(|v| v.as_i64()).unwrap_or(0);
                if score >= 5 {
                    hive_core::RouterDecision::Nodes(vec!["high".to_string()])
                } else {
                    hive_core::RouterDecision::Nodes(vec!["low".to_string()])
                }
            }),
        )
        .compile(&registry)
        .unwrap();

    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph));
    let result = runtime
        .run("thread-branch".to_string(), Default::default(), RunOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    match result.outcome {
        Outcome::Finished { output: hive_core::Output::FullStore(map), .. } => {
            assert_eq!(map["path"], json!(["high"]));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn fan_out_then_join_waits_for_every_parent() {
    let registry = ChannelRegistry::new(vec![log_channel("results")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("split")
        .add_node(
            "split",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| Ok(NodeOutput { next: NextRouting::Nodes(vec!["a".into(), "b".into()]), ..Default::default() })),
        )
        .add_node(
            "a",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| Ok(NodeOutput { writes: vec![Write::new("results", json!("a"))], ..Default::default() })),
        )
        .add_node(
            "b",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| Ok(NodeOutput { writes: vec![Write::new("results", json!("b"))], ..Default::default() })),
        )
        .add_node(
            "joined",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| Ok(NodeOutput { writes: vec![Write::new("results", json!("joined"))], ..Default::default() })),
        )
        .add_join_edge(vec!["a".into(), "b".into()], "joined")
        .compile(&registry)
        .unwrap();

    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph));
    let result = runtime
        .run("thread-join".to_string(), Default::default(), RunOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    match result.outcome {
        Outcome::Finished { output: hive_core::Output::FullStore(map), .. } => {
            let results = map["results"].as_array().unwrap();
            assert!(results.contains(&json!("a")));
            assert!(results.contains(&json!("b")));
            assert!(results.contains(&json!("joined")));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn interrupt_then_resume_delivers_payload() {
    let registry = ChannelRegistry::new(vec![log_channel("log")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("ask")
        .add_node(
            "ask",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, ctx: &hive_core::RunContext| {
                if let Some(resume) = &ctx.resume {
                    return Ok(NodeOutput {
                        writes: vec![Write::new("log", resume.payload.clone())],
                        next: NextRouting::End,
                        ..Default::default()
                    });
                }
                Ok(NodeOutput {
                    interrupt: Some(hive_core::InterruptRequest { payload: json!("need input") }),
                    ..Default::default()
                })
            }),
        )
        .add_edge("ask", "ask")
        .compile(&registry)
        .unwrap();

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph)).with_checkpoint_store(store);

    let options = RunOptions {
        checkpoint_policy: CheckpointPolicy::OnInterrupt,
        ..Default::default()
    };

    let first = runtime
        .run("thread-interrupt".to_string(), Default::default(), options.clone(), CancellationToken::new())
        .await
        .unwrap();

    let (interrupt_id, payload) = match first.outcome {
        Outcome::Interrupted { interrupt_id, payload, .. } => (interrupt_id, payload),
        other => panic!("expected Interrupted, got {other:?}"),
    };
    assert_eq!(payload, json!("need input"));

    let second = runtime
        .resume("thread-interrupt".to_string(), interrupt_id, json!("answer"), options, CancellationToken::new())
        .await
        .unwrap();

    match second.outcome {
        Outcome::Finished { output: hive_core::Output::FullStore(map), .. } => {
            assert_eq!(map["log"], json!(["answer"]));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn external_writes_persist_without_running_nodes() {
    let registry = ChannelRegistry::new(vec![counter_channel("budget")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("noop")
        .add_node("noop", Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| Ok(NodeOutput { next: NextRouting::End, ..Default::default() })))
        .compile(&registry)
        .unwrap();

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph)).with_checkpoint_store(store);

    let mut writes = std::collections::HashMap::new();
    writes.insert("budget".to_string(), json!(42));
    let outcome = runtime.apply_external_writes("thread-ext".to_string(), writes).await.unwrap();

    match outcome {
        Outcome::Finished { output: hive_core::Output::FullStore(map), checkpoint_id } => {
            assert_eq!(map["budget"], json!(42));
            assert!(checkpoint_id.is_some());
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn retrying_node_succeeds_after_transient_failures() {
    let registry = ChannelRegistry::new(vec![counter_channel("attempts")]).unwrap();
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_in_node = attempts.clone();

    let graph = GraphBuilder::new()
        .add_start("flaky")
        .add_node_with(
            "flaky",
            Arc::new(move |_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                let n = attempts_in_node.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    return Err(hive_core::HiveError::InternalInvariantViolation("not yet".to_string()));
                }
                Ok(NodeOutput { writes: vec![Write::new("attempts", json!(n))], ..Default::default() })
            }),
            RetryPolicy::exponential_backoff(1, 1.0, 5, 1_000),
            RunWhen::Always,
        )
        .compile(&registry)
        .unwrap();

    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph));
    let result = runtime
        .run("thread-retry".to_string(), Default::default(), RunOptions::default(), CancellationToken::new())
        .await
        .unwrap();

    match result.outcome {
        Outcome::Finished { output: hive_core::Output::FullStore(map), .. } => {
            assert_eq!(map["attempts"], json!(3));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancellation_before_a_step_stops_without_committing() {
    let registry = ChannelRegistry::new(vec![counter_channel("never_written")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("slow")
        .add_node(
            "slow",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput { writes: vec![Write::new("never_written", json!(1))], ..Default::default() })
            }),
        )
        .compile(&registry)
        .unwrap();

    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = runtime
        .run("thread-cancel".to_string(), Default::default(), RunOptions::default(), cancel)
        .await
        .unwrap();

    match result.outcome {
        Outcome::Cancelled { output: hive_core::Output::FullStore(map), .. } => {
            assert_eq!(map["never_written"], json!(0));
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
}

#[tokio::test]
async fn checkpoint_round_trips_through_a_fresh_runtime_handle() {
    let registry = Arc::new(ChannelRegistry::new(vec![log_channel("trail")]).unwrap());
    let graph = Arc::new(
        GraphBuilder::new()
            .add_start("step_one")
            .add_node(
                "step_one",
                Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                    Ok(NodeOutput { writes: vec![Write::new("trail", json!("one"))], next: NextRouting::End, ..Default::default() })
                }),
            )
            .compile(&registry)
            .unwrap(),
    );

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let options = RunOptions {
        checkpoint_policy: CheckpointPolicy::EveryStep,
        ..Default::default()
    };

    {
        let runtime = Runtime::new(registry.clone(), graph.clone()).with_checkpoint_store(store.clone());
        runtime
            .run("thread-persist".to_string(), Default::default(), options.clone(), CancellationToken::new())
            .await
            .unwrap();
    }

    // The checkpoint is durable: a brand-new Runtime handle can load it
    // straight from the store without replaying the attempt (spec §4.5.5).
    let loaded = store.load_latest(&"thread-persist".to_string()).await.unwrap().expect("checkpoint saved");
    assert_eq!(loaded.schema_version, graph.schema_version);
    assert_eq!(loaded.graph_version, graph.graph_version);
    assert!(loaded.frontier.is_empty());
    let _ = (registry, graph);
}

#[tokio::test]
async fn external_writes_advance_the_step_index() {
    let registry = ChannelRegistry::new(vec![counter_channel("budget")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("noop")
        .add_node("noop", Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| Ok(NodeOutput { next: NextRouting::End, ..Default::default() })))
        .compile(&registry)
        .unwrap();

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph)).with_checkpoint_store(store.clone());

    let mut first_write = std::collections::HashMap::new();
    first_write.insert("budget".to_string(), json!(1));
    runtime.apply_external_writes("thread-ext-step".to_string(), first_write).await.unwrap();
    let after_first = store.load_latest(&"thread-ext-step".to_string()).await.unwrap().expect("checkpoint saved");

    let mut second_write = std::collections::HashMap::new();
    second_write.insert("budget".to_string(), json!(2));
    runtime.apply_external_writes("thread-ext-step".to_string(), second_write).await.unwrap();
    let after_second = store.load_latest(&"thread-ext-step".to_string()).await.unwrap().expect("checkpoint saved");

    assert_eq!(after_second.step_index, after_first.step_index + 1);
}

#[tokio::test]
async fn checkpoint_saved_event_precedes_step_finished() {
    let registry = ChannelRegistry::new(vec![log_channel("trail")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("step_one")
        .add_node(
            "step_one",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput { writes: vec![Write::new("trail", json!("one"))], next: NextRouting::End, ..Default::default() })
            }),
        )
        .compile(&registry)
        .unwrap();

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph)).with_checkpoint_store(store);
    let options = RunOptions { checkpoint_policy: CheckpointPolicy::EveryStep, ..Default::default() };

    let result = runtime
        .run("thread-checkpoint-event".to_string(), Default::default(), options, CancellationToken::new())
        .await
        .unwrap();

    let checkpoint_pos = result
        .events
        .iter()
        .position(|e| matches!(e.kind, EventKind::CheckpointSaved { .. }))
        .expect("a CheckpointSaved event was emitted");
    let step_finished_pos = result
        .events
        .iter()
        .position(|e| matches!(e.kind, EventKind::StepFinished { .. }))
        .expect("a StepFinished event was emitted");
    assert!(checkpoint_pos < step_finished_pos);
}

#[tokio::test]
async fn task_local_write_via_external_writes_is_rejected() {
    let registry = ChannelRegistry::new(vec![task_local_channel("scratch")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("noop")
        .add_node("noop", Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| Ok(NodeOutput { next: NextRouting::End, ..Default::default() })))
        .compile(&registry)
        .unwrap();

    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph));
    let mut writes = std::collections::HashMap::new();
    writes.insert("scratch".to_string(), json!("nope"));

    let err = runtime.apply_external_writes("thread-task-local".to_string(), writes).await.unwrap_err();
    match err {
        HiveError::TaskLocalWriteNotAllowed(id) => assert_eq!(id, "scratch"),
        other => panic!("expected TaskLocalWriteNotAllowed, got {other:?}"),
    }
}

#[tokio::test]
async fn mismatched_write_type_is_rejected() {
    let registry = ChannelRegistry::new(vec![counter_channel("score")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("bad_write")
        .add_node(
            "bad_write",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, _ctx: &hive_core::RunContext| {
                Ok(NodeOutput { writes: vec![Write::new("score", json!("not a number"))], ..Default::default() })
            }),
        )
        .compile(&registry)
        .unwrap();

    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph));
    let result = runtime
        .run("thread-type-mismatch".to_string(), Default::default(), RunOptions::default(), CancellationToken::new())
        .await;
    let err = match result {
        Err(e) => e,
        Ok(_) => panic!("expected ChannelTypeMismatch, got Ok"),
    };

    match err {
        HiveError::ChannelTypeMismatch { channel, expected, actual } => {
            assert_eq!(channel, "score");
            assert_eq!(expected, "int");
            assert_eq!(actual, "string");
        }
        other => panic!("expected ChannelTypeMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelling_a_resumed_attempt_before_its_first_commit_keeps_the_interruption() {
    let registry = ChannelRegistry::new(vec![log_channel("log")]).unwrap();
    let graph = GraphBuilder::new()
        .add_start("ask")
        .add_node(
            "ask",
            Arc::new(|_view: &hive_core::store::StoreView<'_>, ctx: &hive_core::RunContext| {
                if let Some(resume) = &ctx.resume {
                    return Ok(NodeOutput {
                        writes: vec![Write::new("log", resume.payload.clone())],
                        next: NextRouting::End,
                        ..Default::default()
                    });
                }
                Ok(NodeOutput {
                    interrupt: Some(hive_core::InterruptRequest { payload: json!("need input") }),
                    ..Default::default()
                })
            }),
        )
        .add_edge("ask", "ask")
        .compile(&registry)
        .unwrap();

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::new(registry), Arc::new(graph)).with_checkpoint_store(store);
    let options = RunOptions { checkpoint_policy: CheckpointPolicy::OnInterrupt, ..Default::default() };

    let first = runtime
        .run("thread-resume-cancel".to_string(), Default::default(), options.clone(), CancellationToken::new())
        .await
        .unwrap();
    let interrupt_id = match first.outcome {
        Outcome::Interrupted { interrupt_id, .. } => interrupt_id,
        other => panic!("expected Interrupted, got {other:?}"),
    };

    let cancel = CancellationToken::new();
    cancel.cancel();
    let cancelled = runtime
        .resume("thread-resume-cancel".to_string(), interrupt_id.clone(), json!("answer"), options.clone(), cancel)
        .await
        .unwrap();
    match cancelled.outcome {
        Outcome::Cancelled { .. } => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }

    // The interruption is still pending, so resuming again with the same id succeeds.
    let second = runtime
        .resume("thread-resume-cancel".to_string(), interrupt_id, json!("answer"), options, CancellationToken::new())
        .await
        .unwrap();
    match second.outcome {
        Outcome::Finished { output: hive_core::Output::FullStore(map), .. } => {
            assert_eq!(map["log"], json!(["answer"]));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}
