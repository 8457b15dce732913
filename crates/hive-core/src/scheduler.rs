//! Superstep scheduler (spec §4.5). Owns the per-thread state machine; the
//! public entry points live in [`crate::runtime::Runtime`].

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::checkpoint_codec::{self, EncodeInput};
use crate::clock::Clock;
use crate::collaborators::Logger;
use crate::error::{HiveError, Result};
use crate::event::{EventBuffer, EventKind};
use crate::fingerprint::{interrupt_id, task_id, task_local_fingerprint};
use crate::graph::{CompiledGraph, ResumePayload, RouterDecision, RunContext};
use crate::ids::{AttemptId, ChannelId, JoinId, NodeId, RunId, ThreadId};
use crate::options::CheckpointPolicy;
use crate::schema::ChannelRegistry;
use crate::store::{GlobalStore, InitialCache, Overlay, StoreView};
use crate::task::{FrontierTask, NextRouting, Provenance, Task, TaskSeed};
use crate::triggers;
use crate::value::{describe_value_kind, payload_hash, value_matches_type};
use crate::write::Write;
use hive_checkpoint::{CheckpointSource, CheckpointStore};

/// Per-thread state carried between attempts (spec §4.5 "State per thread").
#[derive(Clone)]
pub struct ThreadState {
    pub run_id: RunId,
    pub step_index: u32,
    pub global: GlobalStore,
    pub frontier: Vec<FrontierTask>,
    pub join_seen_parents: HashMap<JoinId, Vec<NodeId>>,
    pub interruption: Option<(String, serde_json::Value)>,
    pub latest_checkpoint_id: Option<String>,
    pub channel_versions: HashMap<ChannelId, u64>,
    pub versions_seen_by_node: HashMap<NodeId, HashMap<ChannelId, u64>>,
    pub updated_channels_last_commit: Vec<ChannelId>,
}

impl ThreadState {
    pub fn fresh(registry: &ChannelRegistry, run_id: RunId) -> Self {
        Self {
            run_id,
            step_index: 0,
            global: GlobalStore::fresh(registry),
            frontier: Vec::new(),
            join_seen_parents: HashMap::new(),
            interruption: None,
            latest_checkpoint_id: None,
            channel_versions: HashMap::new(),
            versions_seen_by_node: HashMap::new(),
            updated_channels_last_commit: Vec::new(),
        }
    }
}

pub struct StepOutcome {
    pub next_frontier: Vec<FrontierTask>,
    pub interrupt: Option<(u32, String, serde_json::Value)>,
    pub cancelled: bool,
    /// Set when this step's commit triggered a checkpoint save (interrupt,
    /// mandatory; otherwise per `checkpointPolicy`).
    pub checkpoint_id: Option<String>,
}

struct TaskRunResult {
    outcome: std::result::Result<crate::task::NodeOutput, String>,
}

/// Apply a batch of global writes through each channel's reducer, honoring
/// update policy, and bump the version of every channel actually written
/// (spec §4.5.2). Returns the ids of channels that were updated.
///
/// `reject_task_local` enforces precedence #2 (`TaskLocalWriteNotAllowed`):
/// set on the input/external-writes path, cleared for a normal step commit
/// where task-local writes are routed to `commit_task_local_writes` instead.
pub fn commit_writes(
    registry: &ChannelRegistry,
    global: &mut GlobalStore,
    writes_by_ordinal: &[(u32, Vec<(u32, Write)>)],
    channel_versions: &mut HashMap<ChannelId, u64>,
    reject_task_local: bool,
) -> Result<Vec<ChannelId>> {
    let mut unknown: Vec<ChannelId> = Vec::new();
    let mut task_local_targets: Vec<ChannelId> = Vec::new();
    let mut per_channel: HashMap<ChannelId, Vec<(u32, u32, serde_json::Value)>> = HashMap::new();

    for (task_ordinal, emissions) in writes_by_ordinal {
        for (emission_index, write) in emissions {
            let Some(spec) = registry.get(&write.channel_id) else {
                unknown.push(write.channel_id.clone());
                continue;
            };
            if reject_task_local && spec.scope == crate::schema::ChannelScope::TaskLocal {
                task_local_targets.push(write.channel_id.clone());
                continue;
            }
            per_channel
                .entry(write.channel_id.clone())
                .or_default()
                .push((*task_ordinal, *emission_index, write.value.clone()));
        }
    }
    unknown.sort();
    if let Some(smallest) = unknown.into_iter().next() {
        return Err(HiveError::UnknownChannelId(smallest));
    }

    task_local_targets.sort();
    if let Some(smallest) = task_local_targets.into_iter().next() {
        return Err(HiveError::TaskLocalWriteNotAllowed(smallest));
    }

    let mut type_violations: Vec<(ChannelId, String, String)> = Vec::new();
    for (channel_id, writes) in &per_channel {
        let spec = registry.get(channel_id).unwrap();
        for (_, _, value) in writes {
            if !value_matches_type(value, &spec.value_type_id) {
                type_violations.push((channel_id.clone(), spec.value_type_id.clone(), describe_value_kind(value)));
            }
        }
    }
    type_violations.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some((channel, expected, actual)) = type_violations.into_iter().next() {
        return Err(HiveError::channel_type_mismatch(channel, expected, actual));
    }

    let mut policy_violations: Vec<(ChannelId, usize)> = per_channel
        .iter()
        .filter_map(|(channel_id, writes)| {
            let spec = registry.get(channel_id).unwrap();
            (spec.update_policy == crate::schema::UpdatePolicy::Single && writes.len() > 1)
                .then(|| (channel_id.clone(), writes.len()))
        })
        .collect();
    policy_violations.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some((channel, count)) = policy_violations.into_iter().next() {
        return Err(HiveError::UpdatePolicyViolation { channel, count });
    }

    let mut updated = Vec::new();
    for spec in registry.global_sorted() {
        let Some(writes) = per_channel.get(&spec.id) else {
            continue;
        };
        let mut sorted = writes.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut current = global.get(&spec.id).cloned().unwrap_or_else(|| spec.initial_value());
        for (_, _, value) in sorted {
            current = spec
                .reducer
                .reduce(&spec.id, current, value)
                .map_err(|_| HiveError::reducer_failed(spec.id.clone(), "reduce failed"))?;
        }
        global.set(spec.id.clone(), current);
        *channel_versions.entry(spec.id.clone()).or_insert(0) += 1;
        updated.push(spec.id.clone());
    }

    Ok(updated)
}

/// Apply task-local writes for one task through its channels' reducers.
pub fn commit_task_local_writes(
    registry: &ChannelRegistry,
    overlay: &mut Overlay,
    writes: &[(u32, Write)],
) -> Result<()> {
    let mut per_channel: HashMap<ChannelId, Vec<(u32, serde_json::Value)>> = HashMap::new();
    for (emission_index, write) in writes {
        let Some(spec) = registry.get(&write.channel_id) else {
            return Err(HiveError::UnknownChannelId(write.channel_id.clone()));
        };
        if spec.scope != crate::schema::ChannelScope::TaskLocal {
            continue;
        }
        per_channel
            .entry(write.channel_id.clone())
            .or_default()
            .push((*emission_index, write.value.clone()));
    }

    let mut type_violations: Vec<(ChannelId, String, String)> = Vec::new();
    for (channel_id, writes) in &per_channel {
        let spec = registry.get(channel_id).unwrap();
        for (_, value) in writes {
            if !value_matches_type(value, &spec.value_type_id) {
                type_violations.push((channel_id.clone(), spec.value_type_id.clone(), describe_value_kind(value)));
            }
        }
    }
    type_violations.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some((channel, expected, actual)) = type_violations.into_iter().next() {
        return Err(HiveError::channel_type_mismatch(channel, expected, actual));
    }

    let mut policy_violations: Vec<(ChannelId, usize)> = per_channel
        .iter()
        .filter_map(|(channel_id, writes)| {
            let spec = registry.get(channel_id).unwrap();
            (spec.update_policy == crate::schema::UpdatePolicy::Single && writes.len() > 1)
                .then(|| (channel_id.clone(), writes.len()))
        })
        .collect();
    policy_violations.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some((channel, count)) = policy_violations.into_iter().next() {
        return Err(HiveError::UpdatePolicyViolation { channel, count });
    }

    for spec in registry.task_local_sorted() {
        let Some(writes) = per_channel.get(&spec.id) else {
            continue;
        };
        let mut sorted = writes.clone();
        sorted.sort_by_key(|(ordinal, _)| *ordinal);
        let mut current = overlay.get(&spec.id).cloned().unwrap_or_else(|| spec.initial_value());
        for (_, value) in sorted {
            current = spec
                .reducer
                .reduce(&spec.id, current, value)
                .map_err(|_| HiveError::reducer_failed(spec.id.clone(), "reduce failed"))?;
        }
        overlay.set(spec.id.clone(), current);
    }
    Ok(())
}

pub struct ExecuteStepArgs<'a> {
    pub registry: &'a ChannelRegistry,
    pub graph: &'a CompiledGraph,
    pub clock: &'a dyn Clock,
    pub logger: &'a dyn Logger,
    pub events: &'a EventBuffer,
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub thread_id: &'a ThreadId,
    pub cancel: &'a CancellationToken,
    pub debug_payloads: bool,
    /// Non-`None` only on the first committed step of a resumed attempt.
    pub resume: Option<ResumePayload>,
    pub checkpoint_store: Option<&'a dyn CheckpointStore>,
    pub checkpoint_policy: CheckpointPolicy,
}

/// Execute one superstep to completion: build tasks, run them (with
/// retries), commit, compute the next frontier, and — if an interrupt was
/// selected or the checkpoint policy matches the new step index — save a
/// checkpoint before `stepFinished` (spec §4.4 canonical event order).
/// Mutates `state` in place.
pub async fn execute_step(args: ExecuteStepArgs<'_>, state: &mut ThreadState) -> Result<StepOutcome> {
    let ExecuteStepArgs {
        registry,
        graph,
        clock,
        logger,
        events,
        run_id,
        attempt_id,
        thread_id,
        cancel,
        debug_payloads,
        resume,
        checkpoint_store,
        checkpoint_policy,
    } = args;

    let resume_was_present = resume.is_some();
    let step_index = state.step_index;
    let frontier_count = state.frontier.len() as u32;
    let initial_cache = InitialCache::build(registry);

    let mut tasks: Vec<Task> = Vec::with_capacity(state.frontier.len());
    for (ordinal, frontier_task) in state.frontier.iter().enumerate() {
        let ordinal_u32 = u32::try_from(ordinal).map_err(|_| HiveError::TaskOrdinalOutOfRange(ordinal as u64))?;
        let fingerprint = task_local_fingerprint(registry, &frontier_task.seed.overlay)?;
        let id = task_id(run_id, step_index, &frontier_task.seed.node_id, ordinal_u32, &fingerprint);
        tasks.push(Task {
            task_id: id,
            ordinal: ordinal_u32,
            provenance: frontier_task.provenance,
            node_id: frontier_task.seed.node_id.clone(),
            overlay: frontier_task.seed.overlay.clone(),
            fingerprint,
        });
    }

    // Snapshot versionsSeen for triggered nodes, pre-commit (spec §4.5.1).
    for task in &tasks {
        if let Some(node) = graph.node(&task.node_id) {
            if !node.run_when.is_default() {
                state
                    .versions_seen_by_node
                    .insert(task.node_id.clone(), state.channel_versions.clone());
            }
        }
    }

    events.enqueue(run_id, attempt_id, Some(step_index), None, EventKind::StepStarted {
        step_index,
        frontier_count,
    });
    for task in &tasks {
        events.enqueue(
            run_id,
            attempt_id,
            Some(step_index),
            Some(task.ordinal),
            EventKind::TaskStarted { node_id: task.node_id.clone(), task_id: task.task_id.clone() },
        );
    }

    // Run tasks in ordinal order with per-node retries (spec §4.5.1, §4.8).
    // A cancellation observed before or during a task aborts the whole step
    // without committing anything (spec §4.9).
    let mut results: Vec<TaskRunResult> = Vec::with_capacity(tasks.len());
    for task in &tasks {
        if cancel.is_cancelled() {
            break;
        }
        let node = graph.node(&task.node_id).ok_or_else(|| {
            HiveError::InternalInvariantViolation(format!("frontier references unknown node {}", task.node_id))
        })?;
        let view = StoreView::new(registry, &state.global, Some(&task.overlay), &initial_cache);
        let ctx = RunContext {
            run_id,
            attempt_id,
            thread_id: thread_id.clone(),
            step_index,
            task_ordinal: task.ordinal,
            resume: resume.clone(),
        };

        let policy = node.retry_policy;
        let mut last_error = String::new();
        let mut outcome = None;
        for attempt in 1..=policy.max_attempts {
            if cancel.is_cancelled() {
                break;
            }
            match node.run.run(&view, &ctx).await {
                Ok(output) => {
                    outcome = Some(Ok(output));
                    break;
                }
                Err(e) => {
                    last_error = e.to_string();
                    logger.debug(
                        &format!("node {} attempt {attempt} failed: {last_error}", task.node_id),
                        &serde_json::json!({"node": task.node_id, "attempt": attempt}),
                    );
                    if attempt < policy.max_attempts {
                        let delay = policy.delay_for_failed_attempt(attempt);
                        clock.sleep(delay, cancel).await;
                    }
                }
            }
        }
        if cancel.is_cancelled() && outcome.is_none() {
            break;
        }
        results.push(TaskRunResult { outcome: outcome.unwrap_or(Err(last_error)) });
    }

    if cancel.is_cancelled() || results.len() < tasks.len() {
        for task in &tasks[results.len()..] {
            events.enqueue(
                run_id,
                attempt_id,
                Some(step_index),
                Some(task.ordinal),
                EventKind::TaskFailed {
                    node_id: task.node_id.clone(),
                    task_id: task.task_id.clone(),
                    error_description: "cancelled".to_string(),
                },
            );
        }
        events.enqueue(run_id, attempt_id, None, None, EventKind::RunCancelled);
        return Ok(StepOutcome { next_frontier: Vec::new(), interrupt: None, cancelled: true, checkpoint_id: None });
    }

    for (task, result) in tasks.iter().zip(results.iter()) {
        match &result.outcome {
            Ok(_) => {
                events.enqueue(
                    run_id,
                    attempt_id,
                    Some(step_index),
                    Some(task.ordinal),
                    EventKind::TaskFinished { node_id: task.node_id.clone(), task_id: task.task_id.clone() },
                );
            }
            Err(reason) => {
                events.enqueue(
                    run_id,
                    attempt_id,
                    Some(step_index),
                    Some(task.ordinal),
                    EventKind::TaskFailed {
                        node_id: task.node_id.clone(),
                        task_id: task.task_id.clone(),
                        error_description: reason.clone(),
                    },
                );
            }
        }
    }

    if let Some((task, reason)) = tasks
        .iter()
        .zip(results.iter())
        .filter_map(|(t, r)| r.outcome.as_ref().err().map(|e| (t, e.clone())))
        .min_by_key(|(t, _)| t.ordinal)
    {
        return Err(HiveError::TaskExecutionFailed { node_id: task.node_id.clone(), reason });
    }

    // Commit phase (spec §4.5.2). Snapshot the pre-step global store first:
    // per-task router views must see only that task's own writes, not its
    // siblings'.
    let pre_step_global = state.global.clone();

    let mut global_writes: Vec<(u32, Vec<(u32, Write)>)> = Vec::new();
    let mut per_task_local_writes: Vec<(u32, Vec<(u32, Write)>)> = Vec::new();
    let mut per_task_overlay: Vec<Overlay> = tasks.iter().map(|t| t.overlay.clone()).collect();

    for (task, result) in tasks.iter().zip(results.iter()) {
        let output = result.outcome.as_ref().expect("errors already handled above");
        let mut globals = Vec::new();
        let mut locals = Vec::new();
        for (idx, write) in output.writes.iter().enumerate() {
            let idx = idx as u32;
            match registry.get(&write.channel_id) {
                Some(spec) if spec.scope == crate::schema::ChannelScope::Global => {
                    globals.push((idx, write.clone()));
                }
                _ => locals.push((idx, write.clone())),
            }
        }
        global_writes.push((task.ordinal, globals));
        per_task_local_writes.push((task.ordinal, locals));
    }

    let updated_channels =
        commit_writes(registry, &mut state.global, &global_writes, &mut state.channel_versions, false)?;
    for (task, (_, writes)) in tasks.iter().zip(per_task_local_writes.iter()) {
        commit_task_local_writes(registry, &mut per_task_overlay[task.ordinal as usize], writes)?;
    }
    state.updated_channels_last_commit = updated_channels.clone();

    let mut sorted_updated = updated_channels.clone();
    sorted_updated.sort();
    for channel_id in &sorted_updated {
        let spec = registry.get(channel_id).unwrap();
        let value = state.global.get(channel_id).cloned().unwrap_or(serde_json::Value::Null);
        let hash = payload_hash(&value, spec.codec.as_deref(), &spec.value_type_id);
        let metadata = debug_payloads.then(|| serde_json::json!({"valueTypeId": spec.value_type_id}));
        events.enqueue(
            run_id,
            attempt_id,
            Some(step_index),
            None,
            EventKind::WriteApplied { channel_id: channel_id.clone(), payload_hash: hash, metadata },
        );
    }

    // Next frontier computation (spec §4.5.3).
    let mut next_graph_seeds: Vec<(TaskSeed, bool)> = Vec::new();
    let mut next_spawn_seeds: Vec<TaskSeed> = Vec::new();
    let mut interrupt_candidates: Vec<(u32, String, serde_json::Value)> = Vec::new();

    for (task, result) in tasks.iter().zip(results.iter()) {
        let output = result.outcome.as_ref().expect("checked above");
        next_spawn_seeds.extend(output.spawn.iter().cloned());
        if let Some(req) = &output.interrupt {
            interrupt_candidates.push((task.ordinal, task.task_id.clone(), req.payload.clone()));
        }

        match &output.next {
            NextRouting::End => {}
            NextRouting::Nodes(nodes) => {
                for n in nodes {
                    next_graph_seeds.push((TaskSeed::bare(n.clone()), false));
                }
            }
            NextRouting::UseGraphEdges => {
                let decision = if let Some(router) = graph.routers.get(&task.node_id) {
                    let mut router_global = pre_step_global.clone();
                    if let Some((_, writes)) = global_writes.iter().find(|(ord, _)| *ord == task.ordinal) {
                        for (_, w) in writes {
                            if let Some(spec) = registry.get(&w.channel_id) {
                                let current =
                                    router_global.get(&w.channel_id).cloned().unwrap_or_else(|| spec.initial_value());
                                if let Ok(reduced) = spec.reducer.reduce(&w.channel_id, current, w.value.clone()) {
                                    router_global.set(w.channel_id.clone(), reduced);
                                }
                            }
                        }
                    }
                    let view = StoreView::new(
                        registry,
                        &router_global,
                        Some(&per_task_overlay[task.ordinal as usize]),
                        &initial_cache,
                    );
                    router.route(&view)
                } else {
                    RouterDecision::UseGraphEdges
                };
                match decision {
                    RouterDecision::End => {}
                    RouterDecision::Nodes(nodes) => {
                        for n in nodes {
                            next_graph_seeds.push((TaskSeed::bare(n), false));
                        }
                    }
                    RouterDecision::UseGraphEdges => {
                        for n in graph.static_successors(&task.node_id) {
                            next_graph_seeds.push((TaskSeed::bare(n.clone()), false));
                        }
                    }
                }
            }
        }
    }

    // Join barriers: consume-on-run semantics (spec §3.4, §4.5.3).
    for join in &graph.join_edges {
        let parents_set: std::collections::HashSet<&NodeId> = join.parents.iter().collect();
        let seen = state.join_seen_parents.entry(join.id.clone()).or_default();
        if seen.len() == join.parents.len() {
            seen.clear();
        }
        let was_full = seen.len() == join.parents.len();
        for task in &tasks {
            if parents_set.contains(&task.node_id) && !seen.contains(&task.node_id) {
                seen.push(task.node_id.clone());
            }
        }
        seen.sort();
        let is_full = seen.len() == join.parents.len();
        if !was_full && is_full {
            next_graph_seeds.push((TaskSeed::bare(join.target.clone()), true));
        }
    }

    // Dedup graph seeds by (nodeID, fingerprint), preserving insertion order.
    let mut seen_keys: std::collections::HashSet<(NodeId, [u8; 32])> = std::collections::HashSet::new();
    let mut deduped_graph_seeds: Vec<(TaskSeed, bool)> = Vec::new();
    for (seed, is_join) in next_graph_seeds {
        let fp = task_local_fingerprint(registry, &seed.overlay)?;
        let key = (seed.node_id.clone(), fp);
        if seen_keys.insert(key) {
            deduped_graph_seeds.push((seed, is_join));
        }
    }

    // Trigger filtering (spec §4.5.6). Join seeds bypass it entirely.
    let mut next_frontier: Vec<FrontierTask> = Vec::new();
    for (seed, is_join_seed) in deduped_graph_seeds {
        let keep = if is_join_seed {
            true
        } else if let Some(node) = graph.node(&seed.node_id) {
            if node.run_when.is_default() {
                true
            } else {
                let seen = state.versions_seen_by_node.get(&seed.node_id).cloned().unwrap_or_default();
                triggers::seed_survives(&node.run_when, &state.channel_versions, &seen)
            }
        } else {
            true
        };
        if keep {
            next_frontier.push(FrontierTask { seed, provenance: Provenance::Graph, is_join_seed });
        }
    }
    for seed in next_spawn_seeds {
        next_frontier.push(FrontierTask { seed, provenance: Provenance::Spawn, is_join_seed: false });
    }

    let (dropped_tokens, dropped_debug) = events.take_drop_counts();
    if dropped_tokens > 0 || dropped_debug > 0 {
        events.enqueue(
            run_id,
            attempt_id,
            Some(step_index),
            None,
            EventKind::StreamBackpressure { dropped_model_tokens: dropped_tokens, dropped_debug },
        );
    }

    let interrupt = interrupt_candidates
        .iter()
        .min_by_key(|(ordinal, _, _)| *ordinal)
        .map(|(ordinal, task_id, payload)| (*ordinal, interrupt_id(task_id), payload.clone()));

    // §4.6: resume is visible only during the first committed resumed step;
    // once that commit lands (here), clear the pending interruption.
    if resume_was_present {
        state.interruption = None;
    }
    state.step_index = step_index + 1;
    state.frontier = next_frontier.clone();

    let mut checkpoint_id = None;
    if let Some((_, ref id, ref payload)) = interrupt {
        state.interruption = Some((id.clone(), payload.clone()));
        let saved = save_checkpoint_if_store_present(
            registry,
            checkpoint_store,
            thread_id.clone(),
            state,
            graph,
            CheckpointSource::Interrupt,
        )
        .await?;
        let Some(saved) = saved else {
            return Err(HiveError::CheckpointStoreMissing);
        };
        events.enqueue(
            run_id,
            attempt_id,
            Some(step_index),
            None,
            EventKind::CheckpointSaved { checkpoint_id: saved.clone() },
        );
        checkpoint_id = Some(saved);
    } else if should_checkpoint(checkpoint_policy, state.step_index, false) {
        let saved = save_checkpoint_if_store_present(
            registry,
            checkpoint_store,
            thread_id.clone(),
            state,
            graph,
            CheckpointSource::Loop,
        )
        .await?;
        if let Some(saved) = &saved {
            events.enqueue(
                run_id,
                attempt_id,
                Some(step_index),
                None,
                EventKind::CheckpointSaved { checkpoint_id: saved.clone() },
            );
        }
        checkpoint_id = saved;
    }
    if let Some(id) = &checkpoint_id {
        state.latest_checkpoint_id = Some(id.clone());
    }

    events.enqueue(
        run_id,
        attempt_id,
        Some(step_index),
        None,
        EventKind::StepFinished { step_index, next_frontier_count: next_frontier.len() as u32 },
    );

    Ok(StepOutcome { next_frontier, interrupt, cancelled: false, checkpoint_id })
}

async fn save_checkpoint_if_store_present(
    registry: &ChannelRegistry,
    checkpoint_store: Option<&dyn CheckpointStore>,
    thread_id: ThreadId,
    state: &ThreadState,
    graph: &CompiledGraph,
    source: CheckpointSource,
) -> Result<Option<String>> {
    let Some(store) = checkpoint_store else {
        return Ok(None);
    };
    let join_ids: Vec<JoinId> = graph.join_edges.iter().map(|j| j.id.clone()).collect();
    let id = save_checkpoint(
        registry,
        store,
        thread_id,
        state,
        graph.schema_version.clone(),
        graph.graph_version.clone(),
        &join_ids,
        source,
    )
    .await?;
    Ok(Some(id))
}

pub fn should_checkpoint(policy: CheckpointPolicy, step_index: u32, interrupted: bool) -> bool {
    interrupted || policy.matches(step_index)
}

/// Save a checkpoint for the current thread state. Returns the new
/// checkpoint id.
pub async fn save_checkpoint(
    registry: &ChannelRegistry,
    store: &dyn CheckpointStore,
    thread_id: ThreadId,
    state: &ThreadState,
    schema_version: String,
    graph_version: String,
    join_ids: &[JoinId],
    source: CheckpointSource,
) -> Result<String> {
    let mut join_barrier_seen_by_join_id = HashMap::new();
    for id in join_ids {
        join_barrier_seen_by_join_id.insert(id.clone(), state.join_seen_parents.get(id).cloned().unwrap_or_default());
    }
    let interruption = state.interruption.as_ref().map(|(id, payload)| (id.as_str(), payload));

    let checkpoint = checkpoint_codec::encode(
        registry,
        EncodeInput {
            run_id: state.run_id,
            thread_id,
            step_index: state.step_index,
            schema_version,
            graph_version,
            global: &state.global,
            channel_versions: &state.channel_versions,
            versions_seen_by_node: &state.versions_seen_by_node,
            updated_channels_last_commit: &state.updated_channels_last_commit,
            frontier: &state.frontier,
            join_barrier_seen_by_join_id: &join_barrier_seen_by_join_id,
            interruption,
            source,
        },
    )?;
    let id = checkpoint.id.clone();
    store.save(checkpoint).await?;
    Ok(id)
}

/// Apply the caller's initial `Input` writes (spec §4.5 step 3) or an
/// `applyExternalWrites` batch (spec §4.7), through the same
/// reducer/update-policy machinery as a normal commit. Both are an
/// input/external-writes path, so a task-local target is rejected
/// (`TaskLocalWriteNotAllowed`) rather than silently dropped.
pub fn apply_input_writes(
    registry: &ChannelRegistry,
    global: &mut GlobalStore,
    channel_versions: &mut HashMap<ChannelId, u64>,
    input: HashMap<ChannelId, serde_json::Value>,
) -> Result<()> {
    if input.is_empty() {
        return Ok(());
    }
    let writes: Vec<(u32, Write)> = input
        .into_iter()
        .enumerate()
        .map(|(i, (channel_id, value))| (i as u32, Write::new(channel_id, value)))
        .collect();
    commit_writes(registry, global, &[(0, writes)], channel_versions, true)?;
    Ok(())
}
