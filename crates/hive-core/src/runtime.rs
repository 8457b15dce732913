//! The public `Runtime` handle (spec §6.1, §6.3). Wires the registry,
//! compiled graph, checkpoint store, clock, and logger together and
//! serializes invocations per thread in arrival order (spec §3.7, §5).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checkpoint_codec;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{Logger, TracingLogger};
use crate::error::{HiveError, Result};
use crate::event::{Event, EventBuffer, EventKind};
use crate::fingerprint;
use crate::graph::{CompiledGraph, OutputProjection, ResumePayload};
use crate::ids::{AttemptId, ChannelId, JoinId, RunId, ThreadId};
use crate::interrupt;
use crate::options::{Output, Outcome, RunOptions};
use crate::scheduler::{self, ExecuteStepArgs, ThreadState};
use crate::schema::ChannelRegistry;
use crate::task::{FrontierTask, Provenance, TaskSeed};
use hive_checkpoint::{CheckpointSource, CheckpointStore};

/// Everything produced by one `run`/`resume` call: a full, drained event
/// stream plus the terminal outcome (spec §6.3). Streaming consumption is
/// left to callers that want to inspect `events` incrementally; this
/// implementation always runs an attempt to completion before returning.
pub struct RunOutput {
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub events: Vec<Event>,
    pub outcome: Outcome,
}

pub struct Runtime {
    registry: Arc<ChannelRegistry>,
    graph: Arc<CompiledGraph>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    threads: StdMutex<HashMap<ThreadId, Arc<AsyncMutex<Option<ThreadState>>>>>,
}

impl Runtime {
    pub fn new(registry: Arc<ChannelRegistry>, graph: Arc<CompiledGraph>) -> Self {
        Self {
            registry,
            graph,
            checkpoint_store: None,
            clock: Arc::new(SystemClock),
            logger: Arc::new(TracingLogger),
            threads: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    fn thread_lock(&self, thread_id: &ThreadId) -> Arc<AsyncMutex<Option<ThreadState>>> {
        let mut threads = self.threads.lock().unwrap();
        threads
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    fn ensure_checkpoint_store_if_needed(&self, options: &RunOptions) -> Result<()> {
        if options.checkpoint_policy != crate::options::CheckpointPolicy::Disabled && self.checkpoint_store.is_none()
        {
            return Err(HiveError::CheckpointStoreMissing);
        }
        Ok(())
    }

    /// Loads the latest checkpoint for `thread_id`, if any, decoding it
    /// against the compiled graph (spec §4.5.5). Returns a fresh state when
    /// no checkpoint store is configured or none has been saved yet.
    async fn load_or_fresh(&self, thread_id: &ThreadId) -> Result<(ThreadState, Option<String>)> {
        if let Some(store) = &self.checkpoint_store {
            if let Some(checkpoint) = store.load_latest(thread_id).await? {
                let decoded = checkpoint_codec::decode(&self.registry, &self.graph, &checkpoint)?;
                let state = ThreadState {
                    run_id: checkpoint.run_id,
                    step_index: checkpoint.step_index,
                    global: decoded.global,
                    frontier: decoded.frontier,
                    join_seen_parents: decoded.join_barrier_seen_by_join_id,
                    interruption: decoded.interruption.map(|i| (i.id, i.payload)),
                    latest_checkpoint_id: Some(checkpoint.id.clone()),
                    channel_versions: decoded.channel_versions,
                    versions_seen_by_node: decoded.versions_seen_by_node,
                    updated_channels_last_commit: decoded.updated_channels_last_commit,
                };
                return Ok((state, Some(checkpoint.id)));
            }
        }
        Ok((ThreadState::fresh(&self.registry, Uuid::new_v4()), None))
    }

    async fn save(
        &self,
        state: &mut ThreadState,
        thread_id: &ThreadId,
        source: CheckpointSource,
    ) -> Result<Option<String>> {
        let Some(store) = &self.checkpoint_store else {
            return Ok(None);
        };
        let join_ids: Vec<JoinId> = self.graph.join_edges.iter().map(|j| j.id.clone()).collect();
        let id = scheduler::save_checkpoint(
            &self.registry,
            store.as_ref(),
            thread_id.clone(),
            state,
            self.graph.schema_version.clone(),
            self.graph.graph_version.clone(),
            &join_ids,
            source,
        )
        .await?;
        state.latest_checkpoint_id = Some(id.clone());
        Ok(Some(id))
    }

    fn project(&self, state: &ThreadState, options: &RunOptions) -> Output {
        if let Some(channels) = &options.output_projection_override {
            return Output::Channels(
                channels.iter().map(|c| state.global.get(c).cloned().unwrap_or(Value::Null)).collect(),
            );
        }
        match &self.graph.output_projection {
            OutputProjection::FullStore => {
                let map = self
                    .registry
                    .global_sorted()
                    .map(|spec| {
                        (spec.id.clone(), state.global.get(&spec.id).cloned().unwrap_or_else(|| spec.initial_value()))
                    })
                    .collect();
                Output::FullStore(map)
            }
            OutputProjection::Channels(channels) => {
                Output::Channels(channels.iter().map(|c| state.global.get(c).cloned().unwrap_or(Value::Null)).collect())
            }
        }
    }

    fn drain(events: &EventBuffer) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(e) = events.dequeue() {
            out.push(e);
        }
        out
    }

    /// Starts (or continues, from a durable checkpoint) an attempt on
    /// `thread_id`, applying `input` as the initial writes (spec §4.5 step 3).
    pub async fn run(
        &self,
        thread_id: ThreadId,
        input: HashMap<ChannelId, Value>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunOutput> {
        options.validate().map_err(HiveError::InvalidRunOptions)?;
        self.ensure_checkpoint_store_if_needed(&options)?;

        let lock = self.thread_lock(&thread_id);
        let mut guard = lock.lock().await;

        let mut loaded_checkpoint_id = None;
        if guard.is_none() {
            let (state, checkpoint_id) = self.load_or_fresh(&thread_id).await?;
            loaded_checkpoint_id = checkpoint_id;
            *guard = Some(state);
        }
        let state = guard.as_mut().unwrap();

        if let Some((id, _)) = &state.interruption {
            return Err(HiveError::InterruptPending(id.clone()));
        }

        let run_id = state.run_id;
        let attempt_id = Uuid::new_v4();
        let events = EventBuffer::new(options.event_buffer_capacity, run_id, attempt_id);

        events.enqueue(run_id, attempt_id, None, None, EventKind::RunStarted { thread_id: thread_id.clone() });
        if let Some(id) = loaded_checkpoint_id {
            events.enqueue(run_id, attempt_id, None, None, EventKind::CheckpointLoaded { checkpoint_id: id });
        }

        scheduler::apply_input_writes(&self.registry, &mut state.global, &mut state.channel_versions, input)?;
        if state.frontier.is_empty() {
            state.frontier = self
                .graph
                .start
                .iter()
                .map(|n| FrontierTask { seed: TaskSeed::bare(n.clone()), provenance: Provenance::Graph, is_join_seed: false })
                .collect();
        }

        let outcome =
            self.drive_attempt(state, &thread_id, &options, &events, run_id, attempt_id, &cancel, None).await?;
        events.terminate();
        Ok(RunOutput { run_id, attempt_id, events: Self::drain(&events), outcome })
    }

    /// Resumes a pending interruption on `thread_id` (spec §4.6).
    pub async fn resume(
        &self,
        thread_id: ThreadId,
        interrupt_id: String,
        payload: Value,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunOutput> {
        options.validate().map_err(HiveError::InvalidRunOptions)?;
        self.ensure_checkpoint_store_if_needed(&options)?;

        let lock = self.thread_lock(&thread_id);
        let mut guard = lock.lock().await;
        if guard.is_none() {
            let (state, _) = self.load_or_fresh(&thread_id).await?;
            *guard = Some(state);
        }
        let state = guard.as_mut().unwrap();

        let checkpoint_interrupt_id = state.interruption.as_ref().map(|(id, _)| id.as_str());
        interrupt::validate_resume(checkpoint_interrupt_id, &interrupt_id)?;
        // `state.interruption` stays set until the first committed resumed
        // step (spec §4.6): a resumed attempt cancelled before its first
        // commit keeps the pending interruption. `drive_attempt` clears it.

        let run_id = state.run_id;
        let attempt_id = Uuid::new_v4();
        let events = EventBuffer::new(options.event_buffer_capacity, run_id, attempt_id);
        events.enqueue(
            run_id,
            attempt_id,
            None,
            None,
            EventKind::RunResumed { interrupt_id: interrupt_id.clone() },
        );

        let resume_payload = ResumePayload { interrupt_id, payload };
        let outcome = self
            .drive_attempt(state, &thread_id, &options, &events, run_id, attempt_id, &cancel, Some(resume_payload))
            .await?;
        events.terminate();
        Ok(RunOutput { run_id, attempt_id, events: Self::drain(&events), outcome })
    }

    /// A synthetic committed step at the current `stepIndex` that applies
    /// writes without running any node or touching the frontier or join
    /// barriers (spec §4.7). Saves a checkpoint unconditionally if a store
    /// is configured, regardless of `checkpointPolicy`.
    pub async fn apply_external_writes(&self, thread_id: ThreadId, writes: HashMap<ChannelId, Value>) -> Result<Outcome> {
        let lock = self.thread_lock(&thread_id);
        let mut guard = lock.lock().await;
        if guard.is_none() {
            let (state, _) = self.load_or_fresh(&thread_id).await?;
            *guard = Some(state);
        }
        let state = guard.as_mut().unwrap();

        if let Some((id, _)) = &state.interruption {
            return Err(HiveError::InterruptPending(id.clone()));
        }

        scheduler::apply_input_writes(&self.registry, &mut state.global, &mut state.channel_versions, writes)?;
        state.step_index += 1;
        let checkpoint_id = self.save(state, &thread_id, CheckpointSource::ExternalWrite).await?;
        let output = self.project(state, &RunOptions::default());
        Ok(Outcome::Finished { output, checkpoint_id })
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive_attempt(
        &self,
        state: &mut ThreadState,
        thread_id: &ThreadId,
        options: &RunOptions,
        events: &EventBuffer,
        run_id: RunId,
        attempt_id: AttemptId,
        cancel: &CancellationToken,
        mut resume: Option<ResumePayload>,
    ) -> Result<Outcome> {
        let mut steps_run: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                let output = self.project(state, options);
                let checkpoint_id = self.save(state, thread_id, CheckpointSource::Loop).await?;
                events.enqueue(run_id, attempt_id, None, None, EventKind::RunCancelled);
                return Ok(Outcome::Cancelled { output, checkpoint_id });
            }

            if state.frontier.is_empty() {
                let output = self.project(state, options);
                let checkpoint_id = if scheduler::should_checkpoint(options.checkpoint_policy, state.step_index, false)
                {
                    self.save(state, thread_id, CheckpointSource::Loop).await?
                } else {
                    None
                };
                events.enqueue(run_id, attempt_id, None, None, EventKind::RunFinished);
                return Ok(Outcome::Finished { output, checkpoint_id });
            }

            if steps_run >= options.max_steps {
                let output = self.project(state, options);
                let checkpoint_id = if scheduler::should_checkpoint(options.checkpoint_policy, state.step_index, false)
                {
                    self.save(state, thread_id, CheckpointSource::Loop).await?
                } else {
                    None
                };
                return Ok(Outcome::OutOfSteps { max_steps: options.max_steps, output, checkpoint_id });
            }

            let step_outcome = scheduler::execute_step(
                ExecuteStepArgs {
                    registry: &self.registry,
                    graph: &self.graph,
                    clock: self.clock.as_ref(),
                    logger: self.logger.as_ref(),
                    events,
                    run_id,
                    attempt_id,
                    thread_id,
                    cancel,
                    debug_payloads: options.debug_payloads,
                    resume: resume.take(),
                    checkpoint_store: self.checkpoint_store.as_deref(),
                    checkpoint_policy: options.checkpoint_policy,
                },
                state,
            )
            .await?;
            steps_run += 1;

            if step_outcome.cancelled {
                let output = self.project(state, options);
                let checkpoint_id = self.save(state, thread_id, CheckpointSource::Loop).await?;
                return Ok(Outcome::Cancelled { output, checkpoint_id });
            }

            // `execute_step` already advanced `step_index`/`frontier`,
            // cleared a resumed attempt's interruption on its first commit,
            // and saved whatever checkpoint this step's commit required.

            if let Some((_, interrupt_id, payload)) = step_outcome.interrupt {
                events.enqueue(
                    run_id,
                    attempt_id,
                    None,
                    None,
                    EventKind::RunInterrupted { interrupt_id: interrupt_id.clone() },
                );
                return Ok(Outcome::Interrupted {
                    interrupt_id,
                    payload,
                    checkpoint_id: step_outcome.checkpoint_id.expect("interrupt always checkpoints"),
                });
            }

            if state.frontier.is_empty() {
                let output = self.project(state, options);
                events.enqueue(run_id, attempt_id, None, None, EventKind::RunFinished);
                return Ok(Outcome::Finished { output, checkpoint_id: step_outcome.checkpoint_id });
            }
        }
    }
}

/// Derives the interrupt id a caller must pass to [`Runtime::resume`] from a
/// winning task id, exposed for callers constructing their own bookkeeping.
pub fn derive_interrupt_id(winning_task_id: &str) -> String {
    fingerprint::interrupt_id(winning_task_id)
}
