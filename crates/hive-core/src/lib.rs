//! Deterministic superstep-based runtime core for agent-style workflows.
//!
//! Modules are organized bottom-up: channel schema and values, the graph
//! compiler, the scheduler that drives one superstep at a time, and the
//! `Runtime` handle that ties persistence and collaborators together.

pub mod checkpoint_codec;
pub mod clock;
pub mod collaborators;
pub mod compile;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod graph;
pub mod ids;
pub mod interrupt;
pub mod options;
pub mod reducer;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod task;
pub mod triggers;
pub mod value;
pub mod write;

pub use clock::{Clock, RecordingClock, SystemClock};
pub use collaborators::{
    Logger, MemoryStore, ModelClient, ModelRequest, ModelResponse, ModelStreamChunk, ToolCall, ToolDefinition,
    ToolRegistry, ToolResult, TracingLogger,
};
pub use compile::GraphBuilder;
pub use error::{HiveError, Result};
pub use event::{Event, EventKind};
pub use graph::{
    CompiledGraph, JoinEdge, NodeExecutor, NodeSpec, OutputProjection, ResumePayload, Router, RouterDecision,
    RunContext, RunWhen,
};
pub use ids::{AttemptId, ChannelId, CheckpointId, EventId, JoinId, NodeId, RunId, TaskId, ThreadId};
pub use options::{CheckpointPolicy, Outcome, Output, RunOptions, StreamingMode};
pub use reducer::Reducer;
pub use retry::RetryPolicy;
pub use runtime::{derive_interrupt_id, RunOutput, Runtime};
pub use schema::{ChannelRegistry, ChannelScope, ChannelSpec, Persistence, UpdatePolicy};
pub use task::{InterruptRequest, NextRouting, NodeOutput, Provenance, TaskSeed};
pub use value::{json_codec, payload_hash, Codec, JsonCodec, ValueTypeId};
pub use write::Write;

pub use hive_checkpoint::{CheckpointSource, CheckpointStore, InMemoryCheckpointStore};
