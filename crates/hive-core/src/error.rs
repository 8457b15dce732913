//! Error taxonomy for schema construction, graph compilation, and runtime
//! execution (spec §7). Deterministic selection rules (smallest id, smallest
//! ordinal, first-in-precedence) are enforced by the callers that construct
//! these variants, not by the enum itself.

use thiserror::Error;

use crate::ids::{ChannelId, JoinId, NodeId};

pub type Result<T> = std::result::Result<T, HiveError>;

#[derive(Error, Debug)]
pub enum HiveError {
    // --- Schema (§4.1) ---
    #[error("duplicate channel id: {0}")]
    DuplicateChannelId(ChannelId),
    #[error("task-local channel {0} must be checkpointed")]
    InvalidTaskLocalUntracked(ChannelId),
    #[error("channel {0} requires a codec but has none")]
    MissingCodec(ChannelId),

    // --- Graph compilation (§4.2) ---
    #[error("start set must not be empty")]
    StartEmpty,
    #[error("duplicate start node: {0}")]
    DuplicateStartNode(NodeId),
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),
    #[error("node id {0} contains a reserved join character (':' or '+')")]
    InvalidNodeIdContainsReservedJoinCharacters(NodeId),
    #[error("unknown start node: {0}")]
    UnknownStartNode(NodeId),
    #[error("edge references unknown node: {0}")]
    UnknownEdgeEndpoint(NodeId),
    #[error("duplicate router for node: {0}")]
    DuplicateRouter(NodeId),
    #[error("router references unknown node: {0}")]
    UnknownRouterFrom(NodeId),
    #[error("join edge {0} is invalid: {1}")]
    InvalidJoinEdge(JoinId, String),
    #[error("join edge references unknown parent: {0}")]
    UnknownJoinParent(NodeId),
    #[error("join edge references unknown target: {0}")]
    UnknownJoinTarget(NodeId),
    #[error("duplicate join edge: {0}")]
    DuplicateJoinEdge(JoinId),
    #[error("output projection references unknown channel: {0}")]
    OutputProjectionUnknownChannel(ChannelId),
    #[error("output projection includes task-local channel: {0}")]
    OutputProjectionIncludesTaskLocal(ChannelId),

    // --- Runtime validation (§4.5.2) ---
    #[error("invalid run options: {0}")]
    InvalidRunOptions(String),
    #[error("unknown channel id: {0}")]
    UnknownChannelId(ChannelId),
    #[error("channel {channel} expected type {expected}, got {actual}")]
    ChannelTypeMismatch {
        channel: ChannelId,
        expected: String,
        actual: String,
    },
    #[error("task-local write to {0} not allowed on this path")]
    TaskLocalWriteNotAllowed(ChannelId),
    #[error("channel {channel} has update policy single but received {count} writes")]
    UpdatePolicyViolation { channel: ChannelId, count: usize },
    #[error("failed to encode task-local channel {0} for fingerprinting")]
    TaskLocalFingerprintEncodeFailed(ChannelId),
    #[error("step index {0} exceeds u32::MAX")]
    StepIndexOutOfRange(u64),
    #[error("task ordinal {0} exceeds u32::MAX")]
    TaskOrdinalOutOfRange(u64),
    #[error("reducer failed for channel {channel}: {reason}")]
    ReducerFailed { channel: ChannelId, reason: String },
    #[error("node {node_id} exhausted its retry policy: {reason}")]
    TaskExecutionFailed { node_id: NodeId, reason: String },

    // --- Lifecycle (§3.7, §4.6) ---
    #[error("an interrupt is pending: {0}")]
    InterruptPending(String),
    #[error("no interrupt to resume")]
    NoInterruptToResume,
    #[error("no checkpoint to resume from")]
    NoCheckpointToResume,
    #[error("resume interrupt id mismatch: expected {expected}, got {actual}")]
    ResumeInterruptMismatch { expected: String, actual: String },

    // --- Persistence (§4.5.4, §4.5.5) ---
    #[error("checkpoint policy requires a checkpoint store but none is configured")]
    CheckpointStoreMissing,
    #[error("failed to encode checkpoint field {field}: {reason}")]
    CheckpointEncodeFailed { field: ChannelId, reason: String },
    #[error("failed to decode checkpoint field {field}: {reason}")]
    CheckpointDecodeFailed { field: ChannelId, reason: String },
    #[error("checkpoint version mismatch: schema {schema_version}, graph {graph_version}")]
    CheckpointVersionMismatch {
        schema_version: String,
        graph_version: String,
    },
    #[error("checkpoint corrupt in {field}: {description}")]
    CheckpointCorrupt { field: String, description: String },
    #[error("task-local fingerprint must be 32 bytes, got {0}")]
    InvalidTaskLocalFingerprintLength(usize),
    #[error(transparent)]
    Checkpoint(#[from] hive_checkpoint::CheckpointError),

    // --- Streaming / model (§4.4, §6.2) ---
    #[error("model stream invalid at step {step_index}, task {task_ordinal}: {reason}")]
    ModelStreamInvalid {
        step_index: u32,
        task_ordinal: u32,
        reason: String,
    },
    #[error("node requires a model client but none is configured")]
    ModelClientMissing,
    #[error("node requires a tool registry but none is configured")]
    ToolRegistryMissing,

    // --- Invariant ---
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HiveError {
    pub fn reducer_failed(channel: impl Into<ChannelId>, reason: impl Into<String>) -> Self {
        Self::ReducerFailed {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn channel_type_mismatch(
        channel: impl Into<ChannelId>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChannelTypeMismatch {
            channel: channel.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
