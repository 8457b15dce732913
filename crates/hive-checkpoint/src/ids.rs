//! Opaque identifier aliases shared by the checkpoint layout and the runtime.
//!
//! These live in `hive-checkpoint` rather than `hive-core` because the
//! checkpoint wire format (§6.4) is defined purely in terms of them, and
//! `hive-core` depends on `hive-checkpoint` rather than the reverse.

use uuid::Uuid;

/// Identifies a channel declared in a schema. Must not contain `:` or `+`.
pub type ChannelId = String;

/// Identifies a node declared in a compiled graph. Must not contain `:` or `+`.
pub type NodeId = String;

/// Identifies an external logical workflow. Per-thread state is isolated and
/// invocations against the same thread serialize in arrival order.
pub type ThreadId = String;

/// Identifies a join barrier: `"join:" + parents.join("+") + ":" + target`.
pub type JoinId = String;

/// Lowercase hex SHA-256 digest identifying a saved checkpoint.
pub type CheckpointId = String;

/// Lowercase hex SHA-256 digest identifying a scheduled task within a step.
pub type TaskId = String;

/// Lowercase hex SHA-256 digest identifying a selected interrupt.
pub type InterruptId = String;

/// 128-bit opaque value identifying a run's lifecycle across many attempts.
pub type RunId = Uuid;

/// 128-bit opaque value identifying one invocation of `run`/`resume`/
/// `applyExternalWrites`.
pub type AttemptId = Uuid;
