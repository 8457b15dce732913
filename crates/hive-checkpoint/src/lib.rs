//! Checkpoint storage trait and reference backend for the hive runtime.
//!
//! This crate owns the wire layout of a saved checkpoint (spec §6.4) and the
//! [`CheckpointStore`] contract (spec §6.2) a backend must satisfy. It does
//! not know how to *build* a checkpoint from a running graph — that's
//! `hive-core`'s job (`hive_core::checkpoint_codec`).

pub mod checkpoint;
pub mod error;
pub mod ids;
pub mod memory;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSource, FrontierEntry, Interruption, Provenance,
    CHECKPOINT_FORMAT_VERSION, CHECKPOINT_FORMAT_VERSION_HCP1,
};
pub use error::{CheckpointError, Result};
pub use ids::{AttemptId, ChannelId, CheckpointId, JoinId, NodeId, RunId, TaskId, ThreadId};
pub use memory::InMemoryCheckpointStore;
pub use traits::CheckpointStore;
