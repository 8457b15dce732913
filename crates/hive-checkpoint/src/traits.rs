//! `CheckpointStore` — the storage backend contract (spec §6.2).
//!
//! Implementations must be safe to call concurrently: the scheduler may have
//! several attempts in flight across different threads, each saving/loading
//! independently (spec §5 "Shared-resource policy").

use async_trait::async_trait;

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::ids::{CheckpointId, ThreadId};

/// Storage backend for checkpoints. `save`/`load_latest` are required;
/// `list_checkpoints`/`load_checkpoint` are optional time-travel support
/// (spec §6.2) with a default that only ever sees what `save` wrote.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint. Checkpoints are immutable once saved (spec §3.7).
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// The checkpoint with the highest `step_index` for `thread_id`, ties
    /// broken by lexicographic `id` (spec §3.7, §6.2).
    async fn load_latest(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>>;

    /// Most recent `limit` checkpoints for a thread, newest first.
    async fn list_checkpoints(
        &self,
        thread_id: &ThreadId,
        limit: usize,
    ) -> Result<Vec<Checkpoint>> {
        let _ = limit;
        let _ = thread_id;
        Ok(Vec::new())
    }

    /// A specific checkpoint by id, if the backend retains history.
    async fn load_checkpoint(
        &self,
        thread_id: &ThreadId,
        id: &CheckpointId,
    ) -> Result<Option<Checkpoint>> {
        let _ = thread_id;
        let _ = id;
        Ok(None)
    }
}
