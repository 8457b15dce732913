//! Reference in-memory [`CheckpointStore`] implementation.
//!
//! Keeps every checkpoint ever saved per thread, in insertion order — a
//! development/testing backend, not a production one.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::ids::{CheckpointId, ThreadId};
use crate::traits::CheckpointStore;

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    by_thread: RwLock<HashMap<ThreadId, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all stored checkpoints. Test isolation helper.
    pub fn clear(&self) {
        self.by_thread.write().unwrap().clear();
    }
}

fn latest_of(checkpoints: &[Checkpoint]) -> Option<&Checkpoint> {
    checkpoints.iter().max_by(|a, b| {
        a.step_index
            .cmp(&b.step_index)
            .then_with(|| a.id.cmp(&b.id))
    })
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut guard = self.by_thread.write().unwrap();
        guard
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>> {
        let guard = self.by_thread.read().unwrap();
        Ok(guard
            .get(thread_id)
            .and_then(|v| latest_of(v))
            .cloned())
    }

    async fn list_checkpoints(
        &self,
        thread_id: &ThreadId,
        limit: usize,
    ) -> Result<Vec<Checkpoint>> {
        let guard = self.by_thread.read().unwrap();
        let mut v = guard.get(thread_id).cloned().unwrap_or_default();
        v.sort_by(|a, b| {
            b.step_index
                .cmp(&a.step_index)
                .then_with(|| b.id.cmp(&a.id))
        });
        v.truncate(limit);
        Ok(v)
    }

    async fn load_checkpoint(
        &self,
        thread_id: &ThreadId,
        id: &CheckpointId,
    ) -> Result<Option<Checkpoint>> {
        let guard = self.by_thread.read().unwrap();
        Ok(guard
            .get(thread_id)
            .and_then(|v| v.iter().find(|c| &c.id == id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointMetadata, CheckpointSource};
    use std::collections::HashMap as Map;

    fn cp(thread: &str, id: &str, step: u32) -> Checkpoint {
        Checkpoint {
            id: id.into(),
            thread_id: thread.into(),
            run_id: uuid::Uuid::nil(),
            step_index: step,
            schema_version: "s".into(),
            graph_version: "g".into(),
            checkpoint_format_version: "HCP2".into(),
            channel_versions: Map::new(),
            versions_seen_by_node: Map::new(),
            updated_channels_last_commit: vec![],
            global_data_by_channel_id: Map::new(),
            frontier: vec![],
            join_barrier_seen_by_join_id: Map::new(),
            interruption: None,
            metadata: CheckpointMetadata::new(CheckpointSource::Loop),
        }
    }

    #[tokio::test]
    async fn latest_picks_highest_step_then_lexicographic_id() {
        let store = InMemoryCheckpointStore::new();
        store.save(cp("t1", "bbb", 1)).await.unwrap();
        store.save(cp("t1", "aaa", 2)).await.unwrap();
        store.save(cp("t1", "zzz", 2)).await.unwrap();

        let latest = store.load_latest(&"t1".to_string()).await.unwrap().unwrap();
        assert_eq!(latest.step_index, 2);
        assert_eq!(latest.id, "zzz");
    }

    #[tokio::test]
    async fn missing_thread_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store
            .load_latest(&"nope".to_string())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_checkpoints_respects_limit_and_order() {
        let store = InMemoryCheckpointStore::new();
        for i in 0..5u32 {
            store.save(cp("t1", &format!("c{i}"), i)).await.unwrap();
        }
        let recent = store.list_checkpoints(&"t1".to_string(), 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].step_index, 4);
        assert_eq!(recent[1].step_index, 3);
    }
}
