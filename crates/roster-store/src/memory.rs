//! In-memory checkpoint store

use crate::record::{check_version, CheckpointRecord, CheckpointStore, ThreadSummary};
use async_trait::async_trait;
use roster_core::{Result, RosterError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Checkpoint store kept in process memory
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    records: Arc<RwLock<BTreeMap<String, CheckpointRecord>>>,
    fail_commits: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail with a write error (for failure tests)
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<CheckpointRecord>> {
        Ok(self.records.read().await.get(thread_id).cloned())
    }

    async fn commit(
        &self,
        thread_id: &str,
        payload: Value,
        expected_version: Option<u64>,
    ) -> Result<CheckpointRecord> {
        let mut records = self.records.write().await;
        let current = records.get(thread_id).map(|r| r.version);
        let version = check_version(thread_id, current, expected_version)?;

        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(RosterError::CheckpointWrite(format!(
                "injected failure committing thread {}",
                thread_id
            )));
        }

        let record = CheckpointRecord::new(thread_id, version, payload)?;
        records.insert(thread_id.to_string(), record.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .map(CheckpointRecord::summary)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_commit_and_load() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("t1").await.unwrap().is_none());

        let first = store.commit("t1", json!({"step": 1}), None).await.unwrap();
        assert_eq!(first.version, 1);

        let second = store
            .commit("t1", json!({"step": 2}), Some(1))
            .await
            .unwrap();
        assert_eq!(second.version, 2);

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.payload, json!({"step": 2}));
        assert_eq!(store.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_commit_rejected_without_mutation() {
        let store = MemoryCheckpointStore::new();
        store.commit("t1", json!({"step": 1}), None).await.unwrap();
        store.commit("t1", json!({"step": 2}), Some(1)).await.unwrap();

        let err = store
            .commit("t1", json!({"step": "stale"}), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::CheckpointConflict { .. }));

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.payload, json!({"step": 2}));
    }

    #[tokio::test]
    async fn test_injected_failure_keeps_previous_record() {
        let store = MemoryCheckpointStore::new();
        store.commit("t1", json!({"step": 1}), None).await.unwrap();

        store.fail_commits(true);
        let err = store
            .commit("t1", json!({"step": 2}), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::CheckpointWrite(_)));
        assert_eq!(store.load("t1").await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_list_threads_sorted() {
        let store = MemoryCheckpointStore::new();
        store.commit("b", json!({}), None).await.unwrap();
        store.commit("a", json!({}), None).await.unwrap();

        let ids: Vec<String> = store
            .list_threads()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.thread_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
