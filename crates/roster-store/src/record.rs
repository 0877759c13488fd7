//! Checkpoint record and store interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roster_core::{Result, RosterError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One committed checkpoint of a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub thread_id: String,
    /// Starts at 1 and increases by one per commit
    pub version: u64,
    pub payload: Value,
    /// Hex SHA-256 of the serialized payload
    pub digest: String,
    pub committed_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(thread_id: impl Into<String>, version: u64, payload: Value) -> Result<Self> {
        let digest = Self::digest_of(&payload)?;
        Ok(Self {
            thread_id: thread_id.into(),
            version,
            payload,
            digest,
            committed_at: Utc::now(),
        })
    }

    pub fn digest_of(payload: &Value) -> Result<String> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Check the payload against its digest
    pub fn verify(&self) -> Result<()> {
        let actual = Self::digest_of(&self.payload)?;
        if actual != self.digest {
            return Err(RosterError::CheckpointWrite(format!(
                "checkpoint for thread {} (version {}) is corrupt: digest mismatch",
                self.thread_id, self.version
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            thread_id: self.thread_id.clone(),
            version: self.version,
            committed_at: self.committed_at,
        }
    }
}

/// Listing entry for a stored thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub thread_id: String,
    pub version: u64,
    pub committed_at: DateTime<Utc>,
}

/// Durable key-value store of thread checkpoints
///
/// `commit` is all-or-nothing: either the new record replaces the old one
/// entirely or nothing changes.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest committed record of a thread
    async fn load(&self, thread_id: &str) -> Result<Option<CheckpointRecord>>;

    /// Commit a new payload computed from `expected_version`
    ///
    /// `None` means the thread must not exist yet. Returns the committed record.
    async fn commit(
        &self,
        thread_id: &str,
        payload: Value,
        expected_version: Option<u64>,
    ) -> Result<CheckpointRecord>;

    /// All stored threads, ordered by thread id
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>>;
}

/// Compare-and-swap check shared by the store implementations
pub(crate) fn check_version(
    thread_id: &str,
    current: Option<u64>,
    expected: Option<u64>,
) -> Result<u64> {
    if current != expected {
        return Err(RosterError::CheckpointConflict {
            thread_id: thread_id.to_string(),
            expected,
            found: current,
        });
    }
    Ok(expected.map_or(1, |v| v + 1))
}
