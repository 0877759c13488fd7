//! File-backed checkpoint store
//!
//! Layout: `<dir>/<thread_id>.json`, one record per file. A commit writes a
//! temporary file next to the target, syncs it and renames it over the
//! target, so readers only ever see a complete record.
//!
//! The read-check-rename sequence of a commit runs under `<thread_id>.lock`,
//! created with `create_new`, so stores in different processes sharing one
//! directory still apply a given expected version at most once.

use crate::record::{check_version, CheckpointRecord, CheckpointStore, ThreadSummary};
use async_trait::async_trait;
use roster_core::{Result, RosterError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const RECORD_EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(5);
// A commit holds the lock for one write; anything older was left by a crash
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Checkpoint store writing one JSON file per thread
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    // Serializes read-check-rename sequences within this process
    commit_lock: Mutex<()>,
}

fn valid_thread_id(thread_id: &str) -> bool {
    !thread_id.is_empty()
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", thread_id, RECORD_EXTENSION))
    }

    fn lock_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", thread_id, LOCK_EXTENSION))
    }

    async fn read_record(path: &Path) -> Result<Option<CheckpointRecord>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: CheckpointRecord = serde_json::from_str(&content).map_err(|e| {
            RosterError::CheckpointWrite(format!(
                "checkpoint {} is unreadable: {}",
                path.display(),
                e
            ))
        })?;
        record.verify()?;
        Ok(Some(record))
    }

    async fn write_atomically(&self, path: &Path, record: &CheckpointRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.{}.tmp", record.thread_id, record.version, Uuid::new_v4()));

        let result: std::io::Result<()> = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(RosterError::CheckpointWrite(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }
}

/// Exclusive lock on one thread's record, held across processes
///
/// Removed on drop; a lock file older than `LOCK_STALE_AFTER` is taken over.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    async fn acquire(path: &Path) -> Result<Self> {
        let deadline = tokio::time::Instant::now() + LOCK_TIMEOUT;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(mut file) => {
                    let lock = Self {
                        path: path.to_path_buf(),
                    };
                    file.write_all(std::process::id().to_string().as_bytes())
                        .await?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(path).await? {
                        warn!("Removing stale checkpoint lock {}", path.display());
                        let _ = fs::remove_file(path).await;
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(RosterError::CheckpointWrite(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(RosterError::CheckpointWrite(format!(
                        "cannot lock {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
    }

    async fn is_stale(path: &Path) -> Result<bool> {
        match fs::metadata(path).await {
            Ok(metadata) => {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                let age = SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or_default();
                Ok(age > LOCK_STALE_AFTER)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Synchronous so the next committer never sees a lock we already released
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<CheckpointRecord>> {
        if !valid_thread_id(thread_id) {
            return Err(RosterError::ThreadNotFound(thread_id.to_string()));
        }
        Self::read_record(&self.record_path(thread_id)).await
    }

    #[instrument(skip(self, payload), fields(dir = %self.dir.display()))]
    async fn commit(
        &self,
        thread_id: &str,
        payload: Value,
        expected_version: Option<u64>,
    ) -> Result<CheckpointRecord> {
        if !valid_thread_id(thread_id) {
            return Err(RosterError::CheckpointWrite(format!(
                "invalid thread id: {:?}",
                thread_id
            )));
        }

        let _guard = self.commit_lock.lock().await;
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            RosterError::CheckpointWrite(format!("cannot create {}: {}", self.dir.display(), e))
        })?;
        let _file_lock = LockFile::acquire(&self.lock_path(thread_id)).await?;

        let path = self.record_path(thread_id);
        let current = Self::read_record(&path).await?.map(|r| r.version);
        let version = check_version(thread_id, current, expected_version)?;

        let record = CheckpointRecord::new(thread_id, version, payload)?;
        self.write_atomically(&path, &record).await?;

        debug!("Committed thread {} at version {}", thread_id, version);
        Ok(record)
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(Some(record)) => summaries.push(record.summary()),
                Ok(None) => {}
                Err(e) => warn!("Skipping checkpoint {}: {}", path.display(), e),
            }
        }

        summaries.sort_by(|a, b| a.thread_id.cmp(&b.thread_id));
        Ok(summaries)
    }
}
