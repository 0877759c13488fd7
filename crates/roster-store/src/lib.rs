//! # roster-store
//!
//! Durable checkpoints for roster execution threads.
//!
//! A checkpoint is one JSON payload per thread id. Every commit names the
//! version it was computed from; a commit against any other version is
//! rejected with [`RosterError::CheckpointConflict`](roster_core::RosterError)
//! so two resumes of the same thread can never both apply.
//!
//! - [`MemoryCheckpointStore`]: in-process store for tests and one-shot runs
//! - [`FileCheckpointStore`]: one file per thread, written atomically, with a
//!   SHA-256 digest checked on every load

mod file;
mod memory;
mod record;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use record::{CheckpointRecord, CheckpointStore, ThreadSummary};
