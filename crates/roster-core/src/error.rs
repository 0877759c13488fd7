//! Unified error types for roster

use thiserror::Error;

/// Unified error type for all roster operations
#[derive(Error, Debug)]
pub enum RosterError {
    // Branch-local errors (recovered inside the branch)
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    #[error("Matching failed: {0}")]
    Matching(String),

    #[error("Assembly failed: {0}")]
    Assembly(String),

    // Engine-local errors (surfaced to the caller)
    #[error("Recursion limit of {limit} turns exceeded")]
    RecursionLimitExceeded { limit: usize },

    #[error("Thread {0} has no pending interrupt")]
    NoPendingInterrupt(String),

    #[error("Interrupt {interrupt_id} is not pending on thread {thread_id}")]
    StaleInterrupt {
        thread_id: String,
        interrupt_id: String,
    },

    #[error("Thread {thread_id} has {} pending interrupts; name one of: {}", .pending.len(), .pending.join(", "))]
    AmbiguousInterrupt {
        thread_id: String,
        pending: Vec<String>,
    },

    #[error("Checkpoint write failed: {0}")]
    CheckpointWrite(String),

    #[error("Checkpoint conflict on thread {thread_id}: expected version {expected:?}, found {found:?}")]
    CheckpointConflict {
        thread_id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    // Collaborator errors
    #[error("API error: {0}")]
    Api(String),

    #[error("API limit: {0}")]
    ApiLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Capability invocation failed: {0}")]
    Capability(String),

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using RosterError
pub type Result<T> = std::result::Result<T, RosterError>;
