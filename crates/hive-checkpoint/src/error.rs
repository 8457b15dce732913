//! Error types for checkpoint storage operations.

use thiserror::Error;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors a [`crate::traits::CheckpointStore`] implementation can raise.
///
/// This is deliberately narrow: validating the *contents* of a checkpoint
/// (version mismatches, corrupt fields, bad fingerprints) is the scheduler's
/// job in `hive-core` and is reported through `hive_core::error::HiveError`
/// instead. This enum only covers the storage transport itself.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the given thread.
    #[error("no checkpoint found for thread {0:?}")]
    NotFound(String),

    /// The backend failed to persist or retrieve a checkpoint.
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    /// The backend failed to (de)serialize a checkpoint record.
    #[error("checkpoint (de)serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
