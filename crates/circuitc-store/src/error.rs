//! Storage error types for circuitc-store.
//!
//! [`StorageError`] covers the failure modes of the fact store: record
//! (de)serialization, missing records, id collisions and malformed partial
//! updates.

use thiserror::Error;

/// Errors produced by fact store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No record with the given id exists.
    #[error("record not found: {id}")]
    RecordNotFound { id: String },

    /// A record with the given id already exists.
    #[error("duplicate record id: {id}")]
    DuplicateId { id: String },

    /// A partial update tried to change immutable fields or was not an object.
    #[error("invalid update of {id}: {reason}")]
    InvalidUpdate { id: String, reason: String },

    /// A required record collection is missing from a snapshot.
    #[error("missing collection '{kind}' in snapshot")]
    MissingCollection { kind: String },
}
