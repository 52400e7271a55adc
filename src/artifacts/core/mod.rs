//! Shared error kinds
//!
//! Operations return `anyhow::Result`, but failures that callers need to
//! tell apart carry an [`IndexError`] as their root cause. Batch operations
//! (checkout) report per-item errors and keep going; mutating operations
//! fail atomically, leaving the index observably unchanged.

use thiserror::Error;

/// Failure categories of the index subsystem.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Signature mismatch, unsupported version, malformed entry, trailer
    /// checksum mismatch, or an extended-flag bit in a version-2 file.
    #[error("Invalid index: {0}")]
    Invalid(String),

    /// Path not present in the index when creation was not requested.
    #[error("{0} not found in index")]
    NotFound(String),

    /// Parent/child path collision or a working-tree collision that blocks
    /// an operation.
    #[error("{0}")]
    Conflict(String),

    /// A stage-0 entry was required but only merge stages exist.
    #[error("Index has unmerged entries. Aborting.")]
    Unmerged,

    /// Cached stat info no longer matches the filesystem. Non-fatal; used
    /// as a signal that the content hash can no longer be trusted.
    #[error("{0}")]
    StatMismatch(String),
}
