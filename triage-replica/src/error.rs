//! Error types for triage-replica
//!
//! `ConflictingSelection` never leaves the reorder engine (it becomes a
//! no-op); every other kind can surface to callers. None of them is fatal to
//! the process: each is scoped to one sync or one reorder call.

use thiserror::Error;

/// Main error type for triage-replica
#[derive(Error, Debug)]
pub enum Error {
    /// Record id absent on a lookup expecting presence
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Insertion or target index out of range
    #[error("Invalid position {position} (sequence length {len})")]
    InvalidPosition { position: usize, len: usize },

    /// Drop target is itself part of the selection being moved
    #[error("Target record {0} is part of the selection")]
    ConflictingSelection(String),

    /// Remote source failed; carries partial-success counts
    #[error("Remote fetch failed: {message} ({groups_completed} groups, {records_fetched} records fetched before failure)")]
    RemoteFetchFailed {
        message: String,
        groups_completed: usize,
        records_fetched: usize,
    },

    /// Merge rolled back to the pre-merge state
    #[error("Merge aborted: {reason}")]
    MergeAborted { reason: String },

    /// Caller abandoned the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// triage-common error
    #[error(transparent)]
    Common(#[from] triage_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Records processed before the failure, for sync reporting
    ///
    /// Always 0 for a merge abort since merges commit all-or-nothing.
    pub fn processed(&self) -> usize {
        match self {
            Error::RemoteFetchFailed { records_fetched, .. } => *records_fetched,
            _ => 0,
        }
    }
}

/// Convenience Result type using triage-replica Error
pub type Result<T> = std::result::Result<T, Error>;
