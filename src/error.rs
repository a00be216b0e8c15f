//! Error types for cdx-export.
//!
//! Defines the error enum shared by the query core, the storage adapters and
//! the CLI.

use std::time::Duration;
use thiserror::Error;

/// Main error type for cdx-export operations.
#[derive(Error, Debug)]
pub enum CdxError {
    /// The engine rejected a query at submission (malformed SQL, permissions, quota).
    #[error("Submission error: {0}")]
    Submission(String),

    /// The polling budget ran out before the query reached a terminal state.
    #[error("Query {execution_id} did not finish within {}s", waited.as_secs())]
    Timeout {
        execution_id: String,
        waited: Duration,
    },

    /// The engine reported the query as FAILED or CANCELLED.
    #[error("Query {execution_id} failed: {reason}")]
    QueryFailed {
        execution_id: String,
        reason: String,
    },

    /// A required input was empty before any export work started.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A partition was not registered after being added.
    #[error("Partition crawl={crawl_id}, subset={subset} not found after ADD PARTITION")]
    PartitionMissing { crawl_id: String, subset: String },

    /// An operation was called on an execution in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller stopped waiting for a query. The remote job keeps running.
    #[error("Stopped waiting for query {0}")]
    Cancelled(String),

    /// Engine calls other than submission failed (status, results).
    #[error("Engine error: {0}")]
    Engine(String),

    /// Blob storage errors (missing object, access denied, bad location).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CdxError {
    /// Creates a submission error carrying the engine diagnostic.
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    /// Creates an empty-input error with the given message.
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }

    /// Creates an invalid-state error with the given message.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates an engine error with the given message.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Creates a storage error with the given message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Submission(_) => "Submission Error",
            Self::Timeout { .. } => "Timeout",
            Self::QueryFailed { .. } => "Query Failed",
            Self::EmptyInput(_) => "Empty Input",
            Self::PartitionMissing { .. } => "Partition Missing",
            Self::InvalidState(_) => "Invalid State",
            Self::Cancelled(_) => "Cancelled",
            Self::Engine(_) => "Engine Error",
            Self::Storage(_) => "Storage Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using CdxError.
pub type Result<T> = std::result::Result<T, CdxError>;
