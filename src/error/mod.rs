//! Error types and Result aliases for paperwatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! Infrastructure failures use [`Error`]; the outcome of a single analysis
//! run is classified by [`PipelineError`].

use thiserror::Error;

/// Result type alias using paperwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for paperwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Run ledger storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Model backend error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// External collaborator (text extraction, write-back, prompt source) error.
    #[error("{collaborator} failed: {reason}")]
    Collaborator {
        collaborator: &'static str,
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Model backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend's response could not be decoded.
    #[error("malformed backend response: {0}")]
    Decode(String),

    /// The stream broke off mid-generation.
    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },
}

/// Terminal failure of one analysis run.
///
/// Each variant ends the run it belongs to and nothing else; none of them is
/// retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Text extraction produced nothing usable.
    #[error("no text could be extracted from the document")]
    ExtractionEmpty,

    /// The backend advertises no models at all.
    #[error("no language model is available")]
    NoModelAvailable,

    /// The backend failed or the run was cancelled while streaming.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The analysis was generated but could not be persisted.
    #[error("analysis complete, persistence failed: {0}")]
    WritebackFailed(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a collaborator error.
    pub fn collaborator(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            reason: reason.into(),
        }
    }
}

impl BackendError {
    /// Wrap a transport error raised while talking to `endpoint`.
    pub fn request(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Request {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

impl PipelineError {
    /// Whether the expensive generation step already succeeded.
    #[must_use]
    pub const fn analysis_survived(&self) -> bool {
        matches!(self, Self::WritebackFailed(_))
    }
}

#[cfg(test)]
mod tests;
