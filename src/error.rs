//! Error types for chapter-dl
//!
//! - [`Error`] is the crate-wide error returned by every fallible operation
//! - [`DatabaseError`] wraps storage failures with the operation that failed
//! - [`DownloadError`] is the domain taxonomy for a single chapter attempt
//!   (resolution failures, transfer failures, invalid state)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for chapter-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chapter-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Chapter download error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Queue item or index entry not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Failures of a single chapter download attempt.
///
/// None of these stop the worker loop; they mark one queue item as failed.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The page resolver returned an empty page list
    #[error("No pages found")]
    NoPagesFound,

    /// The page resolver could not reach or parse the chapter source
    #[error("source unavailable for {chapter}: {reason}")]
    SourceUnavailable {
        /// Chapter reference that failed to resolve
        chapter: String,
        /// Underlying reason
        reason: String,
    },

    /// A single page transfer failed
    #[error("transfer failed for {address}: {reason}")]
    TransferFailed {
        /// Remote page address
        address: String,
        /// Underlying reason
        reason: String,
        /// HTTP status, when the server answered
        status: Option<u16>,
    },

    /// Artifact could not be written to its local path
    #[error("failed to write {path}: {reason}")]
    ArtifactWriteFailed {
        /// Local artifact path
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} chapter {id} in state {current_state}")]
    InvalidState {
        /// Chapter id
        id: String,
        /// The operation that was attempted (e.g., "delete", "retry")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },
}

impl DownloadError {
    /// Build a transfer failure without an HTTP status
    pub fn transfer(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DownloadError::TransferFailed {
            address: address.into(),
            reason: reason.to_string(),
            status: None,
        }
    }
}

/// Map an sqlx error into a query failure with context
pub(crate) fn query_failed(context: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |e| Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
}
