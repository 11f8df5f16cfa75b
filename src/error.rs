//! Error types for channel-ingest
//!
//! This module provides error handling for the library, including:
//! - A crate-wide [`Error`] enum with contextual variants
//! - Database-specific errors for the document store
//! - Classification into the caller-facing [`FailureReason`] taxonomy

use crate::types::FailureReason;
use thiserror::Error;

/// Result type alias for channel-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-ingest
///
/// Every fallible operation in the library returns this type. The ingestor
/// never lets one of these escape a run for a single channel's problem; it
/// converts them into per-channel outcomes via [`Error::failure_reason`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or run-parameter error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Channel could not be resolved, or has no upload index
    #[error("channel not found: {0}")]
    NotFound(String),

    /// Local quota budget would be exceeded by the requested reservation
    #[error("quota exceeded: requested {requested} units with {used} of {ceiling} already used")]
    QuotaExceeded {
        /// Cost of the rejected reservation
        requested: u64,
        /// Units consumed before the reservation was attempted
        used: u64,
        /// Hard ceiling enforced by the tracker
        ceiling: u64,
    },

    /// The upstream API itself reported that its daily quota is spent
    #[error("upstream quota exhausted: {0}")]
    UpstreamQuota(String),

    /// Transport-level failure talking to the upstream API
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream API answered with a non-success status
    #[error("upstream API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code returned by the upstream API
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Storage sink failure
    #[error("{sink} sink failed: {message}")]
    Sink {
        /// Name of the failing sink ("file" or "document")
        sink: String,
        /// The reason the write failed
        message: String,
    },

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

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error must stop the whole run rather than one channel
    ///
    /// The quota budget is shared by every channel, so running out of it
    /// (locally or upstream) ends the run. Everything else is per-channel.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Error::QuotaExceeded { .. } | Error::UpstreamQuota(_))
    }

    /// Map this error onto the caller-facing failure taxonomy
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Error::NotFound(_) => FailureReason::NotFound,
            Error::QuotaExceeded { .. } | Error::UpstreamQuota(_) => FailureReason::QuotaExceeded,
            Error::Transport(_) | Error::Api { .. } => FailureReason::Transport {
                message: self.to_string(),
            },
            Error::Sink { .. }
            | Error::Io(_)
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::Serialization(_) => FailureReason::SinkFailure {
                message: self.to_string(),
            },
            Error::Config { .. } | Error::Other(_) => FailureReason::Transport {
                message: self.to_string(),
            },
        }
    }
}
