// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication engine.
//!
//! Errors are categorized by their source (catalog, data source, sink,
//! SQLite, etc.) and carry enough context to find the offending stream.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `MalformedCatalog` | No | Catalog input is missing required fields |
//! | `UnsupportedReplicationMethod` | No | Stream asks for a method we can't dispatch |
//! | `Source` | Yes | Data source collaborator failed (query, connectivity) |
//! | `Sink` | Yes | Writing a message to the sink failed |
//! | `BookmarkStore` | No | Local SQLite errors (needs operator attention) |
//! | `Serialization` | No | A record or document could not be encoded |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Engine state machine violation |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! The engine never retries on its own. A failed run leaves the previous
//! bookmark of the failing stream in place, so callers may use
//! [`ReplicationError::is_retryable()`] to decide whether to simply run again.

use crate::source::SourceError;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during a replication run.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Catalog input is missing required fields.
    ///
    /// Raised while constructing a [`Catalog`](crate::catalog::Catalog),
    /// before any stream is touched. Aborts the run.
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),

    /// The stream's replication method is not one we know how to run.
    ///
    /// Aborts the whole `sync` call: a bad method means the catalog was
    /// produced by a misconfigured upstream, not a transient failure.
    #[error("Unsupported replication method for stream {stream}: {method}")]
    UnsupportedReplicationMethod { stream: String, method: String },

    /// The data source collaborator failed.
    ///
    /// Propagated unchanged; retry and backoff belong to the source.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Writing to the message sink failed.
    #[error("Sink error: {0}")]
    Sink(#[from] std::io::Error),

    /// SQLite error during bookmark persistence.
    ///
    /// Not retryable - indicates local database issues that need attention.
    #[error("Bookmark store error: {0}")]
    BookmarkStore(#[from] sqlx::Error),

    /// A record, catalog or report could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create an unsupported-method error for a stream.
    pub fn unsupported_method(stream: impl Into<String>, method: impl Into<String>) -> Self {
        Self::UnsupportedReplicationMethod {
            stream: stream.into(),
            method: method.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Source(_) => true,
            Self::Sink(_) => true,
            Self::MalformedCatalog(_) => false,
            Self::UnsupportedReplicationMethod { .. } => false,
            Self::BookmarkStore(_) => false,
            Self::Serialization(_) => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Short, stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedCatalog(_) => "malformed_catalog",
            Self::UnsupportedReplicationMethod { .. } => "unsupported_replication_method",
            Self::Source(_) => "source",
            Self::Sink(_) => "sink",
            Self::BookmarkStore(_) => "bookmark_store",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
            Self::Internal(_) => "internal",
        }
    }
}
