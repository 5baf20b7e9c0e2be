//! Error types for keyflow.
//!
//! This module defines all error types used throughout the keyflow crate.
//! Delivery outcome classification (success / transient / session-gone) is a
//! domain enum in [`crate::delivery`], not an error: those outcomes are
//! handled locally inside the pipeline and never propagate to producers.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for keyflow operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Event Errors ===
    /// An event's computed timestamp offset was invalid.
    ///
    /// Resolved by dropping the event before it enters the buffer; never
    /// surfaced to the user.
    #[error("invalid event for key '{key_code}': computed offset {offset_ms} ms is negative")]
    InvalidEvent {
        /// The physical key identifier of the rejected event.
        key_code: String,
        /// The offending computed offset in milliseconds.
        offset_ms: i64,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Failure Cache Errors ===
    /// Failed to read the failure cache file.
    #[error("failed to read failure cache at {path}: {source}")]
    CacheRead {
        /// Path to the cache file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the failure cache file.
    #[error("failed to write failure cache at {path}: {source}")]
    CacheWrite {
        /// Path to the cache file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Pipeline Errors ===
    /// The pipeline task is no longer running.
    #[error("pipeline is not running")]
    PipelineClosed,

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for keyflow operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid-event error for a rejected keystroke.
    #[must_use]
    pub fn invalid_event(key_code: impl Into<String>, offset_ms: i64) -> Self {
        Self::InvalidEvent {
            key_code: key_code.into(),
            offset_ms,
        }
    }

    /// Check if this error is an invalid-event rejection.
    #[must_use]
    pub fn is_invalid_event(&self) -> bool {
        matches!(self, Self::InvalidEvent { .. })
    }

    /// Check if this error indicates the pipeline task has stopped.
    #[must_use]
    pub fn is_pipeline_closed(&self) -> bool {
        matches!(self, Self::PipelineClosed)
    }
}
