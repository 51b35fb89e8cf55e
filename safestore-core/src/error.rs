/*!
Error types for the SafeStore core engine.
*/

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::payload::DataKind;

/// Result type used throughout the SafeStore core.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while validating or persisting a payload.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Payload is absent or structurally empty
    #[error("empty payload: {0}")]
    EmptyPayload(String),

    /// Payload present but below the caller-declared minimum count
    #[error("insufficient volume: only {count} items (minimum: {min})")]
    InsufficientVolume { count: usize, min: usize },

    /// Payload fails the kind-specific structural validator
    #[error("schema violation for {kind}: {reason}")]
    SchemaViolation { kind: DataKind, reason: String },

    /// Payload is neither a sequence of records nor a single record
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Writing the snapshot file failed
    #[error("failed to write {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O errors outside the final write (reads, listings, backups)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// The four failure kinds a save can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    EmptyPayload,
    InsufficientVolume,
    SchemaViolation,
    IoFailure,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::EmptyPayload => "empty_payload",
            FailureKind::InsufficientVolume => "insufficient_volume",
            FailureKind::SchemaViolation => "schema_violation",
            FailureKind::IoFailure => "io_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StoreError {
    /// Create a new empty payload error
    pub fn empty<S: Into<String>>(msg: S) -> Self {
        Self::EmptyPayload(msg.into())
    }

    /// Create a new schema violation error
    pub fn schema<S: Into<String>>(kind: DataKind, reason: S) -> Self {
        Self::SchemaViolation {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a new invalid payload error
    pub fn invalid_payload<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Map this error onto the save failure taxonomy.
    ///
    /// A payload of the wrong shape counts as a schema violation; everything
    /// that touches the filesystem counts as an I/O failure.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StoreError::EmptyPayload(_) => FailureKind::EmptyPayload,
            StoreError::InsufficientVolume { .. } => FailureKind::InsufficientVolume,
            StoreError::SchemaViolation { .. } | StoreError::InvalidPayload(_) => {
                FailureKind::SchemaViolation
            }
            StoreError::IoFailure { .. }
            | StoreError::Io(_)
            | StoreError::Json(_)
            | StoreError::Storage(_)
            | StoreError::Config(_) => FailureKind::IoFailure,
        }
    }

    /// True for failures caused by the payload itself rather than the filesystem.
    pub fn is_rejection(&self) -> bool {
        !matches!(self.failure_kind(), FailureKind::IoFailure)
    }
}
