//! Error types for the ingest engine.
//!
//! `EngineError` covers everything that can stop an ingest job. The one
//! exception is `EngineError::Metadata`, which the copy engine only logs:
//! failing to carry timestamps or permissions over does not abort a job.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Broad classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A source root is missing or unreadable at the top level
    Scan,
    /// A template could not be rendered
    Template,
    /// Read or write failure while streaming bytes
    CopyIo,
    /// Verification digests differ
    Integrity,
    /// Timestamps or permissions could not be copied
    Metadata,
    /// The job was cancelled by the caller
    Cancelled,
    /// The job was used incorrectly (bad state, empty inputs)
    Usage,
}

/// Errors that can occur while scanning, rendering or copying.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source root does not exist
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source root exists but cannot be read
    #[error("Source access denied: {}", path.display())]
    SourceAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Template references an unknown token or is otherwise unrenderable
    #[error("Template error in '{template}': {reason}")]
    Template { template: String, reason: String },

    /// Failed to read from source file
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to destination file
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a destination directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Source and destination digests differ after a copy
    #[error("Checksum mismatch: {} ({algorithm} {expected} != {actual})", path.display())]
    IntegrityMismatch {
        path: PathBuf,
        algorithm: String,
        expected: String,
        actual: String,
    },

    /// Failed to copy timestamps or permissions
    #[error("Failed to copy metadata to {}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Cancelled via a `CancelToken`
    #[error("Job cancelled")]
    Cancelled,

    /// Operation not allowed in the job's current state
    #[error("Invalid job state: {reason}")]
    InvalidState { reason: String },

    /// The job request itself is unusable
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl EngineError {
    /// Build a template error for `template`.
    pub fn template(template: &str, reason: impl Into<String>) -> Self {
        Self::Template {
            template: template.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound { .. } | Self::SourceAccessDenied { .. } => ErrorKind::Scan,
            Self::Template { .. } => ErrorKind::Template,
            Self::ReadError { .. }
            | Self::WriteError { .. }
            | Self::DirectoryCreationFailed { .. } => ErrorKind::CopyIo,
            Self::IntegrityMismatch { .. } => ErrorKind::Integrity,
            Self::Metadata { .. } => ErrorKind::Metadata,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidState { .. } | Self::InvalidRequest { .. } => ErrorKind::Usage,
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::SourceAccessDenied { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::Metadata { source, .. } => source.raw_os_error().map(|e| e as u32),
            _ => None,
        }
    }
}
