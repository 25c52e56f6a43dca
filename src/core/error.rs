//! Error types for the cachescan library.
//!
//! Every failure in the workflow is reported as a [`ScanError`]. Library code
//! never panics; errors carry enough context (operation, fingerprint or
//! handle, HTTP status, response body) to diagnose a failed run without
//! re-running it with verbose logging.

use crate::core::types::WorkflowState;

use std::time::Duration;
use thiserror::Error;

/// The main error type for workflow operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// An I/O error occurred while reading the local file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found at the specified path.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },

    /// The scanning service answered with a non-success status, or could
    /// not be reached at all.
    #[error("{operation} for '{subject}' failed ({}): {body}", status_label(.status))]
    RemoteService {
        /// Name of the remote operation (`lookup`, `upload`, `status`).
        operation: &'static str,
        /// Fingerprint, handle or file name the operation was about.
        subject: String,
        /// HTTP status, absent when the request never got a response.
        status: Option<u16>,
        /// Response body, or the transport error message.
        body: String,
    },

    /// The service answered successfully but the body broke the protocol
    /// contract (missing field, unparseable JSON, out-of-range value).
    #[error("malformed {operation} response for '{subject}': {details}")]
    MalformedResponse {
        /// Name of the remote operation.
        operation: &'static str,
        /// Fingerprint, handle or file name the operation was about.
        subject: String,
        /// What was wrong with the response.
        details: String,
    },

    /// The operation did not finish within its time budget.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// How long the operation ran before giving up.
        elapsed: Duration,
    },

    /// The caller cancelled the workflow.
    #[error("scan was cancelled while {stage}")]
    Cancelled {
        /// Workflow state at the moment of cancellation.
        stage: WorkflowState,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl ScanError {
    /// Returns `true` for local file errors.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::FileNotFound { .. })
    }

    /// Returns `true` for errors reported by (or while reaching) the remote service.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteService { .. } | Self::MalformedResponse { .. })
    }

    /// Returns the HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteService { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the fingerprint, handle or file name this error is about.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::RemoteService { subject, .. } | Self::MalformedResponse { subject, .. } => {
                Some(subject)
            }
            Self::FileNotFound { path } => Some(path),
            _ => None,
        }
    }

    /// Maps a failure to open `path`, singling out a missing file.
    pub fn file_open(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Self::Io(err)
        }
    }

    /// Creates a `RemoteService` error for a non-success HTTP status.
    pub fn remote(
        operation: &'static str,
        subject: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::RemoteService {
            operation,
            subject: subject.into(),
            status: Some(status),
            body: body.into(),
        }
    }

    /// Creates a `RemoteService` error for a request that got no response.
    pub fn transport(
        operation: &'static str,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RemoteService {
            operation,
            subject: subject.into(),
            status: None,
            body: message.into(),
        }
    }

    /// Creates a `MalformedResponse` error.
    pub fn malformed(
        operation: &'static str,
        subject: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::MalformedResponse {
            operation,
            subject: subject.into(),
            details: details.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "no response".to_string(),
    }
}

/// A specialized `Result` type for workflow operations.
pub type ScanResult<T> = Result<T, ScanError>;
