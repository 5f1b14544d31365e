//! Migration error types and classification

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Error classes recorded in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    RemoteFault,
    Timeout,
    MissingArtifact,
    MalformedManifest,
    Download,
    Unsupported,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::RemoteFault => "remote_fault",
            Self::Timeout => "timeout",
            Self::MissingArtifact => "missing_artifact",
            Self::MalformedManifest => "malformed_manifest",
            Self::Download => "download",
            Self::Unsupported => "unsupported",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while exporting or importing functions
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The resource does not exist. Often a branch condition, not a failure.
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    /// The provider reported a failed update while settling
    #[error("update of {function} failed: {reason}")]
    UpdateFailed { function: String, reason: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("missing code package: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("malformed manifest {}: {reason}", path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            message: message.into(),
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Remote { .. } | Self::UpdateFailed { .. } => ErrorKind::RemoteFault,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::MissingArtifact(_) => ErrorKind::MissingArtifact,
            Self::MalformedManifest { .. } => ErrorKind::MalformedManifest,
            Self::Download(_) => ErrorKind::Download,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
