// src/errors.rs

//! Crate-wide error types.
//!
//! - [`AvatarError`] covers bootstrap failures (config, IO, server setup).
//! - [`RenderError`] is the render pipeline taxonomy. Every process or
//!   filesystem failure inside the pipeline is converted into one of its
//!   variants; the HTTP layer maps each [`ErrorKind`] to a stable response.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AvatarError>;

/// Post-condition failures detected by the artifact resolver.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("expected artifact {path:?} was not produced")]
    Missing { path: PathBuf },

    #[error("artifact {path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Failure of a single render request.
///
/// Exit codes and stderr tails are carried for diagnostics only. Stderr is
/// never part of the `Display` output, and neither reaches API callers:
/// those see [`RenderError::summary`].
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("renderer capacity exhausted ({running} running, {queued} queued)")]
    Overloaded { running: usize, queued: usize },

    #[error("failed to start renderer {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("renderer failed ({})", describe_exit(.exit_code))]
    RenderFailure {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("renderer exceeded its {timeout:?} deadline")]
    TimedOut {
        timeout: Duration,
        stderr_tail: String,
    },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("render cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl RenderError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RenderError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            RenderError::Overloaded { .. } => ErrorKind::Overloaded,
            RenderError::Spawn { .. } => ErrorKind::Spawn,
            RenderError::RenderFailure { .. } => ErrorKind::RenderFailure,
            RenderError::TimedOut { .. } => ErrorKind::TimedOut,
            RenderError::Artifact(ArtifactError::Missing { .. }) => ErrorKind::ArtifactMissing,
            RenderError::Artifact(ArtifactError::Corrupt { .. }) => ErrorKind::ArtifactCorrupt,
            RenderError::Cancelled => ErrorKind::Cancelled,
            RenderError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Renderer stderr captured before the failure, if any.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            RenderError::RenderFailure { stderr_tail, .. }
            | RenderError::TimedOut { stderr_tail, .. } => Some(stderr_tail.as_str()),
            _ => None,
        }
    }

    /// Caller-safe description of this error.
    pub fn summary(&self) -> ErrorSummary {
        let (message, field) = match self {
            RenderError::InvalidParameter { field, reason } => {
                (reason.clone(), Some(field.clone()))
            }
            // The io error text names host paths; keep it in the logs.
            RenderError::Spawn { .. } => ("failed to start renderer".to_string(), None),
            RenderError::Artifact(_) => (
                "renderer did not produce a valid artifact".to_string(),
                None,
            ),
            // Exit codes and io error text stay in the logs.
            RenderError::RenderFailure { .. } => ("renderer failed".to_string(), None),
            RenderError::Internal(_) => ("internal error".to_string(), None),
            other => (other.to_string(), None),
        };
        let kind = self.kind();
        ErrorSummary {
            kind,
            message,
            field,
            retryable: kind.is_retryable(),
        }
    }
}

/// Stable classification of [`RenderError`] used for status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameter,
    Overloaded,
    Spawn,
    RenderFailure,
    TimedOut,
    ArtifactMissing,
    ArtifactCorrupt,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::Spawn => "spawn",
            ErrorKind::RenderFailure => "render_failure",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::ArtifactMissing => "artifact_missing",
            ErrorKind::ArtifactCorrupt => "artifact_corrupt",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Overloaded | ErrorKind::Spawn | ErrorKind::TimedOut
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}
