//! Validation errors and machine-readable error kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::layout::LayoutIssue;
use crate::render::AudioMode;

/// Machine-readable failure category shared by every error type in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request, out-of-bounds slot, missing cross-reference
    Validation,
    /// Source or external audio file missing
    NotFound,
    /// Encoder or probe binary absent
    ToolUnavailable,
    /// Stage exceeded its time budget
    Timeout,
    /// External tool exited non-zero or produced unusable output
    ProcessFailure,
    /// Pre-flight resource check failed (disk space)
    Resource,
    /// Caller cancelled the running stage
    Cancelled,
    /// Local filesystem failure
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ToolUnavailable => "tool_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProcessFailure => "process_failure",
            ErrorKind::Resource => "resource",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Layout has {} out-of-bounds slot(s): {}", .0.len(), format_issues(.0))]
    Layout(Vec<LayoutIssue>),

    #[error("Source '{source_id}' targets unknown slot '{slot_id}'")]
    UnknownSlot { source_id: String, slot_id: String },

    #[error("Audio source '{0}' does not name any video source")]
    UnknownAudioSource(String),

    #[error("Composite requires between 1 and {max} sources, got {count}")]
    SourceCount { count: usize, max: usize },

    #[error("Audio mode '{mode}' requires an external audio path")]
    MissingExternalAudio { mode: AudioMode },
}

impl ModelError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Validation errors are always [`ErrorKind::Validation`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }

    /// Whether this error belongs to the audio-merge stage configuration.
    pub fn is_audio_config(&self) -> bool {
        matches!(self, ModelError::MissingExternalAudio { .. })
    }
}

fn format_issues(issues: &[LayoutIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
