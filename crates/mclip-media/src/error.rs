//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use mclip_models::{ErrorKind, ModelError};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFprobe not found: {0}")]
    FfprobeNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Not a valid media file: {0}")]
    InvalidMedia(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {secs} seconds")]
    Timeout { secs: u64, tail: Option<String> },

    #[error("Insufficient disk space: need {required} bytes, {available} available")]
    InsufficientDiskSpace { required: u64, available: u64 },

    #[error(transparent)]
    Validation(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_media(message: impl Into<String>) -> Self {
        Self::InvalidMedia(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ModelError::invalid(message))
    }

    /// Machine-readable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::FfmpegNotFound(_) | MediaError::FfprobeNotFound(_) => {
                ErrorKind::ToolUnavailable
            }
            MediaError::FfmpegFailed { .. }
            | MediaError::FfprobeFailed { .. }
            | MediaError::InvalidMedia(_)
            | MediaError::JsonParse(_) => ErrorKind::ProcessFailure,
            MediaError::FileNotFound(_) => ErrorKind::NotFound,
            MediaError::Cancelled => ErrorKind::Cancelled,
            MediaError::Timeout { .. } => ErrorKind::Timeout,
            MediaError::InsufficientDiskSpace { .. } => ErrorKind::Resource,
            MediaError::Validation(_) => ErrorKind::Validation,
            MediaError::Io(_) => ErrorKind::Io,
        }
    }

    /// Tail of the external tool's diagnostic output, if any was captured.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            MediaError::Timeout { tail, .. } => tail.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            MediaError::FfmpegNotFound("ffmpeg".into()).kind(),
            ErrorKind::ToolUnavailable
        );
        assert_eq!(
            MediaError::Timeout { secs: 5, tail: None }.kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            MediaError::FileNotFound(PathBuf::from("a.mp4")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            MediaError::InsufficientDiskSpace { required: 2, available: 1 }.kind(),
            ErrorKind::Resource
        );
        assert_eq!(MediaError::validation("bad").kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_diagnostics_exposed() {
        let err = MediaError::ffmpeg_failed("boom", Some("line 1\nline 2".into()), Some(1));
        assert_eq!(err.diagnostics(), Some("line 1\nline 2"));
        assert!(MediaError::Cancelled.diagnostics().is_none());
    }
}
