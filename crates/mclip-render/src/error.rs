//! Render error types.

use std::path::PathBuf;
use thiserror::Error;

use mclip_media::MediaError;
use mclip_models::{ErrorKind, ModelError};

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid render request: {0}")]
    Validation(ModelError),

    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Extraction failed: {0}")]
    Extraction(#[source] MediaError),

    #[error("Composite failed: {0}")]
    Composite(#[source] MediaError),

    #[error("Subtitle burn failed: {0}")]
    Subtitles(#[source] MediaError),

    #[error("Audio merge failed: {0}")]
    AudioMerge(#[source] MediaError),

    #[error("Audio configuration error: {0}")]
    AudioConfig(ModelError),

    #[error("Publishing output failed: {0}")]
    Publish(#[source] MediaError),

    #[error("Scratch arena already in use: {}", .0.display())]
    ArenaInUse(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ModelError> for RenderError {
    fn from(err: ModelError) -> Self {
        if err.is_audio_config() {
            Self::AudioConfig(err)
        } else {
            Self::Validation(err)
        }
    }
}

impl RenderError {
    /// Machine-readable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Validation(_) | RenderError::AudioConfig(_) => ErrorKind::Validation,
            RenderError::NotFound(_) => ErrorKind::NotFound,
            RenderError::Extraction(e)
            | RenderError::Composite(e)
            | RenderError::Subtitles(e)
            | RenderError::AudioMerge(e)
            | RenderError::Publish(e) => e.kind(),
            RenderError::ArenaInUse(_) => ErrorKind::Resource,
            RenderError::Io(_) => ErrorKind::Io,
        }
    }

    /// Pipeline stage the error came from, if it came from one.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            RenderError::Extraction(_) => Some("extract"),
            RenderError::Composite(_) => Some("composite"),
            RenderError::Subtitles(_) => Some("subtitles"),
            RenderError::AudioMerge(_) | RenderError::AudioConfig(_) => Some("audio"),
            RenderError::Publish(_) => Some("publish"),
            RenderError::Validation(_)
            | RenderError::NotFound(_)
            | RenderError::ArenaInUse(_)
            | RenderError::Io(_) => None,
        }
    }

    /// Tail of the encoder's diagnostic output, if the failure carried one.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            RenderError::Extraction(e)
            | RenderError::Composite(e)
            | RenderError::Subtitles(e)
            | RenderError::AudioMerge(e)
            | RenderError::Publish(e) => e.diagnostics(),
            _ => None,
        }
    }
}
