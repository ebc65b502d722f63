//! Render requests: one moment of a source video to a finished file.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::composite::CompositeRequest;
use crate::encoding::EncodingConfig;
use crate::error::ModelError;
use crate::subtitle::SubtitleSettings;

/// A time range within the source video, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Moment {
    pub start_time: f64,
    pub end_time: f64,
}

impl Moment {
    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Final audio treatment of the rendered clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Keep the clip audio as is
    #[default]
    Original,
    /// Swap in an external track
    Replace,
    /// Mix the clip audio with an external track
    Mix,
    /// Drop audio entirely
    Mute,
}

impl AudioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioMode::Original => "original",
            AudioMode::Replace => "replace",
            AudioMode::Mix => "mix",
            AudioMode::Mute => "mute",
        }
    }

    pub fn requires_external(&self) -> bool {
        matches!(self, AudioMode::Replace | AudioMode::Mix)
    }
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioSettings {
    #[serde(default)]
    pub mode: AudioMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_path: Option<PathBuf>,
    /// Volume of the external track
    #[serde(default = "unit_volume")]
    pub volume: f64,
    /// Volume of the clip's own audio when mixing
    #[serde(default = "unit_volume")]
    pub original_volume: f64,
    /// Fade-in of the external track, in seconds
    #[serde(default)]
    pub fade_in: f64,
    /// Fade-out of the external track, in seconds
    #[serde(default)]
    pub fade_out: f64,
}

fn unit_volume() -> f64 {
    1.0
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            mode: AudioMode::Original,
            external_path: None,
            volume: 1.0,
            original_volume: 1.0,
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }
}

impl AudioSettings {
    pub fn new(mode: AudioMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_external(mut self, path: impl Into<PathBuf>) -> Self {
        self.external_path = Some(path.into());
        self
    }

    pub fn with_fades(mut self, fade_in: f64, fade_out: f64) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.mode.requires_external() && self.external_path.is_none() {
            return Err(ModelError::MissingExternalAudio { mode: self.mode });
        }
        if self.volume < 0.0 || self.original_volume < 0.0 {
            return Err(ModelError::invalid("Audio volumes must be non-negative"));
        }
        if self.fade_in < 0.0 || self.fade_out < 0.0 {
            return Err(ModelError::invalid("Audio fades must be non-negative"));
        }
        Ok(())
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Everything needed to turn one moment into a finished video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderRequest {
    #[serde(default = "new_request_id")]
    pub id: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub moment: Moment,
    #[serde(default)]
    pub padding_start: f64,
    #[serde(default)]
    pub padding_end: f64,
    /// Explicit output width for the extracted clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_width: Option<u32>,
    /// Explicit output height for the extracted clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<SubtitleSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeRequest>,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub encoding: EncodingConfig,
}

impl RenderRequest {
    /// Build a request for `moment` with defaults for every optional stage.
    pub fn new(
        source_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        moment: Moment,
    ) -> Result<Self, ModelError> {
        let request = Self {
            id: new_request_id(),
            source_path: source_path.into(),
            output_path: output_path.into(),
            moment,
            padding_start: 0.0,
            padding_end: 0.0,
            output_width: None,
            output_height: None,
            subtitles: None,
            composite: None,
            audio: AudioSettings::default(),
            encoding: EncodingConfig::default(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_padding(mut self, before: f64, after: f64) -> Self {
        self.padding_start = before;
        self.padding_end = after;
        self
    }

    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_width = Some(width);
        self.output_height = Some(height);
        self
    }

    pub fn with_subtitles(mut self, subtitles: SubtitleSettings) -> Self {
        self.subtitles = Some(subtitles);
        self
    }

    pub fn with_composite(mut self, composite: CompositeRequest) -> Self {
        self.composite = Some(composite);
        self
    }

    /// Set audio settings, re-checking that external-track modes have a track.
    pub fn with_audio(mut self, audio: AudioSettings) -> Result<Self, ModelError> {
        audio.validate()?;
        self.audio = audio;
        Ok(self)
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    /// `max(0, moment.start - padding_start)`
    pub fn effective_start(&self) -> f64 {
        (self.moment.start_time - self.padding_start).max(0.0)
    }

    /// `moment.end + padding_end`
    pub fn effective_end(&self) -> f64 {
        self.moment.end_time + self.padding_end
    }

    pub fn effective_duration(&self) -> f64 {
        self.effective_end() - self.effective_start()
    }

    /// Explicit output dimensions, when both are set.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output_width.zip(self.output_height)
    }

    /// Whether the subtitle stage has anything to work with.
    pub fn wants_subtitles(&self) -> bool {
        self.subtitles
            .as_ref()
            .map(|s| s.enabled && !s.words.is_empty())
            .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.moment.start_time < 0.0 || self.moment.end_time <= self.moment.start_time {
            return Err(ModelError::invalid(format!(
                "Moment must satisfy 0 <= start < end, got {}..{}",
                self.moment.start_time, self.moment.end_time
            )));
        }
        if self.padding_start < 0.0 || self.padding_end < 0.0 {
            return Err(ModelError::invalid("Padding must be non-negative"));
        }

        match (self.output_width, self.output_height) {
            (None, None) => {}
            (Some(w), Some(h)) => {
                if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
                    return Err(ModelError::invalid(format!(
                        "Output size must be positive and even, got {}x{}",
                        w, h
                    )));
                }
            }
            _ => {
                return Err(ModelError::invalid(
                    "Output width and height must be given together",
                ))
            }
        }

        if let Some(composite) = &self.composite {
            composite.validate()?;
        }

        self.audio.validate()
    }
}
