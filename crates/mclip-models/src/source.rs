//! Source media references used by composites.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ModelError;

/// Highest per-source volume multiplier.
pub const MAX_SOURCE_VOLUME: f64 = 2.0;

/// Pixel rectangle in source space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Temporal trim in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_valid(&self) -> bool {
        self.start >= 0.0 && self.end > self.start
    }
}

/// A region of a source media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceRegion {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<TimeRange>,
    /// Known source frame rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Known source width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Known source height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl SourceRegion {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            crop: None,
            trim: None,
            fps: None,
            width: None,
            height: None,
        }
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_trim(mut self, start: f64, end: f64) -> Self {
        self.trim = Some(TimeRange::new(start, end));
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Dimensions that reach the scaler: the crop if present, else the known size.
    pub fn aspect_dimensions(&self) -> Option<(u32, u32)> {
        match (self.crop, self.width, self.height) {
            (Some(crop), _, _) => Some((crop.width, crop.height)),
            (None, Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }

    pub(crate) fn validate(&self, source_id: &str) -> Result<(), ModelError> {
        if let Some(trim) = &self.trim {
            if !trim.is_valid() {
                return Err(ModelError::invalid(format!(
                    "Source '{}' trim must satisfy 0 <= start < end, got {}..{}",
                    source_id, trim.start, trim.end
                )));
            }
        }
        if let Some(crop) = &self.crop {
            if crop.width == 0 || crop.height == 0 {
                return Err(ModelError::invalid(format!(
                    "Source '{}' crop has zero size",
                    source_id
                )));
            }
        }
        Ok(())
    }
}

/// A source bound to a template slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSource {
    pub id: String,
    pub region: SourceRegion,
    pub slot_id: String,
    #[serde(default = "default_audio_enabled")]
    pub audio_enabled: bool,
    /// Volume multiplier in [0, 2]
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_audio_enabled() -> bool {
    true
}

fn default_volume() -> f64 {
    1.0
}

impl VideoSource {
    pub fn new(id: impl Into<String>, region: SourceRegion, slot_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            region,
            slot_id: slot_id.into(),
            audio_enabled: true,
            volume: default_volume(),
        }
    }

    pub fn muted(mut self) -> Self {
        self.audio_enabled = false;
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        if !(0.0..=MAX_SOURCE_VOLUME).contains(&self.volume) {
            return Err(ModelError::invalid(format!(
                "Source '{}' volume {} is outside [0, {}]",
                self.id, self.volume, MAX_SOURCE_VOLUME
            )));
        }
        self.region.validate(&self.id)
    }
}
