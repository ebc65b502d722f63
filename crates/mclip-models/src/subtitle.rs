//! Word timings and subtitle settings.
//!
//! Transcription output arrives with several key spellings (`word` vs `text`,
//! `start_time` vs `start`, camelCase from browser clients). Serde aliases fold
//! them into one [`WordTiming`] at the boundary, so nothing downstream has to
//! care which spelling was used.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One transcribed word with its timing in source seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTiming {
    #[serde(alias = "word")]
    pub text: String,
    #[serde(alias = "start_time", alias = "startTime")]
    pub start: f64,
    #[serde(alias = "end_time", alias = "endTime")]
    pub end: f64,
}

impl WordTiming {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// Whether any part of the word falls inside `[start, end]`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.end > start && self.start < end
    }
}

/// Visual style forwarded untouched to the subtitle renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleStyle {
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    #[serde(default = "default_outline_color")]
    pub outline_color: String,
    #[serde(default = "default_outline_width")]
    pub outline_width: u32,
    /// Distance from the bottom edge in pixels
    #[serde(default = "default_margin_bottom")]
    pub margin_bottom: u32,
}

fn default_font_family() -> String {
    "Arial".to_string()
}
fn default_font_size() -> u32 {
    64
}
fn default_primary_color() -> String {
    "#FFFFFF".to_string()
}
fn default_outline_color() -> String {
    "#000000".to_string()
}
fn default_outline_width() -> u32 {
    3
}
fn default_margin_bottom() -> u32 {
    160
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            font_size: default_font_size(),
            primary_color: default_primary_color(),
            outline_color: default_outline_color(),
            outline_width: default_outline_width(),
            margin_bottom: default_margin_bottom(),
        }
    }
}

/// Subtitle stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub words: Vec<WordTiming>,
    #[serde(default)]
    pub style: SubtitleStyle,
}

fn default_enabled() -> bool {
    true
}

impl SubtitleSettings {
    pub fn new(words: Vec<WordTiming>) -> Self {
        Self {
            enabled: true,
            words,
            style: SubtitleStyle::default(),
        }
    }

    pub fn with_style(mut self, style: SubtitleStyle) -> Self {
        self.style = style;
        self
    }
}
