//! Progress events pushed to the transport layer.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    Extracting,
    Compositing,
    Subtitles,
    Audio,
    Complete,
    Failed,
}

impl RenderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderPhase::Extracting => "extracting",
            RenderPhase::Compositing => "compositing",
            RenderPhase::Subtitles => "subtitles",
            RenderPhase::Audio => "audio",
            RenderPhase::Complete => "complete",
            RenderPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderPhase::Complete | RenderPhase::Failed)
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    pub phase: RenderPhase,
    /// 0.0 to 100.0
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
    /// 1-based pipeline step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create an event; `percent` is clamped to [0, 100].
    pub fn new(phase: RenderPhase, percent: f64, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent: clamp_percent(percent),
            current_frame: None,
            total_frames: None,
            eta_secs: None,
            step: None,
            total_steps: None,
            message: message.into(),
            output_path: None,
            timestamp: Utc::now(),
        }
    }

    /// Final event naming the published file.
    pub fn complete(output_path: impl Into<PathBuf>) -> Self {
        let output_path = output_path.into();
        let mut event = Self::new(
            RenderPhase::Complete,
            100.0,
            format!("Render complete: {}", output_path.display()),
        );
        event.output_path = Some(output_path);
        event
    }

    pub fn failed(percent: f64, message: impl Into<String>) -> Self {
        Self::new(RenderPhase::Failed, percent, message)
    }

    pub fn with_frames(mut self, current: u64, total: u64) -> Self {
        self.current_frame = Some(current);
        self.total_frames = Some(total);
        self
    }

    pub fn with_eta(mut self, eta_secs: Option<f64>) -> Self {
        self.eta_secs = eta_secs;
        self
    }

    pub fn with_step(mut self, step: u32, total_steps: u32) -> Self {
        self.step = Some(step);
        self.total_steps = Some(total_steps);
        self
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = clamp_percent(percent);
        self
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}
