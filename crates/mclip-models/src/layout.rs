//! Layout templates: canvas and slot definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ModelError;

/// Highest canvas frame rate accepted.
pub const MAX_CANVAS_FPS: f64 = 120.0;

/// Output canvas of a composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Canvas {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Background color (any FFmpeg color expression)
    #[serde(default = "default_background")]
    pub background: String,
}

fn default_fps() -> f64 {
    30.0
}

fn default_background() -> String {
    "black".to_string()
}

impl Canvas {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            background: default_background(),
        }
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.width == 0 || self.height == 0 {
            return Err(ModelError::invalid(format!(
                "Canvas dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.fps > 0.0 && self.fps <= MAX_CANVAS_FPS) {
            return Err(ModelError::invalid(format!(
                "Canvas fps must be in (0, {}], got {}",
                MAX_CANVAS_FPS, self.fps
            )));
        }
        Ok(())
    }
}

/// How a source is fitted into its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Letterbox/pillarbox inside the slot, aspect preserved
    #[default]
    Fit,
    /// Cover the slot and crop the overflow, aspect preserved
    Fill,
    /// Force exact slot dimensions
    Stretch,
    /// Leave the source at its native size
    None,
}

impl ScaleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleMode::Fit => "fit",
            ScaleMode::Fill => "fill",
            ScaleMode::Stretch => "stretch",
            ScaleMode::None => "none",
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rectangular region of the canvas that one source is drawn into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Slot {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Layering key; higher values draw on top
    #[serde(default)]
    pub z_index: u32,
    #[serde(default)]
    pub scale_mode: ScaleMode,
    /// 0.0 (transparent) to 1.0 (opaque)
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_opacity() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl Slot {
    pub fn new(id: impl Into<String>, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width,
            height,
            z_index: 0,
            scale_mode: ScaleMode::default(),
            opacity: default_opacity(),
            enabled: true,
        }
    }

    pub fn with_z_index(mut self, z_index: u32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn with_scale_mode(mut self, scale_mode: ScaleMode) -> Self {
        self.scale_mode = scale_mode;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Slot width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    /// Describe every way this slot breaks the canvas bounds, if any.
    fn problems(&self, canvas: &Canvas) -> Vec<String> {
        let mut problems = Vec::new();

        if self.width == 0 || self.height == 0 {
            problems.push(format!("has zero size {}x{}", self.width, self.height));
        }
        if self.x < 0 {
            problems.push(format!("x={} is left of the canvas", self.x));
        }
        if self.y < 0 {
            problems.push(format!("y={} is above the canvas", self.y));
        }

        let right = self.x as i64 + self.width as i64;
        if right > canvas.width as i64 {
            problems.push(format!(
                "right edge {} exceeds canvas width {}",
                right, canvas.width
            ));
        }
        let bottom = self.y as i64 + self.height as i64;
        if bottom > canvas.height as i64 {
            problems.push(format!(
                "bottom edge {} exceeds canvas height {}",
                bottom, canvas.height
            ));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            problems.push(format!("opacity {} is outside [0, 1]", self.opacity));
        }

        problems
    }
}

/// A single offending slot found during layout validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutIssue {
    pub slot_id: String,
    pub message: String,
}

impl LayoutIssue {
    pub fn new(slot_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            slot_id: slot_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LayoutIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot '{}' {}", self.slot_id, self.message)
    }
}

/// Check every slot against the canvas bounds.
///
/// Returns one issue per offending slot; nothing is clamped.
pub fn validate_layout(canvas: &Canvas, slots: &[Slot]) -> Vec<LayoutIssue> {
    slots
        .iter()
        .filter_map(|slot| {
            let problems = slot.problems(canvas);
            if problems.is_empty() {
                None
            } else {
                Some(LayoutIssue::new(&slot.id, problems.join(", ")))
            }
        })
        .collect()
}

/// A reusable multi-source layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Template {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub canvas: Canvas,
    pub slots: Vec<Slot>,
}

impl Template {
    pub fn new(canvas: Canvas, slots: Vec<Slot>) -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            canvas,
            slots,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.id = id.into();
        self.name = name.into();
        self
    }

    /// Look up a slot by identifier.
    pub fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    /// Validate the canvas, then every slot against it.
    pub fn validate_layout(&self) -> Result<(), ModelError> {
        self.canvas.validate()?;
        let issues = validate_layout(&self.canvas, &self.slots);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Layout(issues))
        }
    }
}
