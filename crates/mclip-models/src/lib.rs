//! Shared data models for the moment render pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Layout templates (canvas, slots) and their validation
//! - Composite and render requests
//! - Encoding configuration and codec mapping
//! - Word timings for subtitles
//! - Progress events and machine-readable error kinds

pub mod composite;
pub mod encoding;
pub mod error;
pub mod layout;
pub mod progress;
pub mod render;
pub mod source;
pub mod subtitle;

// Re-export common types
pub use composite::{AudioPolicy, CompositeRequest, MAX_COMPOSITE_SOURCES};
pub use encoding::EncodingConfig;
pub use error::{ErrorKind, ModelError};
pub use layout::{validate_layout, Canvas, LayoutIssue, ScaleMode, Slot, Template};
pub use progress::{ProgressEvent, RenderPhase};
pub use render::{AudioMode, AudioSettings, Moment, RenderRequest};
pub use source::{CropRect, SourceRegion, TimeRange, VideoSource};
pub use subtitle::{SubtitleSettings, SubtitleStyle, WordTiming};
