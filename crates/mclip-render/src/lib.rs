//! Moment render pipeline.
//!
//! This crate provides:
//! - The staged render pipeline (extract, composite, subtitles, audio, publish)
//! - Progress buses for streaming events to a transport
//! - Per-request scratch arenas
//! - Configuration and structured logging

pub mod arena;
pub mod audio;
pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod subtitles;

pub use arena::ScratchArena;
pub use config::RenderConfig;
pub use error::{RenderError, RenderResult};
pub use logging::RenderLogger;
pub use pipeline::{plan_stages, RenderPipeline, Stage};
pub use progress::{ChannelProgressBus, LogProgressBus, NoopProgressBus, ProgressBus};
pub use subtitles::SubtitleRenderer;
