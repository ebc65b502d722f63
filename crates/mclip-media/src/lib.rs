#![deny(unreachable_patterns)]
//! FFmpeg CLI plumbing for the moment render pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A process runner that drains stdout and stderr concurrently, with
//!   timeout and cancellation
//! - Progress parsing from `-progress pipe:1`
//! - Media probing through FFprobe
//! - The multi-source filter-graph compiler and composite orchestrator

pub mod command;
pub mod composite;
pub mod error;
pub mod filter_graph;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod process;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, EncoderExecutor, FfmpegCommand, FfmpegExecutor};
pub use composite::{plan_composite, CompositeConfig, CompositeOrchestrator, CompositePlan};
pub use error::{MediaError, MediaResult};
pub use filter_graph::{CompositeInput, FilterGraph, FilterGraphBuilder};
pub use fs_utils::{available_space, ensure_disk_space, move_file};
pub use probe::{FfprobeClient, MediaInfo, ProbeClient};
pub use process::{CancelHandle, DiagnosticTail, ProcessOutput, ProcessRunner};
pub use progress::{CompositeProgressTracker, FfmpegProgress, ProgressParser};
