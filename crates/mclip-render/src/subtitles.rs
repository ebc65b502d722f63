//! Subtitle stage: word windowing and burn-in.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use mclip_media::filters::subtitle_burn_filter;
use mclip_media::{FfmpegCommand, MediaResult};
use mclip_models::{EncodingConfig, SubtitleStyle, WordTiming};

/// Turns word timings into a subtitle file the `ass`/`subtitles` filters can burn.
#[async_trait]
pub trait SubtitleRenderer: Send + Sync {
    /// Write a subtitle file for a `canvas_width`x`canvas_height` video into
    /// `target_dir` and return its path. Timings are relative to the clip.
    async fn render(
        &self,
        words: &[WordTiming],
        style: &SubtitleStyle,
        canvas_width: u32,
        canvas_height: u32,
        target_dir: &Path,
    ) -> MediaResult<PathBuf>;
}

/// Words overlapping `[start, end]`, shifted onto the clip's own timeline.
///
/// Shifted times are clamped to `[0, end - start]` so a word straddling
/// either edge is cut rather than dropped.
pub fn subtitle_window(words: &[WordTiming], start: f64, end: f64) -> Vec<WordTiming> {
    let length = (end - start).max(0.0);
    words
        .iter()
        .filter(|w| w.overlaps(start, end))
        .map(|w| {
            WordTiming::new(
                w.text.clone(),
                (w.start - start).clamp(0.0, length),
                (w.end - start).clamp(0.0, length),
            )
        })
        .collect()
}

/// Re-encode `input` with `subtitle_file` burned in; audio is copied.
pub fn burn_command(
    input: &Path,
    subtitle_file: &Path,
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .video_filter(subtitle_burn_filter(subtitle_file))
        .video_encoding(encoding)
        .pixel_format()
        .copy_audio()
        .faststart()
}
