//! Extract stage: cut the moment out of the source.

use std::path::Path;

use mclip_media::filters::scale_exact;
use mclip_media::FfmpegCommand;
use mclip_models::EncodingConfig;

/// Re-encode `[start, start + duration]` of `source` into a fast-seekable clip.
///
/// `-ss` goes before `-i` so FFmpeg seeks on the input instead of decoding
/// up to the start point.
pub fn extract_command(
    source: &Path,
    output: &Path,
    start: f64,
    duration: f64,
    output_size: Option<(u32, u32)>,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let mut command = FfmpegCommand::new(source, output)
        .seek(start)
        .duration(duration);

    if let Some((width, height)) = output_size {
        command = command.video_filter(scale_exact(width, height));
    }

    command
        .video_encoding(encoding)
        .pixel_format()
        .audio_encoding(encoding)
        .faststart()
}
