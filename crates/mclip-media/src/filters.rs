//! Single-input FFmpeg filter expressions used by the render stages.

use std::path::Path;

/// Escape a path for use inside a quoted filter option.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Burn-in filter for a subtitle file.
///
/// ASS/SSA files go through the `ass` filter so their own styling is kept;
/// anything else (SRT, WebVTT) through `subtitles`.
pub fn subtitle_burn_filter(path: &Path) -> String {
    let is_ass = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("ass") || e.eq_ignore_ascii_case("ssa"))
        .unwrap_or(false);
    let escaped = escape_filter_path(&path.to_string_lossy());
    if is_ass {
        format!("ass='{}'", escaped)
    } else {
        format!("subtitles='{}'", escaped)
    }
}

/// Scale to exact output dimensions.
pub fn scale_exact(width: u32, height: u32) -> String {
    format!("scale={}:{}", width, height)
}

/// Volume plus optional fade-in and fade-out for an audio track that ends
/// together with a video of `video_duration` seconds.
pub fn volume_with_fades(volume: f64, fade_in: f64, fade_out: f64, video_duration: f64) -> String {
    let mut filters = vec![format!("volume={}", volume)];
    if fade_in > 0.0 {
        filters.push(format!("afade=t=in:st=0:d={:.3}", fade_in));
    }
    if fade_out > 0.0 && video_duration > 0.0 {
        let start = (video_duration - fade_out).max(0.0);
        filters.push(format!("afade=t=out:st={:.3}:d={:.3}", start, fade_out));
    }
    filters.join(",")
}

/// Mix the clip's own audio (input 0) with an external track (input 1).
///
/// The mix lasts as long as the clip.
pub fn mix_with_external(original_volume: f64, external_filters: &str) -> String {
    format!(
        "[0:a]volume={}[orig];[1:a]{}[ext];[orig][ext]amix=inputs=2:duration=first:dropout_transition=0[aout]",
        original_volume, external_filters
    )
}
