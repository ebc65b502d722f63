//! Output encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec name (mapped to an encoder by [`EncodingConfig::encoder_name`])
pub const DEFAULT_VIDEO_CODEC: &str = "h264";
/// Default video bitrate in kbit/s
pub const DEFAULT_VIDEO_BITRATE_KBPS: u32 = 8000;
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate in kbit/s
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 192;
/// Output pixel format for broad player compatibility
pub const OUTPUT_PIXEL_FORMAT: &str = "yuv420p";

/// Video/audio encoding settings for one encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Codec name (e.g., "h264", "hevc", "vp9", "av1", or a raw encoder name)
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Video bitrate in kbit/s
    #[serde(default = "default_video_bitrate")]
    pub bitrate_kbps: u32,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate in kbit/s
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_video_bitrate() -> u32 {
    DEFAULT_VIDEO_BITRATE_KBPS
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> u32 {
    DEFAULT_AUDIO_BITRATE_KBPS
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            bitrate_kbps: DEFAULT_VIDEO_BITRATE_KBPS,
            preset: default_preset(),
            audio_codec: default_audio_codec(),
            audio_bitrate_kbps: DEFAULT_AUDIO_BITRATE_KBPS,
        }
    }
}

impl EncodingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn with_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// FFmpeg encoder for the configured codec name.
    ///
    /// Unrecognized names are passed through verbatim so callers can name
    /// an encoder directly (e.g. "h264_nvenc").
    pub fn encoder_name(&self) -> String {
        match self.codec.to_lowercase().as_str() {
            "h264" | "avc" => "libx264".to_string(),
            "hevc" | "h265" => "libx265".to_string(),
            "vp9" => "libvpx-vp9".to_string(),
            "av1" => "libaom-av1".to_string(),
            _ => self.codec.clone(),
        }
    }

    /// `-c:v ENCODER -b:v RATEk -preset PRESET`
    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.encoder_name(),
            "-b:v".to_string(),
            format!("{}k", self.bitrate_kbps),
            "-preset".to_string(),
            self.preset.clone(),
        ]
    }

    /// `-c:a CODEC -b:a RATEk`
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            format!("{}k", self.audio_bitrate_kbps),
        ]
    }
}
