//! FFprobe media information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Frame rate assumed when a stream reports none.
const FALLBACK_FPS: f64 = 30.0;

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub video_codec: String,
    /// Audio codec, if there is an audio stream
    pub audio_codec: Option<String>,
    pub has_audio: bool,
    /// Bitrate in bits/second
    pub bitrate: u64,
    /// File size in bytes
    pub size: u64,
}

/// Source of media facts for a path.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// Probe `path`. Fails with [`MediaError::FileNotFound`] for a missing
    /// file and [`MediaError::InvalidMedia`] when it has no video stream.
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// [`ProbeClient`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeClient {
    program: PathBuf,
}

impl Default for FfprobeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FfprobeClient {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffprobe"),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl ProbeClient for FfprobeClient {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let program = which::which(&self.program)
            .map_err(|_| MediaError::FfprobeNotFound(self.program.display().to_string()))?;

        debug!(path = %path.display(), "Probing media");

        let output = Command::new(program)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(PROBE_TIMEOUT, output)
            .await
            .map_err(|_| MediaError::Timeout {
                secs: PROBE_TIMEOUT.as_secs(),
                tail: None,
            })??;

        if !output.status.success() {
            return Err(MediaError::FfprobeFailed {
                message: format!("FFprobe failed for {}", path.display()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
            });
        }

        parse_probe_output(&output.stdout)
            .map_err(|e| match e {
                MediaError::InvalidMedia(msg) => {
                    MediaError::InvalidMedia(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }
}

/// Turn ffprobe's `-print_format json` output into [`MediaInfo`].
pub fn parse_probe_output(json: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_media("No video stream found"))?;

    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    // avg_frame_rate is "0/0" for some containers; fall through to r_frame_rate
    let fps = [&video_stream.avg_frame_rate, &video_stream.r_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|r| parse_frame_rate(r))
        .unwrap_or(FALLBACK_FPS);

    Ok(MediaInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        video_codec: video_stream.codec_name.clone().unwrap_or_default(),
        audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
        has_audio: audio_stream.is_some(),
        bitrate,
        size,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.trim().parse().ok()?
    };
    (fps > 0.0 && fps.is_finite()).then_some(fps)
}
