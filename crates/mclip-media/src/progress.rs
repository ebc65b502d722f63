//! FFmpeg progress parsing.
//!
//! FFmpeg is run with `-progress pipe:1`, which writes blocks of `key=value`
//! lines to stdout terminated by `progress=continue` or `progress=end`.

use serde::{Deserialize, Serialize};

use mclip_models::{ProgressEvent, RenderPhase};

/// Default minimum percent advance between two emitted events.
pub const DEFAULT_PROGRESS_STEP: f64 = 0.5;

/// Highest percent reported while the encoder is still running.
const RUNNING_PERCENT_CAP: f64 = 99.9;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }

    /// Frames produced so far, falling back to output time when FFmpeg
    /// does not report a frame count.
    pub fn frames_done(&self, fps: f64) -> u64 {
        if self.frame > 0 {
            self.frame
        } else if self.out_time_ms > 0 && fps > 0.0 {
            ((self.out_time_ms as f64 / 1000.0) * fps) as u64
        } else {
            0
        }
    }
}

/// Accumulates `key=value` lines into [`FfmpegProgress`] snapshots.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    /// Feed one stdout line; returns a snapshot when a block completes.
    pub fn feed(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.current.fps = fps;
                }
            }
            // Both keys carry microseconds
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            "out_time" => self.current.out_time = value.to_string(),
            "speed" => {
                if let Ok(speed) = value.trim_end_matches('x').trim().parse() {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                self.current.is_complete = value == "end";
                return Some(self.current.clone());
            }
            _ => {}
        }
        None
    }
}

/// Coarse label for a composite percent.
pub fn progress_label(percent: f64) -> &'static str {
    if percent < 10.0 {
        "preparing"
    } else if percent < 90.0 {
        "compositing"
    } else if percent < 99.0 {
        "encoding"
    } else {
        "finalizing"
    }
}

/// Turns raw encoder snapshots into rate-limited composite progress events.
#[derive(Debug, Clone)]
pub struct CompositeProgressTracker {
    total_frames: u64,
    fps: f64,
    step: f64,
    last_emitted: f64,
}

impl CompositeProgressTracker {
    /// Track an encode of `duration_secs` at `fps`.
    pub fn new(duration_secs: f64, fps: f64) -> Self {
        let total_frames = if duration_secs > 0.0 && fps > 0.0 {
            (duration_secs * fps).ceil() as u64
        } else {
            0
        };
        Self {
            total_frames,
            fps,
            step: DEFAULT_PROGRESS_STEP,
            last_emitted: 0.0,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step.max(0.0);
        self
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Event for `progress`, or `None` if percent has not advanced by at
    /// least the configured step since the last emitted event.
    pub fn update(&mut self, progress: &FfmpegProgress) -> Option<ProgressEvent> {
        if self.total_frames == 0 {
            return None;
        }

        let frames = progress.frames_done(self.fps).min(self.total_frames);
        let percent =
            (frames as f64 / self.total_frames as f64 * 100.0).min(RUNNING_PERCENT_CAP);

        if percent - self.last_emitted < self.step || percent <= self.last_emitted {
            return None;
        }
        self.last_emitted = percent;

        let eta = self.eta_secs(frames, progress.speed);
        let message = format!(
            "{} ({}/{} frames)",
            progress_label(percent),
            frames,
            self.total_frames
        );
        Some(
            ProgressEvent::new(RenderPhase::Compositing, percent, message)
                .with_frames(frames, self.total_frames)
                .with_eta(eta),
        )
    }

    /// Remaining frames over frames-per-second actually being produced.
    fn eta_secs(&self, frames: u64, speed: f64) -> Option<f64> {
        let rate = speed * self.fps;
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.total_frames.saturating_sub(frames) as f64;
        Some(remaining / rate)
    }
}
