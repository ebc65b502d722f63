//! FFmpeg command builder and runner.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use mclip_models::encoding::OUTPUT_PIXEL_FORMAT;
use mclip_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::process::{ProcessRunner, FAILURE_TAIL_LINES};
use crate::progress::{FfmpegProgress, ProgressParser};

/// One `-i` input together with the arguments that precede it.
#[derive(Debug, Clone, PartialEq)]
struct FfmpegInput {
    path: PathBuf,
    args: Vec<String>,
}

/// Builder for FFmpeg commands.
///
/// Input-side helpers (`seek`, `duration`, `input_arg`) apply to the most
/// recently added input; everything else lands between the last input and
/// the output path.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput {
                path: input.as_ref().to_path_buf(),
                args: Vec::new(),
            }],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create a command with no inputs yet; add them with [`FfmpegCommand::input`].
    pub fn with_output(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Append another input.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput {
            path: path.as_ref().to_path_buf(),
            args: Vec::new(),
        });
        self
    }

    /// Add an argument before the most recent `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(input) = self.inputs.last_mut() {
            input.args.push(arg.into());
        }
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(input) = self.inputs.last_mut() {
            input.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before the current input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set input read duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Cap the output duration.
    pub fn output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream specifier or filter label into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Video encoder, bitrate and preset from an encoding config.
    pub fn video_encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.video_args())
    }

    /// Audio encoder and bitrate from an encoding config.
    pub fn audio_encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.audio_args())
    }

    /// Normalize to the broadly compatible output pixel format.
    pub fn pixel_format(self) -> Self {
        self.output_arg("-pix_fmt").output_arg(OUTPUT_PIXEL_FORMAT)
    }

    /// Copy the video stream without re-encoding.
    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    /// Copy the audio stream without re-encoding.
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Drop audio.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Stop at the shortest mapped stream.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Move the container index to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output file path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Input paths in argument order.
    pub fn input_paths(&self) -> impl Iterator<Item = &Path> {
        self.inputs.iter().map(|input| input.path.as_path())
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Machine-readable progress on stdout; stderr carries only diagnostics
        args.push("-nostats".to_string());
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Something that can run an encoder invocation to completion.
///
/// Production code uses [`FfmpegExecutor`]; tests substitute recording fakes.
#[async_trait]
pub trait EncoderExecutor: Send + Sync {
    /// Run `command`, forwarding parsed progress snapshots to `on_progress`.
    async fn execute(
        &self,
        command: &FfmpegCommand,
        timeout: Duration,
        on_progress: &mut (dyn for<'p> FnMut(&'p FfmpegProgress) + Send),
    ) -> MediaResult<()>;
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
#[derive(Debug, Clone)]
pub struct FfmpegExecutor {
    /// FFmpeg binary name or path
    program: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegExecutor {
    /// Create a new runner using `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            cancel_rx: None,
        }
    }

    /// Use a specific FFmpeg binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }
}

#[async_trait]
impl EncoderExecutor for FfmpegExecutor {
    async fn execute(
        &self,
        command: &FfmpegCommand,
        timeout: Duration,
        on_progress: &mut (dyn for<'p> FnMut(&'p FfmpegProgress) + Send),
    ) -> MediaResult<()> {
        let program = which::which(&self.program)
            .map_err(|_| MediaError::FfmpegNotFound(self.program.display().to_string()))?;

        let args = command.build_args();
        debug!("Running FFmpeg: {} {}", program.display(), args.join(" "));

        let mut runner = ProcessRunner::new(program);
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }

        let mut parser = ProgressParser::default();
        let output = runner
            .run(
                &args,
                timeout,
                &mut |line: &str| {
                    if let Some(progress) = parser.feed(line) {
                        on_progress(&progress);
                    }
                },
                &mut |line: &str| trace!(target: "mclip::ffmpeg", "{}", line),
            )
            .await?;

        if output.status.success() {
            info!(output = %command.output().display(), "FFmpeg finished");
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(output.diagnostics.last(FAILURE_TAIL_LINES)),
                output.status.code(),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::FfmpegNotFound(program.display().to_string()))
}

/// Check if FFprobe is available.
pub fn check_ffprobe(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::FfprobeNotFound(program.display().to_string()))
}
