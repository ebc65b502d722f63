//! The moment render pipeline.
//!
//! ```text
//! extract -> [composite] -> [subtitles] -> [audio] -> publish
//! ```
//!
//! Stages run strictly in sequence inside a per-request [`ScratchArena`].
//! Only publish touches the caller's output path, so a failure at any stage
//! leaves nothing behind there, and the arena is removed on every path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Instrument};

use mclip_media::{
    move_file, CompositeOrchestrator, EncoderExecutor, FfmpegCommand, FfmpegProgress, MediaError,
    MediaResult, ProbeClient,
};
use mclip_models::{AudioMode, ProgressEvent, RenderPhase, RenderRequest, TimeRange};

use crate::arena::ScratchArena;
use crate::audio::{audio_command, ClipAudio};
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};
use crate::extract::extract_command;
use crate::logging::RenderLogger;
use crate::progress::ProgressBus;
use crate::subtitles::{burn_command, subtitle_window, SubtitleRenderer};

/// One encoder-backed pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Composite,
    Subtitles,
    Audio,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Composite => "composite",
            Stage::Subtitles => "subtitles",
            Stage::Audio => "audio",
        }
    }

    pub fn phase(&self) -> RenderPhase {
        match self {
            Stage::Extract => RenderPhase::Extracting,
            Stage::Composite => RenderPhase::Compositing,
            Stage::Subtitles => RenderPhase::Subtitles,
            Stage::Audio => RenderPhase::Audio,
        }
    }
}

/// Stages `request` asks for, in execution order.
///
/// Subtitles are planned whenever words are supplied; the stage may still
/// be skipped at run time if none fall inside the moment.
pub fn plan_stages(request: &RenderRequest) -> Vec<Stage> {
    let mut stages = vec![Stage::Extract];
    if request.composite.is_some() {
        stages.push(Stage::Composite);
    }
    if request.wants_subtitles() {
        stages.push(Stage::Subtitles);
    }
    if request.audio.mode != AudioMode::Original {
        stages.push(Stage::Audio);
    }
    stages
}

/// Renders [`RenderRequest`]s.
///
/// Holds no per-request state; concurrent renders share only the
/// filesystem, each in its own arena.
pub struct RenderPipeline {
    config: RenderConfig,
    executor: Arc<dyn EncoderExecutor>,
    probe: Arc<dyn ProbeClient>,
    compositor: CompositeOrchestrator,
    subtitle_renderer: Option<Arc<dyn SubtitleRenderer>>,
}

impl RenderPipeline {
    pub fn new(
        config: RenderConfig,
        executor: Arc<dyn EncoderExecutor>,
        probe: Arc<dyn ProbeClient>,
    ) -> Self {
        let compositor =
            CompositeOrchestrator::new(probe.clone(), executor.clone(), config.composite_config());
        Self {
            config,
            executor,
            probe,
            compositor,
            subtitle_renderer: None,
        }
    }

    pub fn with_subtitle_renderer(mut self, renderer: Arc<dyn SubtitleRenderer>) -> Self {
        self.subtitle_renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `request`, publishing progress to `bus`.
    ///
    /// Ends with exactly one terminal event: `complete` naming the output
    /// file, or `failed`.
    pub async fn render(&self, request: &RenderRequest, bus: &dyn ProgressBus) -> RenderResult<PathBuf> {
        let logger = RenderLogger::new(&request.id, "moment_render");
        let span = logger.create_span();
        let stages = plan_stages(request);
        let mut reporter = StageReporter::new(bus, &request.id, stages.len() as u32);

        let result = self
            .run(request, &stages, &mut reporter, &logger)
            .instrument(span)
            .await;

        match &result {
            Ok(path) => {
                metrics::counter!("mclip_renders_completed_total").increment(1);
                logger.log_completion(&path.display().to_string());
                bus.publish(&request.id, ProgressEvent::complete(path));
            }
            Err(e) => {
                metrics::counter!("mclip_render_failures_total", "kind" => e.kind().as_str())
                    .increment(1);
                logger.log_error(e.kind().as_str(), e.stage(), &e.to_string());
                if let Some(tail) = e.diagnostics() {
                    debug!(request_id = %request.id, "Encoder diagnostics:\n{}", tail);
                }
                bus.publish(
                    &request.id,
                    ProgressEvent::failed(reporter.last_percent, format!("[{}] {}", e.kind(), e)),
                );
            }
        }

        result
    }

    async fn run(
        &self,
        request: &RenderRequest,
        stages: &[Stage],
        reporter: &mut StageReporter<'_>,
        logger: &RenderLogger,
    ) -> RenderResult<PathBuf> {
        request.validate()?;
        self.check_inputs(request)?;

        logger.log_start(&format!(
            "{} [{:.3}s..{:.3}s] -> {}",
            request.source_path.display(),
            request.effective_start(),
            request.effective_end(),
            request.output_path.display()
        ));

        let arena = ScratchArena::create(&self.config.work_dir, &request.id).await?;

        let mut clip = WorkingClip {
            path: arena.file("extract.mp4"),
            duration: request.effective_duration(),
            canvas_size: None,
        };

        for (index, stage) in stages.iter().copied().enumerate() {
            logger.log_stage(stage.as_str(), index as u32 + 1, stages.len() as u32);
            reporter.begin(stage);

            match stage {
                Stage::Extract => {
                    let command = extract_command(
                        &request.source_path,
                        &clip.path,
                        request.effective_start(),
                        clip.duration,
                        request.output_size(),
                        &request.encoding,
                    );
                    self.run_encoder(stage, &command, clip.duration, reporter)
                        .await
                        .map_err(RenderError::Extraction)?;
                }
                Stage::Composite => {
                    let Some(composite) = &request.composite else {
                        continue;
                    };
                    let mut composite = composite
                        .clone()
                        .with_output_path(arena.file("composite.mp4"));
                    let window = TimeRange::new(request.effective_start(), request.effective_end());
                    for source in composite.sources.iter_mut() {
                        if source.region.trim.is_none() {
                            source.region.trim = Some(window);
                        }
                    }
                    composite.duration_limit = Some(
                        composite
                            .duration_limit
                            .map_or(clip.duration, |limit| limit.min(clip.duration)),
                    );

                    clip.path = self
                        .compositor
                        .composite(&composite, &mut |event: ProgressEvent| {
                            reporter.forward(stage, event)
                        })
                        .await
                        .map_err(RenderError::Composite)?;
                    let canvas = &composite.template.canvas;
                    clip.canvas_size = Some((canvas.width, canvas.height));
                    clip.duration = composite.duration_limit.unwrap_or(clip.duration);
                }
                Stage::Subtitles => {
                    if let Some(output) = self
                        .burn_subtitles(request, &clip, &arena, reporter, logger)
                        .await
                        .map_err(RenderError::Subtitles)?
                    {
                        clip.path = output;
                    }
                }
                Stage::Audio => {
                    let info = self
                        .probe
                        .probe(&clip.path)
                        .await
                        .map_err(RenderError::AudioMerge)?;
                    let output = arena.file("audio.mp4");
                    let clip_audio = ClipAudio {
                        has_audio: info.has_audio,
                        duration: info.duration,
                    };
                    if let Some(command) = audio_command(
                        &request.audio,
                        &clip.path,
                        clip_audio,
                        &output,
                        &request.encoding,
                    )? {
                        self.run_encoder(stage, &command, clip.duration, reporter)
                            .await
                            .map_err(RenderError::AudioMerge)?;
                        clip.path = output;
                    }
                }
            }

            reporter.finish(stage);
        }

        move_file(&clip.path, &request.output_path)
            .await
            .map_err(RenderError::Publish)?;

        if let Err(e) = arena.close().await {
            logger.log_warning(&format!("Failed to remove scratch arena: {}", e));
        }

        Ok(request.output_path.clone())
    }

    /// Not-found checks that must fail before any process starts.
    fn check_inputs(&self, request: &RenderRequest) -> RenderResult<()> {
        let mut required: Vec<&Path> = vec![request.source_path.as_path()];
        if request.audio.mode.requires_external() {
            if let Some(external) = &request.audio.external_path {
                required.push(external.as_path());
            }
        }
        if let Some(composite) = &request.composite {
            required.extend(composite.sources.iter().map(|s| s.region.path.as_path()));
        }

        match required.into_iter().find(|path| !path.exists()) {
            Some(missing) => Err(RenderError::NotFound(missing.to_path_buf())),
            None => Ok(()),
        }
    }

    /// Burn subtitles into `clip`; `None` when the stage has nothing to do.
    async fn burn_subtitles(
        &self,
        request: &RenderRequest,
        clip: &WorkingClip,
        arena: &ScratchArena,
        reporter: &mut StageReporter<'_>,
        logger: &RenderLogger,
    ) -> MediaResult<Option<PathBuf>> {
        let Some(settings) = request.subtitles.as_ref().filter(|s| s.enabled) else {
            return Ok(None);
        };

        let words = subtitle_window(&settings.words, request.effective_start(), request.effective_end());
        if words.is_empty() {
            debug!(request_id = %request.id, "No words inside the moment, skipping subtitles");
            return Ok(None);
        }

        let Some(renderer) = &self.subtitle_renderer else {
            logger.log_warning("Subtitles requested but no subtitle renderer is configured");
            return Ok(None);
        };

        let (width, height) = match clip.canvas_size {
            Some(size) => size,
            None => {
                let info = self.probe.probe(&clip.path).await?;
                (info.width, info.height)
            }
        };

        let subtitle_file = renderer
            .render(&words, &settings.style, width, height, arena.path())
            .await?;

        let output = arena.file("subtitled.mp4");
        let command = burn_command(&clip.path, &subtitle_file, &output, &request.encoding);
        self.run_encoder(Stage::Subtitles, &command, clip.duration, reporter)
            .await?;
        Ok(Some(output))
    }

    async fn run_encoder(
        &self,
        stage: Stage,
        command: &FfmpegCommand,
        expected_secs: f64,
        reporter: &mut StageReporter<'_>,
    ) -> MediaResult<()> {
        debug!(stage = stage.as_str(), args = %command.build_args().join(" "), "Encoder command");

        let total_ms = (expected_secs * 1000.0) as i64;
        self.executor
            .execute(command, self.config.stage_timeout, &mut |p: &FfmpegProgress| {
                reporter.update(stage, p.percentage(total_ms))
            })
            .await?;

        if !command.output().exists() {
            return Err(MediaError::ffmpeg_failed(
                format!("{} produced no output file", stage.as_str()),
                None,
                None,
            ));
        }
        Ok(())
    }
}

/// The clip as it moves through the stages.
struct WorkingClip {
    path: PathBuf,
    /// Expected length in seconds, the denominator for stage progress
    duration: f64,
    /// Canvas of the composite, once one has run
    canvas_size: Option<(u32, u32)>,
}

/// Maps per-stage progress onto one monotonic request-wide percent.
struct StageReporter<'a> {
    bus: &'a dyn ProgressBus,
    request_id: &'a str,
    total_steps: u32,
    completed: u32,
    last_percent: f64,
    stage_started: Option<Instant>,
}

/// Minimum overall advance between events of encoder-driven stages.
const STAGE_EVENT_STEP: f64 = 1.0;

impl<'a> StageReporter<'a> {
    fn new(bus: &'a dyn ProgressBus, request_id: &'a str, total_steps: u32) -> Self {
        Self {
            bus,
            request_id,
            total_steps: total_steps.max(1),
            completed: 0,
            last_percent: 0.0,
            stage_started: None,
        }
    }

    fn overall(&self, stage_percent: f64) -> f64 {
        let stage_fraction = (stage_percent / 100.0).clamp(0.0, 1.0);
        (self.completed as f64 + stage_fraction) / self.total_steps as f64 * 100.0
    }

    fn emit(&mut self, event: ProgressEvent) {
        let percent = event.percent.max(self.last_percent);
        self.last_percent = percent;
        self.bus.publish(
            self.request_id,
            event
                .with_percent(percent)
                .with_step(self.completed + 1, self.total_steps),
        );
    }

    fn begin(&mut self, stage: Stage) {
        self.stage_started = Some(Instant::now());
        let percent = self.overall(0.0);
        self.emit(ProgressEvent::new(
            stage.phase(),
            percent,
            format!("Starting {}", stage.as_str()),
        ));
    }

    fn update(&mut self, stage: Stage, stage_percent: f64) {
        let percent = self.overall(stage_percent);
        if percent - self.last_percent < STAGE_EVENT_STEP {
            return;
        }
        self.emit(ProgressEvent::new(
            stage.phase(),
            percent,
            format!("{} {:.0}%", stage.as_str(), stage_percent),
        ));
    }

    /// Re-base an event produced inside a stage onto the overall scale.
    fn forward(&mut self, stage: Stage, event: ProgressEvent) {
        let percent = self.overall(event.percent);
        let mut event = event;
        event.phase = stage.phase();
        event.percent = percent;
        self.emit(event);
    }

    fn finish(&mut self, stage: Stage) {
        if let Some(started) = self.stage_started.take() {
            metrics::histogram!("mclip_render_stage_seconds", "stage" => stage.as_str())
                .record(started.elapsed().as_secs_f64());
        }
        self.completed = (self.completed + 1).min(self.total_steps);
    }
}
