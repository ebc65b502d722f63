//! Multi-source composite orchestration.
//!
//! Validates a [`CompositeRequest`], probes every source concurrently,
//! compiles the filter graph and runs one FFmpeg invocation that renders
//! the whole layout.

use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use mclip_models::{CompositeRequest, ProgressEvent, RenderPhase};

use crate::command::{EncoderExecutor, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::filter_graph::{CompositeInput, FilterGraphBuilder};
use crate::fs_utils::ensure_disk_space;
use crate::probe::{MediaInfo, ProbeClient};
use crate::progress::{CompositeProgressTracker, FfmpegProgress, DEFAULT_PROGRESS_STEP};

/// Default composite timeout (2 hours).
pub const DEFAULT_COMPOSITE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Default floor for the disk-space pre-flight check (500 MB).
pub const DEFAULT_MIN_FREE_BYTES: u64 = 500 * 1024 * 1024;

/// Tunables for [`CompositeOrchestrator`].
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    pub timeout: Duration,
    /// Lower bound for the free-space estimate
    pub min_free_bytes: u64,
    /// Minimum percent advance between progress events
    pub progress_step: f64,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMPOSITE_TIMEOUT,
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }
}

/// A composite ready to run: the command and the duration it renders.
#[derive(Debug, Clone)]
pub struct CompositePlan {
    pub command: FfmpegCommand,
    pub duration: f64,
}

/// Renders multi-source layouts in a single encoder pass.
#[derive(Clone)]
pub struct CompositeOrchestrator {
    probe: Arc<dyn ProbeClient>,
    executor: Arc<dyn EncoderExecutor>,
    config: CompositeConfig,
}

impl CompositeOrchestrator {
    pub fn new(
        probe: Arc<dyn ProbeClient>,
        executor: Arc<dyn EncoderExecutor>,
        config: CompositeConfig,
    ) -> Self {
        Self {
            probe,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &CompositeConfig {
        &self.config
    }

    /// Render `request` to `request.output_path`.
    ///
    /// Nothing is spawned until the request validates, every source file
    /// exists, the disk has room and every source probes successfully.
    /// `on_progress` receives rate-limited, non-decreasing events and one
    /// final 100% event on success.
    pub async fn composite(
        &self,
        request: &CompositeRequest,
        on_progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> MediaResult<PathBuf> {
        request.validate()?;

        for source in &request.sources {
            if !source.region.path.exists() {
                return Err(MediaError::FileNotFound(source.region.path.clone()));
            }
        }

        for slot in request.shared_slots() {
            warn!(slot = slot, "Multiple sources target the same slot; drawing each in z-order");
        }

        self.check_disk_space(request).await?;

        let layers = request.sources_in_z_order();
        let infos = try_join_all(
            layers
                .iter()
                .map(|(source, _)| self.probe.probe(&source.region.path)),
        )
        .await?;

        let plan = plan_composite(request, &infos)?;
        let canvas = &request.template.canvas;

        info!(
            template = %request.template.id,
            sources = layers.len(),
            canvas = %format!("{}x{}@{}", canvas.width, canvas.height, canvas.fps),
            duration = plan.duration,
            audio_policy = request.audio_policy.as_str(),
            "Starting composite"
        );

        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tracker = CompositeProgressTracker::new(plan.duration, canvas.fps)
            .with_step(self.config.progress_step);
        let total_frames = tracker.total_frames();

        on_progress(ProgressEvent::new(RenderPhase::Compositing, 0.0, "preparing"));

        self.executor
            .execute(&plan.command, self.config.timeout, &mut |p: &FfmpegProgress| {
                if let Some(event) = tracker.update(p) {
                    on_progress(event);
                }
            })
            .await?;

        if !request.output_path.exists() {
            return Err(MediaError::ffmpeg_failed(
                format!(
                    "Composite produced no output at {}",
                    request.output_path.display()
                ),
                None,
                None,
            ));
        }

        on_progress(
            ProgressEvent::new(RenderPhase::Compositing, 100.0, "Composite complete")
                .with_frames(total_frames, total_frames),
        );
        info!(output = %request.output_path.display(), "Composite complete");

        Ok(request.output_path.clone())
    }

    /// Estimate 2x the total input size, never below the configured floor.
    async fn check_disk_space(&self, request: &CompositeRequest) -> MediaResult<()> {
        let mut input_bytes = 0u64;
        for source in &request.sources {
            input_bytes += tokio::fs::metadata(&source.region.path).await?.len();
        }
        let required = input_bytes
            .saturating_mul(2)
            .max(self.config.min_free_bytes);

        let dir = request
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        debug!(required, dir = %dir.display(), "Checking free disk space");
        ensure_disk_space(dir, required)
    }
}

/// Build the encoder command for `request` given probe results for
/// `request.sources_in_z_order()`, in that order.
pub fn plan_composite(request: &CompositeRequest, infos: &[MediaInfo]) -> MediaResult<CompositePlan> {
    let layers = request.sources_in_z_order();
    if layers.len() != infos.len() {
        return Err(MediaError::validation(format!(
            "Expected {} probe results, got {}",
            layers.len(),
            infos.len()
        )));
    }

    let duration = output_duration(request, infos)?;

    let inputs = layers.iter().zip(infos).map(|((source, slot), info)| {
        let input = CompositeInput::new(source, slot).with_audio(info.has_audio);
        if info.width > 0 && info.height > 0 {
            input.with_probed_size(info.width, info.height)
        } else {
            input
        }
    });

    let preferred_audio = request.get_audio_source().map(|s| s.id.as_str());
    let graph = FilterGraphBuilder::new(&request.template.canvas)
        .inputs(inputs)
        .audio(request.audio_policy, preferred_audio)
        .build();

    let mut command = FfmpegCommand::with_output(&request.output_path);
    for (source, _) in &layers {
        let start = source.region.trim.map(|t| t.start).unwrap_or(0.0);
        command = command
            .input(&source.region.path)
            .seek(start)
            .duration(duration);
    }

    command = command
        .filter_complex(graph.expression.clone())
        .map(graph.video_map());

    command = match graph.audio_map() {
        Some(audio) => command
            .map(audio)
            .video_encoding(&request.encoding)
            .audio_encoding(&request.encoding),
        None => command.video_encoding(&request.encoding).no_audio(),
    };

    let command = command
        .pixel_format()
        .output_duration(duration)
        .faststart();

    Ok(CompositePlan { command, duration })
}

/// Shortest available source duration, capped by the request's limit.
fn output_duration(request: &CompositeRequest, infos: &[MediaInfo]) -> MediaResult<f64> {
    let available = request
        .sources_in_z_order()
        .iter()
        .zip(infos)
        .map(|((source, _), info)| match source.region.trim {
            Some(trim) => trim.duration(),
            None => info.duration,
        })
        .fold(None, |min: Option<f64>, d| Some(min.map_or(d, |m| m.min(d))));

    let duration = match (available, request.duration_limit) {
        (Some(d), Some(limit)) => d.min(limit),
        (Some(d), None) => d,
        (None, Some(limit)) => limit,
        (None, None) => {
            return Err(MediaError::validation(
                "Composite has no enabled sources and no duration limit",
            ))
        }
    };

    if duration.is_nan() || duration <= 0.0 {
        return Err(MediaError::invalid_media(format!(
            "Composite duration must be positive, got {:.3}s",
            duration
        )));
    }
    Ok(duration)
}
