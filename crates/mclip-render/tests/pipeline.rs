//! End-to-end pipeline behaviour against recording fakes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use mclip_media::{
    EncoderExecutor, FfmpegCommand, FfmpegProgress, MediaError, MediaInfo, MediaResult,
    ProbeClient,
};
use mclip_models::{
    AudioMode, AudioPolicy, AudioSettings, Canvas, CompositeRequest, ErrorKind, Moment,
    ProgressEvent, RenderPhase, RenderRequest, Slot, SourceRegion, SubtitleSettings,
    SubtitleStyle, Template, VideoSource, WordTiming,
};
use mclip_render::{ProgressBus, RenderConfig, RenderError, RenderPipeline, SubtitleRenderer};

#[derive(Default)]
struct RecordingExecutor {
    commands: Mutex<Vec<Vec<String>>>,
    /// Index of the invocation that times out
    timeout_at: Option<usize>,
    /// Index of the invocation that exits non-zero
    fail_at: Option<usize>,
}

impl RecordingExecutor {
    fn timing_out_at(index: usize) -> Self {
        Self {
            timeout_at: Some(index),
            ..Default::default()
        }
    }

    fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|args| args.join(" "))
            .collect()
    }
}

#[async_trait]
impl EncoderExecutor for RecordingExecutor {
    async fn execute(
        &self,
        command: &FfmpegCommand,
        _timeout: Duration,
        on_progress: &mut (dyn for<'p> FnMut(&'p FfmpegProgress) + Send),
    ) -> MediaResult<()> {
        let index = {
            let mut commands = self.commands.lock().unwrap();
            commands.push(command.build_args());
            commands.len() - 1
        };

        if self.timeout_at == Some(index) {
            tokio::fs::write(command.output(), b"partial").await?;
            return Err(MediaError::Timeout {
                secs: 5,
                tail: Some("frame=  120 fps=24".to_string()),
            });
        }

        if self.fail_at == Some(index) {
            tokio::fs::write(command.output(), b"partial").await?;
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with status 1",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }

        for out_time_ms in [0, 4_500, 9_000, 18_000] {
            on_progress(&FfmpegProgress {
                frame: (out_time_ms / 1000 * 30) as u64,
                out_time_ms,
                speed: 1.0,
                ..Default::default()
            });
        }
        tokio::fs::write(command.output(), b"video").await?;
        Ok(())
    }
}

struct FakeProbe;

#[async_trait]
impl ProbeClient for FakeProbe {
    async fn probe(&self, _path: &Path) -> MediaResult<MediaInfo> {
        Ok(MediaInfo {
            duration: 18.0,
            width: 720,
            height: 1280,
            fps: 30.0,
            video_codec: "h264".into(),
            audio_codec: Some("aac".into()),
            has_audio: true,
            bitrate: 0,
            size: 0,
        })
    }
}

#[derive(Default)]
struct FakeSubtitles {
    calls: Mutex<Vec<(Vec<WordTiming>, u32, u32)>>,
}

#[async_trait]
impl SubtitleRenderer for FakeSubtitles {
    async fn render(
        &self,
        words: &[WordTiming],
        _style: &SubtitleStyle,
        canvas_width: u32,
        canvas_height: u32,
        target_dir: &Path,
    ) -> MediaResult<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push((words.to_vec(), canvas_width, canvas_height));
        let path = target_dir.join("captions.ass");
        tokio::fs::write(&path, b"[Script Info]").await?;
        Ok(path)
    }
}

#[derive(Default)]
struct CollectingBus {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingBus {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressBus for CollectingBus {
    fn publish(&self, request_id: &str, event: ProgressEvent) {
        assert_eq!(request_id, "req-1");
        self.events.lock().unwrap().push(event);
    }
}

struct Harness {
    dir: TempDir,
    executor: Arc<RecordingExecutor>,
    subtitles: Arc<FakeSubtitles>,
    pipeline: RenderPipeline,
}

impl Harness {
    fn new() -> Self {
        Self::with_executor(RecordingExecutor::default())
    }

    fn with_executor(executor: RecordingExecutor) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("stream.mp4"), b"source").unwrap();

        let config = RenderConfig {
            work_dir: dir.path().join("work"),
            min_free_bytes: 0,
            ..Default::default()
        };
        let executor = Arc::new(executor);
        let subtitles = Arc::new(FakeSubtitles::default());
        let pipeline = RenderPipeline::new(config, executor.clone(), Arc::new(FakeProbe))
            .with_subtitle_renderer(subtitles.clone());

        Self {
            dir,
            executor,
            subtitles,
            pipeline,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn arena(&self) -> PathBuf {
        self.path("work").join("render-req-1")
    }

    fn request(&self) -> RenderRequest {
        RenderRequest::new(
            self.path("stream.mp4"),
            self.path("clips/out.mp4"),
            Moment::new(10.0, 25.0),
        )
        .unwrap()
        .with_id("req-1")
        .with_padding(2.0, 1.0)
    }
}

fn assert_monotonic(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].percent <= pair[1].percent,
            "progress went backwards: {} -> {}",
            pair[0].percent,
            pair[1].percent
        );
    }
}

#[tokio::test]
async fn test_extracts_padded_window_and_publishes() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let request = h.request();

    let output = h.pipeline.render(&request, &bus).await.unwrap();

    assert_eq!(output, h.path("clips/out.mp4"));
    assert_eq!(std::fs::read(&output).unwrap(), b"video");
    assert!(!h.arena().exists());

    let commands = h.executor.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].contains(&format!(
        "-ss 8.000 -t 18.000 -i {}",
        h.path("stream.mp4").display()
    )));

    let events = bus.events();
    assert_monotonic(&events);
    let last = events.last().unwrap();
    assert_eq!(last.phase, RenderPhase::Complete);
    assert_eq!(last.output_path.as_deref(), Some(output.as_path()));
    assert_eq!(
        events.iter().filter(|e| e.phase.is_terminal()).count(),
        1
    );
}

#[tokio::test]
async fn test_subtitles_outside_moment_are_skipped() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let request = h
        .request()
        .with_subtitles(SubtitleSettings::new(vec![
            WordTiming::new("too", 1.0, 1.5),
            WordTiming::new("late", 40.0, 40.5),
        ]))
        .with_audio(AudioSettings::new(AudioMode::Mute))
        .unwrap();

    h.pipeline.render(&request, &bus).await.unwrap();

    let commands = h.executor.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands.iter().all(|c| !c.contains("ass=") && !c.contains("subtitles=")));
    assert!(commands[1].contains("-c:v copy -an"));
    assert!(h.subtitles.calls.lock().unwrap().is_empty());
    assert_eq!(bus.events().last().unwrap().phase, RenderPhase::Complete);
}

#[tokio::test]
async fn test_subtitles_are_shifted_and_burned() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let request = h.request().with_subtitles(SubtitleSettings::new(vec![
        WordTiming::new("hello", 9.0, 9.5),
        WordTiming::new("world", 30.0, 31.0),
    ]));

    h.pipeline.render(&request, &bus).await.unwrap();

    let calls = h.subtitles.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (words, width, height) = &calls[0];
    assert_eq!(words.len(), 1);
    assert_eq!(words[0].text, "hello");
    assert!((words[0].start - 1.0).abs() < 1e-9);
    assert_eq!((*width, *height), (720, 1280));

    let commands = h.executor.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[1].contains("-vf ass='"));
    assert!(commands[1].contains("captions.ass'"));
}

#[tokio::test]
async fn test_timeout_fails_and_cleans_arena() {
    let h = Harness::with_executor(RecordingExecutor::timing_out_at(1));
    let bus = CollectingBus::default();
    let request = h
        .request()
        .with_audio(AudioSettings::new(AudioMode::Mute))
        .unwrap();

    let err = h.pipeline.render(&request, &bus).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.stage(), Some("audio"));
    assert_eq!(err.diagnostics(), Some("frame=  120 fps=24"));
    assert!(!h.arena().exists());
    assert!(!h.path("clips/out.mp4").exists());

    let events = bus.events();
    assert_monotonic(&events);
    let last = events.last().unwrap();
    assert_eq!(last.phase, RenderPhase::Failed);
    assert!(last.message.starts_with("[timeout]"));
}

#[tokio::test]
async fn test_missing_source_fails_before_any_process() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let mut request = h.request();
    request.source_path = h.path("gone.mp4");

    let err = h.pipeline.render(&request, &bus).await.unwrap_err();

    assert!(matches!(err, RenderError::NotFound(ref p) if p == &h.path("gone.mp4")));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.executor.commands().is_empty());
    assert!(!h.path("work").join("render-req-1").exists());
}

#[tokio::test]
async fn test_missing_external_audio_is_not_found() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let request = h
        .request()
        .with_audio(AudioSettings::new(AudioMode::Replace).with_external(h.path("track.mp3")))
        .unwrap();

    let err = h.pipeline.render(&request, &bus).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn test_identical_requests_produce_identical_commands() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let request = h
        .request()
        .with_audio(AudioSettings::new(AudioMode::Mute))
        .unwrap();

    h.pipeline.render(&request, &bus).await.unwrap();
    let first = h.executor.commands();
    h.pipeline.render(&request, &bus).await.unwrap();
    let all = h.executor.commands();

    assert_eq!(all.len(), 2 * first.len());
    assert_eq!(&all[first.len()..], first.as_slice());
}

fn stacked_composite(h: &Harness) -> CompositeRequest {
    std::fs::write(h.path("cam.mp4"), b"cam").unwrap();
    std::fs::write(h.path("game.mp4"), b"game").unwrap();

    let template = Template::new(
        Canvas::new(1080, 1920, 30.0),
        vec![
            Slot::new("top", 0, 0, 1080, 960),
            Slot::new("bottom", 0, 960, 1080, 960).with_z_index(1),
        ],
    )
    .with_id("stack", "Stacked");
    CompositeRequest::new(
        template,
        vec![
            VideoSource::new("cam", SourceRegion::new(h.path("cam.mp4")), "top"),
            VideoSource::new("game", SourceRegion::new(h.path("game.mp4")), "bottom"),
        ],
        AudioPolicy::SingleSource,
        None,
        h.path("ignored.mp4"),
    )
    .unwrap()
}

#[tokio::test]
async fn test_composite_inherits_window_and_defaults_to_first_source_audio() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let request = h
        .request()
        .with_composite(stacked_composite(&h))
        .with_subtitles(SubtitleSettings::new(vec![WordTiming::new("hi", 12.0, 12.4)]));

    h.pipeline.render(&request, &bus).await.unwrap();

    let commands = h.executor.commands();
    assert_eq!(commands.len(), 3);
    let composite_args = &commands[1];
    assert!(composite_args.contains(&format!(
        "-ss 8.000 -t 18.000 -i {}",
        h.path("cam.mp4").display()
    )));
    assert!(composite_args.contains("[0:a]volume=1[aout]"));
    assert!(composite_args.contains(&h.arena().join("composite.mp4").display().to_string()));
    assert!(!h.path("ignored.mp4").exists());

    // Subtitles are sized for the canvas, not the probed clip
    let calls = h.subtitles.calls.lock().unwrap();
    assert_eq!((calls[0].1, calls[0].2), (1080, 1920));

    let events = bus.events();
    assert_monotonic(&events);
    assert!(events.iter().any(|e| e.phase == RenderPhase::Compositing));
    assert_eq!(events.last().unwrap().phase, RenderPhase::Complete);
}

#[tokio::test]
async fn test_replace_swaps_in_external_track() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    std::fs::write(h.path("track.mp3"), b"music").unwrap();
    let request = h
        .request()
        .with_audio(
            AudioSettings::new(AudioMode::Replace)
                .with_external(h.path("track.mp3"))
                .with_fades(1.0, 2.0),
        )
        .unwrap();

    let output = h.pipeline.render(&request, &bus).await.unwrap();

    let commands = h.executor.commands();
    assert_eq!(commands.len(), 2);
    let audio = &commands[1];
    assert!(audio.contains(&format!(
        "-i {} -i {}",
        h.arena().join("extract.mp4").display(),
        h.path("track.mp3").display()
    )));
    assert!(audio.contains("-map 0:v:0 -map 1:a:0"));
    assert!(audio.contains("afade=t=in:st=0:d=1.000,afade=t=out:st=16.000:d=2.000"));
    assert!(audio.contains("-shortest"));

    assert_eq!(std::fs::read(&output).unwrap(), b"video");
    assert!(!h.arena().exists());
    assert_eq!(bus.events().last().unwrap().phase, RenderPhase::Complete);
}

#[tokio::test]
async fn test_mix_blends_clip_and_external_audio() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    std::fs::write(h.path("bed.mp3"), b"music").unwrap();
    let mut settings = AudioSettings::new(AudioMode::Mix).with_external(h.path("bed.mp3"));
    settings.volume = 0.3;
    let request = h.request().with_audio(settings).unwrap();

    h.pipeline.render(&request, &bus).await.unwrap();

    let commands = h.executor.commands();
    assert_eq!(commands.len(), 2);
    let audio = &commands[1];
    assert!(audio.contains("[1:a]volume=0.3[ext]"));
    assert!(audio.contains("amix=inputs=2:duration=first:dropout_transition=0[aout]"));
    assert!(audio.contains("-map 0:v:0 -map [aout]"));
    assert!(!audio.contains("-shortest"));
    assert!(h.path("clips/out.mp4").exists());
}

#[tokio::test]
async fn test_composite_failure_cleans_arena() {
    let h = Harness::with_executor(RecordingExecutor::failing_at(1));
    let bus = CollectingBus::default();
    let request = h.request().with_composite(stacked_composite(&h));

    let err = h.pipeline.render(&request, &bus).await.unwrap_err();

    assert!(matches!(err, RenderError::Composite(_)));
    assert_eq!(err.kind(), ErrorKind::ProcessFailure);
    assert_eq!(err.stage(), Some("composite"));
    assert_eq!(err.diagnostics(), Some("Invalid data found when processing input"));
    assert_eq!(h.executor.commands().len(), 2);
    assert!(!h.arena().exists());
    assert!(!h.path("clips/out.mp4").exists());

    let events = bus.events();
    assert_monotonic(&events);
    assert_eq!(
        events.iter().filter(|e| e.phase.is_terminal()).count(),
        1
    );
    assert_eq!(events.last().unwrap().phase, RenderPhase::Failed);
}

#[tokio::test]
async fn test_subtitles_progress_follows_composite_duration() {
    let h = Harness::new();
    let bus = CollectingBus::default();
    let request = h
        .request()
        .with_composite(stacked_composite(&h).with_duration_limit(9.0))
        .with_subtitles(SubtitleSettings::new(vec![WordTiming::new("hi", 12.0, 12.4)]));

    h.pipeline.render(&request, &bus).await.unwrap();

    // The encoder reports 4.5s then 9s; against a 9s clip that is half then done
    let subtitle_messages: Vec<String> = bus
        .events()
        .into_iter()
        .filter(|e| e.phase == RenderPhase::Subtitles)
        .map(|e| e.message)
        .collect();
    assert_eq!(
        subtitle_messages,
        vec!["Starting subtitles", "subtitles 50%", "subtitles 100%"]
    );
}

#[tokio::test]
async fn test_channel_bus_delivers_completion_to_slow_receiver() {
    let h = Harness::new();
    let (bus, mut rx) = mclip_render::progress::channel(2);
    let request = h.request();

    h.pipeline.render(&request, &bus).await.unwrap();

    let terminal = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some((id, event)) = rx.recv().await {
            assert_eq!(id, "req-1");
            if event.phase.is_terminal() {
                return Some(event);
            }
        }
        None
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(terminal.phase, RenderPhase::Complete);
    assert_eq!(terminal.output_path.as_deref(), Some(h.path("clips/out.mp4").as_path()));
}
