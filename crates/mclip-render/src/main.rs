//! Moment render binary.
//!
//! Usage: `mclip-render <request.json>`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mclip_media::{CancelHandle, FfmpegExecutor, FfprobeClient};
use mclip_models::RenderRequest;
use mclip_render::{LogProgressBus, RenderConfig, RenderPipeline};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "mclip=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn load_request(path: &Path) -> Result<RenderRequest, String> {
    let raw = std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let request: RenderRequest =
        serde_json::from_slice(&raw).map_err(|e| format!("invalid request JSON: {}", e))?;
    request.validate().map_err(|e| e.to_string())?;
    Ok(request)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let Some(request_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: mclip-render <request.json>");
        std::process::exit(2);
    };

    let request = match load_request(&request_path) {
        Ok(request) => request,
        Err(e) => {
            error!(error_kind = "validation", "Failed to load render request: {}", e);
            std::process::exit(1);
        }
    };

    let config = RenderConfig::from_env();
    info!("Render config: {:?}", config);

    let cancel = Arc::new(CancelHandle::new());
    let executor = FfmpegExecutor::new()
        .with_program(config.ffmpeg_path.clone())
        .with_cancel(cancel.receiver());
    let probe = FfprobeClient::new().with_program(config.ffprobe_path.clone());
    let pipeline = RenderPipeline::new(config, Arc::new(executor), Arc::new(probe));

    let signal_cancel = cancel.clone();
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling render");
            signal_cancel.cancel();
        }
    });

    let result = pipeline.render(&request, &LogProgressBus).await;
    signal_handle.abort();

    match result {
        Ok(path) => {
            info!(request_id = %request.id, output = %path.display(), "Render finished");
        }
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            std::process::exit(1);
        }
    }
}
