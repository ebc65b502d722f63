//! Structured render logging.
//!
//! Every line logged for a render carries the request id and the operation,
//! and the pipeline runs inside the span from [`RenderLogger::create_span`].

use tracing::{error, info, warn, Span};

/// Logger bound to one render request.
#[derive(Debug, Clone)]
pub struct RenderLogger {
    request_id: String,
    operation: String,
}

impl RenderLogger {
    pub fn new(request_id: &str, operation: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Render started: {}", message
        );
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: &str, step: u32, total_steps: u32) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            stage = stage,
            "Stage {}/{}: {}", step, total_steps, stage
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Render warning: {}", message
        );
    }

    /// Log a failure with its machine-readable kind.
    pub fn log_error(&self, kind: &str, stage: Option<&str>, message: &str) {
        error!(
            request_id = %self.request_id,
            operation = %self.operation,
            error_kind = kind,
            stage = stage.unwrap_or("-"),
            "Render failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            "Render completed: {}", message
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span that the pipeline future is instrumented with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "render",
            request_id = %self.request_id,
            operation = %self.operation
        )
    }
}
