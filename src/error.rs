use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::camera::error::CameraError;
use crate::render::error::RenderError;

/// Failures that take a pipeline stage down. Delivered to fatal-error
/// callbacks; per-frame problems never become one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to spawn {thread} thread: {reason}")]
    Spawn { thread: &'static str, reason: String },

    #[error("camera produces no frames ({}s timeout)", .0.as_secs())]
    WatchdogTimeout(Duration),
}

/// Callback for reporting fatal errors to the embedding application.
pub type FatalErrorCallback = Arc<dyn Fn(&PipelineError) + Send + Sync>;
