use thiserror::Error;

/// Camera subsystem errors.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("frame stream failed: {0}")]
    Stream(String),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(String),

    #[error("source already started")]
    AlreadyStarted,
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CameraError>;
