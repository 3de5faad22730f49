//! Supervisor errors

use api::ApiError;
use camera_capture::CameraError;
use thiserror::Error;

/// Supervisor error types
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Camera backend '{0}' is not available in this build")]
    UnsupportedBackend(String),

    #[error("Capture error: {0}")]
    Camera(#[from] CameraError),

    #[error("HTTP server error: {0}")]
    Api(#[from] ApiError),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error("Supervisor already started")]
    AlreadyStarted,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
