//! Status Route

use axum::{extract::State, Json};
use serde::Serialize;

use crate::SharedState;

/// Response for the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: &'static str,
    /// Milliseconds since epoch
    pub timestamp: u64,
    /// Capture manager initialized
    pub video_ready: bool,
    /// Camera opened and delivering frames
    pub camera_ready: bool,
}

/// Report server liveness and capture flags
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let health = state
        .read()
        .await
        .capture
        .as_ref()
        .map(|manager| manager.health())
        .unwrap_or_default();

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    Json(StatusResponse {
        status: "ok",
        message: "SecureCam server is running",
        timestamp,
        video_ready: health.initialized,
        camera_ready: health.ready,
    })
}
