//! Camera Routes

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use camera_capture::{CameraError, CameraSelector, CaptureManager, Facing};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{network, ApiError, SharedState};

/// Acknowledgment for control endpoints
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Camera description for home automation integrations
#[derive(Debug, Serialize)]
pub struct CameraInfo {
    pub name: &'static str,
    pub model: &'static str,
    pub manufacturer: &'static str,
    pub camera_ready: bool,
    pub streaming: bool,
    pub frame_width: u32,
    pub frame_height: u32,
    pub camera_id: Option<String>,
    pub facing: Option<Facing>,
    pub snapshot_url: String,
    pub stream_url: String,
}

/// Kick off camera start in the background and return immediately
pub async fn start_camera(State(state): State<SharedState>) -> Result<Json<ActionResponse>, ApiError> {
    let (manager, timeout) = {
        let state = state.read().await;
        (state.capture.clone(), state.config.camera_start_timeout())
    };
    let manager = manager
        .filter(|manager| manager.is_initialized())
        .ok_or_else(|| ApiError::Unavailable("Video manager not available".to_string()))?;

    info!("Manual camera start requested");
    tokio::task::spawn_blocking(move || match bring_up(&manager, timeout) {
        Ok(()) => info!("Camera started from HTTP request"),
        Err(e) => warn!("Camera start from HTTP request failed: {}", e),
    });

    Ok(Json(ActionResponse {
        status: "success",
        message: "Camera initialization started in background",
    }))
}

fn bring_up(manager: &CaptureManager, timeout: Duration) -> Result<(), CameraError> {
    manager.start(CameraSelector::Auto)?;
    manager.wait_until_ready(timeout)?;
    manager.go_live()
}

/// Camera capabilities and URLs
pub async fn camera_info(State(state): State<SharedState>, headers: HeaderMap) -> Json<CameraInfo> {
    let state = state.read().await;
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    let base = network::base_url(host, &state.config);
    debug!("Camera info requested, advertising {}", base);

    let manager = state.capture.as_ref();
    let health = manager.map(|m| m.health()).unwrap_or_default();
    let active = manager.and_then(|m| m.active_camera());
    let (frame_width, frame_height) = manager
        .map(|m| {
            m.frame_store()
                .latest()
                .map(|frame| (frame.width, frame.height))
                .unwrap_or_else(|| m.output_size())
        })
        .unwrap_or((640, 480));

    Json(CameraInfo {
        name: "SecureCam",
        model: "Android Camera",
        manufacturer: "Open Source",
        camera_ready: health.ready,
        streaming: health.streaming,
        frame_width,
        frame_height,
        camera_id: active.as_ref().map(|camera| camera.id.clone()),
        facing: active.map(|camera| camera.facing),
        snapshot_url: format!("{}/snapshot", base),
        stream_url: format!("{}/stream", base),
    })
}
