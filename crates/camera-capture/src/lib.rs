//! Camera Capture Library for SecureCam
//!
//! Drives a platform camera through its capture lifecycle and publishes
//! orientation-corrected JPEG stills into a [`FrameStore`].
//! Supports:
//! - Synthetic test-pattern camera (default backend)
//! - V4L2 capture devices (feature `v4l2`)
//! - Device orientation tracking with front/back rotation rules

pub mod backend;
pub mod descriptor;
pub mod frame;
pub mod manager;
pub mod orientation;
pub mod preferences;

pub use backend::{
    CameraBackend, CameraDevice, CameraEvent, DeviceErrorKind, EventSink, OutputSurface,
    SyntheticBackend, SyntheticCamera,
};
#[cfg(feature = "v4l2")]
pub use backend::V4l2Backend;
pub use descriptor::{dedup_cameras, CameraDescriptor, Facing};
pub use frame::{jpeg_dimensions, rotate_jpeg, RotatedJpeg};
pub use frame_store::{EncodedFrame, FrameStore};
pub use manager::{CameraSelector, CaptureHealth, CaptureManager, CaptureState};
pub use orientation::{
    required_rotation, FixedOrientation, ManualOrientation, OrientationSensor,
    OrientationTracker, Rotation,
};
pub use preferences::{PreferenceStore, StaticPreferences};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Capture manager not initialized")]
    NotInitialized,

    #[error("Operation not allowed in state {0}")]
    InvalidState(CaptureState),

    #[error("Camera not ready (state {0})")]
    NotReady(CaptureState),

    #[error("No cameras available")]
    NoCameras,

    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Camera device error: {0}")]
    Device(DeviceErrorKind),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timed out after {0:?} waiting for camera")]
    Timeout(Duration),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Output surface width
    pub width: u32,
    /// Output surface height
    pub height: u32,
    /// JPEG quality used when re-encoding rotated frames
    pub jpeg_quality: u8,
    /// Frames allowed to wait for the background thread before new ones drop
    pub max_pending_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            jpeg_quality: 90,
            max_pending_frames: 4,
        }
    }
}

/// Platform services the capture manager depends on
#[derive(Clone)]
pub struct CapturePlatform {
    pub backend: Arc<dyn CameraBackend>,
    pub sensor: Arc<dyn OrientationSensor>,
    pub preferences: Arc<dyn PreferenceStore>,
}

impl CapturePlatform {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        sensor: Arc<dyn OrientationSensor>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            backend,
            sensor,
            preferences,
        }
    }

    /// Synthetic camera pair, fixed orientation, default preferences
    pub fn synthetic() -> Self {
        Self::new(
            Arc::new(SyntheticBackend::default()),
            Arc::new(FixedOrientation),
            Arc::new(StaticPreferences::default()),
        )
    }
}

impl std::fmt::Debug for CapturePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePlatform")
            .field("backend", &self.backend.name())
            .finish()
    }
}
