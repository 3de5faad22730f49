#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use camera_capture::{
    CameraSelector, CaptureConfig, CaptureManager, CapturePlatform, FixedOrientation,
    StaticPreferences, SyntheticBackend,
};

/// Capture manager that is streaming and has published at least one frame
pub async fn live_manager() -> Arc<CaptureManager> {
    tokio::task::spawn_blocking(|| {
        let config = CaptureConfig {
            width: 64,
            height: 48,
            ..Default::default()
        };
        let platform = CapturePlatform::new(
            Arc::new(SyntheticBackend::default().with_fps(30)),
            Arc::new(FixedOrientation),
            Arc::new(StaticPreferences::default()),
        );
        let manager = Arc::new(CaptureManager::new(config, platform));
        manager.initialize().unwrap();
        manager.start(CameraSelector::Auto).unwrap();
        manager.wait_until_ready(Duration::from_secs(5)).unwrap();
        manager.go_live().unwrap();

        let store = manager.frame_store();
        let deadline = Instant::now() + Duration::from_secs(5);
        while store.is_empty() {
            assert!(Instant::now() < deadline, "no frame published");
            std::thread::sleep(Duration::from_millis(10));
        }
        manager
    })
    .await
    .unwrap()
}

/// Initialized manager whose camera was never started
pub async fn idle_manager() -> Arc<CaptureManager> {
    tokio::task::spawn_blocking(|| {
        let manager = Arc::new(CaptureManager::new(
            CaptureConfig::default(),
            CapturePlatform::synthetic(),
        ));
        manager.initialize().unwrap();
        manager
    })
    .await
    .unwrap()
}
