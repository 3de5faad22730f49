//! Capture manager and HTTP server, started and replaced together

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api::{HttpServer, ServerConfig};
use camera_capture::{CameraSelector, CaptureConfig, CaptureHealth, CaptureManager, CapturePlatform};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::SupervisorError;

/// The running camera pipeline
pub struct Pipeline {
    server_config: ServerConfig,
    capture_config: CaptureConfig,
    platform: CapturePlatform,
    /// Delay between camera start and going live
    settle: Duration,
    capture: RwLock<Option<Arc<CaptureManager>>>,
    http: Mutex<Option<HttpServer>>,
}

impl Pipeline {
    pub fn new(
        server_config: ServerConfig,
        capture_config: CaptureConfig,
        platform: CapturePlatform,
        settle: Duration,
    ) -> Self {
        Self {
            server_config,
            capture_config,
            platform,
            settle,
            capture: RwLock::new(None),
            http: Mutex::new(None),
        }
    }

    /// Start capture, then HTTP, then go live after the settle delay
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let manager = self.launch_capture().await?;
        *self.capture.write().await = Some(manager.clone());

        let server = HttpServer::start(self.server_config.clone(), Some(manager.clone())).await?;
        *self.http.lock().await = Some(server);

        tokio::time::sleep(self.settle).await;
        go_live(&manager);
        Ok(())
    }

    /// Construct, initialize and start a fresh manager.
    ///
    /// Initialization and start failures are logged; the manager's flags
    /// report them to the watchdog and HTTP handlers.
    async fn launch_capture(&self) -> Result<Arc<CaptureManager>, SupervisorError> {
        let config = self.capture_config.clone();
        let platform = self.platform.clone();

        let manager = tokio::task::spawn_blocking(move || {
            let manager = Arc::new(CaptureManager::new(config, platform));
            if let Err(e) = manager.initialize() {
                error!("Capture manager initialization failed: {}", e);
                return manager;
            }
            if let Err(e) = manager.start(CameraSelector::Auto) {
                warn!("Camera start failed: {}", e);
            }
            manager
        })
        .await?;

        Ok(manager)
    }

    /// Dispose the current manager and bring up a new one.
    ///
    /// The HTTP server is rebound to the new manager once it has gone live.
    pub async fn restart_capture(&self) -> Result<(), SupervisorError> {
        info!("Restarting capture pipeline");

        let old = self.capture.write().await.take();
        if let Some(old) = old {
            tokio::task::spawn_blocking(move || old.dispose()).await?;
        }

        let manager = self.launch_capture().await?;
        tokio::time::sleep(self.settle).await;
        go_live(&manager);

        *self.capture.write().await = Some(manager.clone());
        if let Some(server) = self.http.lock().await.as_ref() {
            server.set_capture_manager(Some(manager)).await;
        }

        info!("Capture pipeline restarted");
        Ok(())
    }

    /// Stop the HTTP server if present and start a new one on the current manager
    pub async fn restart_http(&self) -> Result<(), SupervisorError> {
        let mut http = self.http.lock().await;
        if let Some(old) = http.take() {
            old.stop().await;
        }

        let capture = self.capture.read().await.clone();
        *http = Some(HttpServer::start(self.server_config.clone(), capture).await?);
        info!("HTTP server restarted");
        Ok(())
    }

    pub async fn http_running(&self) -> bool {
        self.http
            .lock()
            .await
            .as_ref()
            .is_some_and(|server| server.is_running())
    }

    /// Health of the current manager; all flags false when there is none
    pub async fn capture_health(&self) -> CaptureHealth {
        self.capture
            .read()
            .await
            .as_ref()
            .map(|manager| manager.health())
            .unwrap_or_default()
    }

    pub async fn capture_manager(&self) -> Option<Arc<CaptureManager>> {
        self.capture.read().await.clone()
    }

    /// Address of the HTTP server, if one is running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.http.lock().await.as_ref().map(|server| server.local_addr())
    }

    /// Stop the HTTP server, leaving the slot empty
    pub async fn stop_http(&self) {
        let server = self.http.lock().await.take();
        if let Some(server) = server {
            server.stop().await;
        }
    }

    /// Stop the HTTP server and dispose the capture manager
    pub async fn shutdown(&self) {
        self.stop_http().await;

        let capture = self.capture.write().await.take();
        if let Some(manager) = capture {
            if let Err(e) = tokio::task::spawn_blocking(move || manager.dispose()).await {
                error!("Capture dispose failed: {}", e);
            }
        }
        info!("Pipeline shut down");
    }
}

fn go_live(manager: &CaptureManager) {
    match manager.go_live() {
        Ok(()) => info!("Camera live"),
        Err(e) => warn!("Camera could not go live: {}", e),
    }
    debug!("Capture state after go-live: {}", manager.state());
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("platform", &self.platform)
            .field("settle", &self.settle)
            .finish()
    }
}
