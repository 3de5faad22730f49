//! Service lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camera_capture::CapturePlatform;
use tokio::sync::watch;
use tracing::info;

use crate::config::{AppConfig, WatchdogConfig};
use crate::pipeline::Pipeline;
use crate::watchdog::Watchdog;
use crate::SupervisorError;

/// Owns the pipeline and its watchdog for the lifetime of the service
pub struct Supervisor {
    pipeline: Arc<Pipeline>,
    watchdog: Watchdog,
    watchdog_config: WatchdogConfig,
    alive: watch::Sender<bool>,
    started: AtomicBool,
}

impl Supervisor {
    /// Supervisor for the platform described by `config.camera`
    pub fn new(config: &AppConfig) -> Result<Self, SupervisorError> {
        let platform = config.camera.platform()?;
        Ok(Self::with_platform(config, platform))
    }

    pub fn with_platform(config: &AppConfig, platform: CapturePlatform) -> Self {
        let pipeline = Pipeline::new(
            config.server.clone(),
            config.camera.capture_config(),
            platform,
            config.watchdog.settle(),
        );
        let (alive, _) = watch::channel(false);

        Self {
            pipeline: Arc::new(pipeline),
            watchdog: Watchdog::new(),
            watchdog_config: config.watchdog.clone(),
            alive,
            started: AtomicBool::new(false),
        }
    }

    /// Bring up the pipeline, then the watchdog, then report alive
    pub async fn start(&self) -> Result<(), SupervisorError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SupervisorError::AlreadyStarted);
        }

        info!("Starting SecureCam service");
        if let Err(e) = self.pipeline.start().await {
            self.pipeline.shutdown().await;
            return Err(e);
        }

        if self.watchdog_config.enabled {
            self.watchdog.start(self.pipeline.clone(), &self.watchdog_config);
        } else {
            info!("Watchdog disabled");
        }

        self.alive.send_replace(true);
        if let Some(addr) = self.pipeline.local_addr().await {
            info!("SecureCam service running on http://{}", addr);
        }
        Ok(())
    }

    /// Stop the watchdog, the HTTP server and the capture manager, in that order
    pub async fn shutdown(&self) {
        info!("Stopping SecureCam service");
        self.watchdog.stop().await;
        self.pipeline.shutdown().await;
        self.alive.send_replace(false);
        info!("SecureCam service stopped");
    }

    /// Service liveness, true between a successful start and shutdown
    pub fn alive(&self) -> watch::Receiver<bool> {
        self.alive.subscribe()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("alive", &*self.alive.borrow())
            .field("watchdog", &self.watchdog)
            .finish()
    }
}
