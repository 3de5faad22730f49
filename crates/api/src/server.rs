//! HTTP server handle

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camera_capture::CaptureManager;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{create_router, ApiError, AppState, ServerConfig, SharedState};

/// How long `stop` waits for open connections to finish
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Running HTTP server
pub struct HttpServer {
    state: SharedState,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpServer {
    /// Bind the listener and start serving in a background task
    pub async fn start(
        config: ServerConfig,
        capture: Option<Arc<CaptureManager>>,
    ) -> Result<Self, ApiError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ApiError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(AppState::new(
            config,
            capture,
            shutdown_rx.clone(),
        )));
        let app = create_router(state.clone());
        let running = Arc::new(AtomicBool::new(true));

        let task = {
            let running = running.clone();
            let mut stop = shutdown_rx;
            tokio::spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.wait_for(|stopping| *stopping).await;
                    })
                    .await;
                if let Err(e) = result {
                    error!("HTTP server error: {}", e);
                }
                running.store(false, Ordering::Release);
                info!("HTTP server stopped");
            })
        };

        info!("HTTP server listening on {}", local_addr);
        Ok(Self {
            state,
            local_addr,
            running,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared handler state
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Point handlers at a different capture manager
    pub async fn set_capture_manager(&self, capture: Option<Arc<CaptureManager>>) {
        self.state.write().await.capture = capture;
        info!("HTTP server capture manager updated");
    }

    /// Stop accepting connections and end open streams
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut task) = task {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!("HTTP server did not stop within {:?}, aborting", STOP_TIMEOUT);
                task.abort();
            }
        }
        self.running.store(false, Ordering::Release);
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}
