//! SecureCam HTTP API Server
//!
//! Serves still snapshots, a multipart MJPEG stream, camera status and a
//! synthesized signaling handshake over plain HTTP/1.1.

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use camera_capture::CaptureManager;
use frame_store::FrameStore;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod network;
mod routes;
mod server;

pub use config::ServerConfig;
pub use error::ApiError;
pub use network::{base_url, local_ipv4, FALLBACK_HOST};
pub use server::HttpServer;

/// Application state shared across handlers
pub struct AppState {
    /// Capture manager, replaced when the pipeline restarts
    pub capture: Option<Arc<CaptureManager>>,
    /// Server configuration
    pub config: ServerConfig,
    /// Flips to true when the server is shutting down
    pub shutdown: watch::Receiver<bool>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

pub type SharedState = Arc<RwLock<AppState>>;

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServerConfig,
        capture: Option<Arc<CaptureManager>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            capture,
            config,
            shutdown,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    /// Frame store of the current capture manager
    pub fn frame_store(&self) -> Option<Arc<FrameStore>> {
        self.capture.as_ref().map(|manager| manager.frame_store())
    }
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/",
            get(routes::pages::index).fallback(routes::pages::not_found),
        )
        .route(
            "/index.html",
            get(routes::pages::index).fallback(routes::pages::not_found),
        )
        .route(
            "/home-assistant",
            get(routes::pages::home_assistant).fallback(routes::pages::not_found),
        )
        .route(
            "/status",
            get(routes::status::get_status).fallback(routes::pages::not_found),
        )
        .route(
            "/camera-info",
            get(routes::camera::camera_info).fallback(routes::pages::not_found),
        )
        .route(
            "/start-camera",
            post(routes::camera::start_camera).fallback(routes::pages::not_found),
        )
        .route(
            "/offer",
            post(routes::signaling::offer).fallback(routes::pages::not_found),
        )
        .route(
            "/ice-candidate",
            post(routes::signaling::ice_candidate).fallback(routes::pages::not_found),
        )
        .route(
            "/snapshot",
            get(routes::media::snapshot).fallback(routes::pages::not_found),
        )
        .route(
            "/stream",
            get(routes::media::stream).fallback(routes::pages::not_found),
        )
        .fallback(routes::pages::not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONNECTION,
            HeaderValue::from_static("close"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "handler panicked".to_string());
    ApiError::Internal(detail).into_response()
}

/// Initialize logging.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, json: bool) -> Result<(), ApiError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| ApiError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| ApiError::Logging(e.to_string()))
}
