//! SecureCam service supervisor
//!
//! Starts the capture manager and HTTP server, keeps them healthy with a
//! watchdog, and tears them down in reverse order.

pub mod config;
mod error;
pub mod pipeline;
pub mod service;
pub mod watchdog;

pub use crate::config::{AppConfig, BackendKind, CameraSettings, WatchdogConfig};
pub use error::SupervisorError;
pub use pipeline::Pipeline;
pub use service::Supervisor;
pub use watchdog::{StallDetector, Watchdog, WatchdogState};

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Serve Prometheus metrics on `listen`
pub fn install_metrics_exporter(listen: &str) -> Result<(), SupervisorError> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| SupervisorError::Metrics(format!("invalid listen address {}: {}", listen, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| SupervisorError::Metrics(e.to_string()))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
