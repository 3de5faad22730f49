//! SecureCam service binary

use std::path::PathBuf;

use anyhow::{Context, Result};
use supervisor::{install_metrics_exporter, AppConfig, Supervisor};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("SECURECAM_CONFIG"))
        .map(PathBuf::from);

    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    api::init_logging(&config.logging.level, config.logging.json)?;

    info!(
        "SecureCam v{} (port {}, backend {})",
        env!("CARGO_PKG_VERSION"),
        config.server.port,
        config.camera.backend
    );

    if let Some(listen) = &config.metrics.listen {
        install_metrics_exporter(listen)?;
    }

    let supervisor = Supervisor::new(&config)?;
    supervisor.start().await.context("failed to start service")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    supervisor.shutdown().await;
    Ok(())
}
