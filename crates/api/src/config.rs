//! HTTP server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: all interfaces)
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Host advertised in `/camera-info` URLs when the request has no Host header
    pub advertise_host: Option<String>,
    /// Delay between multipart stream parts
    pub stream_interval_ms: u64,
    /// Delay before retrying when no frame is available
    pub stream_retry_ms: u64,
    /// How long `/start-camera` waits for the camera before going live
    pub camera_start_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            advertise_host: None,
            stream_interval_ms: 100,
            stream_retry_ms: 500,
            camera_start_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn stream_retry(&self) -> Duration {
        Duration::from_millis(self.stream_retry_ms)
    }

    pub fn camera_start_timeout(&self) -> Duration {
        Duration::from_millis(self.camera_start_timeout_ms)
    }
}
